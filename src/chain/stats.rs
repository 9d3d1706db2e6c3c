use serde::Serialize;

use crate::types::NodeDetails;
use crate::util::counter::{Counter, CounterValue, Ranking};

fn bucket_memory(memory: u64) -> (u32, Option<u32>) {
    let gib = memory / (1024 * 1024 * 1024);

    let buckets = [1, 2, 4, 8, 16, 32, 64, 128];
    for &b in &buckets {
        if gib < b {
            return (0, Some(b));
        }
    }
    (128, None)
}

fn kernel_version_number(version: &str) -> &str {
    let index = version
        .find('-')
        .or_else(|| version.find('+'))
        .unwrap_or(version.len());

    &version[..index]
}

/// Aggregated, ranked distribution of node properties for a chain, rebuilt
/// incrementally as nodes join and leave so it never needs to scan the whole
/// roster.
#[derive(Default)]
pub struct ChainStatsCollator {
    version: Counter<String>,
    target_os: Counter<String>,
    target_arch: Counter<String>,
    cpu: Counter<String>,
    memory: Counter<(u32, Option<u32>)>,
    core_count: Counter<u32>,
    linux_kernel: Counter<String>,
    linux_distro: Counter<String>,
    is_virtual_machine: Counter<bool>,
}

impl ChainStatsCollator {
    pub fn add_or_remove_node(&mut self, details: &NodeDetails, op: CounterValue) {
        self.version.modify(Some(&*details.version), op);
        self.target_os
            .modify(details.target_os.as_deref(), op);
        self.target_arch
            .modify(details.target_arch.as_deref(), op);

        let sysinfo = details.sysinfo.as_ref();

        self.cpu
            .modify(sysinfo.and_then(|s| s.cpu.as_deref()), op);

        let memory = sysinfo.and_then(|s| s.memory.map(bucket_memory));
        self.memory.modify(memory.as_ref(), op);

        self.core_count
            .modify(sysinfo.and_then(|s| s.core_count.as_ref()), op);

        self.linux_kernel.modify(
            sysinfo
                .and_then(|s| s.linux_kernel.as_deref())
                .map(kernel_version_number),
            op,
        );

        self.linux_distro
            .modify(sysinfo.and_then(|s| s.linux_distro.as_deref()), op);

        self.is_virtual_machine
            .modify(sysinfo.and_then(|s| s.is_virtual_machine.as_ref()), op);
    }

    pub fn generate(&self) -> ChainStats {
        ChainStats {
            version: self.version.generate_ranking_top(10),
            target_os: self.target_os.generate_ranking_top(10),
            target_arch: self.target_arch.generate_ranking_top(10),
            cpu: self.cpu.generate_ranking_top(10),
            memory: self.memory.generate_ranking_ordered(),
            core_count: self.core_count.generate_ranking_top(10),
            linux_kernel: self.linux_kernel.generate_ranking_top(10),
            linux_distro: self.linux_distro.generate_ranking_top(10),
            is_virtual_machine: self.is_virtual_machine.generate_ranking_ordered(),
        }
    }
}

#[derive(Serialize)]
pub struct ChainStats {
    pub version: Ranking<String>,
    pub target_os: Ranking<String>,
    pub target_arch: Ranking<String>,
    pub cpu: Ranking<String>,
    pub memory: Ranking<(u32, Option<u32>)>,
    pub core_count: Ranking<u32>,
    pub linux_kernel: Ranking<String>,
    pub linux_distro: Ranking<String>,
    pub is_virtual_machine: Ranking<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_version_strips_suffix() {
        assert_eq!(kernel_version_number("5.10.0-8-amd64"), "5.10.0");
        assert_eq!(kernel_version_number("5.10.0+82453"), "5.10.0");
        assert_eq!(kernel_version_number("5.10.0"), "5.10.0");
    }

    #[test]
    fn memory_bucketing_is_monotonic() {
        assert_eq!(bucket_memory(512 * 1024 * 1024), (0, Some(1)));
        assert_eq!(bucket_memory(200 * 1024 * 1024 * 1024), (128, None));
    }
}
