use std::sync::Arc;

use crate::node::message::SystemInterval;
use crate::types::{
    Block, BlockDetails, NodeDetails, NodeHardware, NodeIO, NodeLocation, NodeStats, Timestamp,
};
use crate::util::now;

pub mod connector;
pub mod message;

/// Below this gap between two emitted `block` events, further emissions are
/// throttled until `THROTTLE_INTERVAL` has passed since the first one.
const THROTTLE_THRESHOLD: u64 = 100;
/// Width of the throttle window armed by a sub-threshold gap, in ms.
const THROTTLE_INTERVAL: u64 = 1000;

pub struct Node {
    details: NodeDetails,
    stats: NodeStats,
    io: NodeIO,
    best: BlockDetails,
    finalized: Block,
    throttle: u64,
    hardware: NodeHardware,
    location: Option<Arc<NodeLocation>>,
    stale: bool,
    connected_at: Timestamp,
    network_state: Option<Box<serde_json::value::RawValue>>,
}

impl Node {
    pub fn new(details: NodeDetails) -> Self {
        Node {
            details,
            stats: NodeStats::default(),
            io: NodeIO::default(),
            best: BlockDetails::default(),
            finalized: Block::zero(),
            throttle: 0,
            hardware: NodeHardware::default(),
            location: None,
            stale: false,
            connected_at: now(),
            network_state: None,
        }
    }

    pub fn details(&self) -> &NodeDetails {
        &self.details
    }

    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    pub fn io(&self) -> &NodeIO {
        &self.io
    }

    pub fn best(&self) -> &Block {
        &self.best.block
    }

    pub fn best_timestamp(&self) -> u64 {
        self.best.block_timestamp
    }

    pub fn finalized(&self) -> &Block {
        &self.finalized
    }

    pub fn hardware(&self) -> &NodeHardware {
        &self.hardware
    }

    pub fn location(&self) -> Option<&NodeLocation> {
        self.location.as_deref()
    }

    pub fn update_location(&mut self, location: Arc<NodeLocation>) {
        self.location = Some(location);
    }

    pub fn block_details(&self) -> &BlockDetails {
        &self.best
    }

    pub fn startup_time(&self) -> Option<&str> {
        self.details.startup_time.as_deref()
    }

    /// Returns `true` iff `block` advances this node's own best block.
    pub fn update_block(&mut self, block: Block) -> bool {
        if block.height > self.best.block.height {
            self.stale = false;
            self.best.block = block;
            true
        } else {
            false
        }
    }

    /// Refreshes timing/propagation fields for the current best block and
    /// decides whether this update should be broadcast, applying the
    /// throttle window described above `THROTTLE_THRESHOLD`.
    pub fn update_details(
        &mut self,
        timestamp: u64,
        propagation_time: Option<u64>,
    ) -> Option<&BlockDetails> {
        self.best.block_time = timestamp.saturating_sub(self.best.block_timestamp);
        self.best.block_timestamp = timestamp;
        self.best.propagation_time = propagation_time;

        if self.throttle < timestamp {
            if self.best.block_time <= THROTTLE_THRESHOLD {
                self.throttle = timestamp + THROTTLE_INTERVAL;
            }

            Some(&self.best)
        } else {
            None
        }
    }

    /// Clears a stale propagation time when another node claims a new chain-best.
    pub fn clear_propagation_time(&mut self) {
        self.best.propagation_time = None;
    }

    pub fn update_hardware(&mut self, interval: &SystemInterval) -> bool {
        let mut changed = false;

        if let Some(cpu) = interval.cpu {
            changed |= self.hardware.cpu.push(cpu);
        }
        if let Some(memory) = interval.memory {
            changed |= self.hardware.memory.push(memory);
        }
        if let Some(upload) = interval.bandwidth_upload {
            changed |= self.hardware.upload.push(upload as f32);
        }
        if let Some(download) = interval.bandwidth_download {
            changed |= self.hardware.download.push(download as f32);
        }
        self.hardware.chart_stamps.push(now() as f64);

        changed
    }

    pub fn update_stats(&mut self, interval: &SystemInterval) -> Option<&NodeStats> {
        let stats = NodeStats {
            peers: interval.peers.unwrap_or(self.stats.peers),
            txcount: interval.txcount.unwrap_or(self.stats.txcount),
        };

        if stats != self.stats {
            self.stats = stats;
            Some(&self.stats)
        } else {
            None
        }
    }

    pub fn update_io(&mut self, interval: &SystemInterval) -> Option<&NodeIO> {
        let cache_size = interval.used_state_cache_size?;

        if self.io.used_state_cache_size.push(cache_size) {
            Some(&self.io)
        } else {
            None
        }
    }

    pub fn update_finalized(&mut self, block: Block) -> Option<&Block> {
        if block.height > self.finalized.height {
            self.finalized = block;
            Some(self.finalized())
        } else {
            None
        }
    }

    /// Returns `true` (and sets the stale flag) once the node has gone
    /// `threshold` ms without a new best block.
    pub fn update_stale(&mut self, threshold: u64) -> bool {
        if self.best.block_timestamp < threshold {
            self.stale = true;
        }

        self.stale
    }

    pub fn stale(&self) -> bool {
        self.stale
    }

    pub fn set_validator_address(&mut self, addr: Box<str>) {
        self.details.validator = Some(addr);
    }

    pub fn set_network_state(&mut self, state: Box<serde_json::value::RawValue>) {
        self.network_state = Some(state);
    }

    pub fn network_state(&self) -> Option<&serde_json::value::RawValue> {
        self.network_state.as_deref()
    }

    pub fn connected_at(&self) -> Timestamp {
        self.connected_at
    }
}
