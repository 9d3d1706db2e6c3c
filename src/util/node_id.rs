use bimap::BiMap;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::now;

pub type NodeId = usize;

/// 24h TTL: a reconnecting node with the same key gets the same [`NodeId`]
/// back as long as it reconnects within this window of its last sighting.
const TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// How often [`NodeIdRegistry::sweep`] is expected to be called (driven by
/// the Aggregator's periodic tick; see `aggregator.rs`).
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Collision key nodes are identified by: either a stable public key
/// (reported as `authority` on `system.connected`), or, lacking that, the
/// node's self-reported name combined with a salt fixed for the lifetime
/// of this process. The salt means two different aggregator processes
/// never collide on `(name)` alone, while a single long-running process
/// still recognizes the same `(name)` across reconnects, per spec
/// invariant 6.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKey {
    Public(Box<str>),
    NameSalt(Box<str>, u64),
}

/// Stable short integer identity keyed by `(public key ∥ name+salt)`, with
/// TTL eviction. Modeled on `common::assign_id::AssignId`'s bijective
/// id↔details map, extended with a last-seen timestamp per entry so that
/// idle entries can be swept once their TTL has elapsed.
pub struct NodeIdRegistry {
    current_id: NodeId,
    mapping: BiMap<NodeId, NodeKey>,
    last_seen: HashMap<NodeId, Instant>,
}

impl NodeIdRegistry {
    pub fn new() -> Self {
        NodeIdRegistry {
            current_id: 0,
            mapping: BiMap::new(),
            last_seen: HashMap::new(),
        }
    }

    /// Returns the existing id for `key` if one is live, otherwise assigns
    /// a fresh one. Either way, the entry's last-seen timestamp is bumped.
    pub fn assign(&mut self, key: NodeKey) -> NodeId {
        if let Some(&id) = self.mapping.get_by_right(&key) {
            self.last_seen.insert(id, Instant::now());
            return id;
        }

        let id = self.current_id;
        // IDs are never reused while an entry (even a stale one pending
        // sweep) still occupies them, so a wrapping add is fine: by the
        // time we wrap around, any earlier holder of this id is long gone.
        self.current_id = self.current_id.wrapping_add(1);

        self.mapping.insert(id, key);
        self.last_seen.insert(id, Instant::now());

        id
    }

    /// Evict every entry whose last sighting is older than [`TTL`].
    pub fn sweep(&mut self) {
        let cutoff = Instant::now();
        let expired: Vec<NodeId> = self
            .last_seen
            .iter()
            .filter(|(_, &seen)| cutoff.duration_since(seen) > TTL)
            .map(|(&id, _)| id)
            .collect();

        for id in expired {
            self.mapping.remove_by_left(&id);
            self.last_seen.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}

impl Default for NodeIdRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Draw a process-lifetime salt. Not cryptographically significant: it
/// only needs to differ across restarts, not resist a determined attacker.
pub fn process_salt() -> u64 {
    now() ^ (std::process::id() as u64).wrapping_mul(0x9E3779B97F4A7C15)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_reconnect_gets_same_id() {
        let mut reg = NodeIdRegistry::new();
        let key = NodeKey::Public("0xauthority".into());

        let first = reg.assign(key.clone());
        let second = reg.assign(key);

        assert_eq!(first, second);
    }

    #[test]
    fn different_keys_get_different_ids() {
        let mut reg = NodeIdRegistry::new();

        let a = reg.assign(NodeKey::NameSalt("alice".into(), 1));
        let b = reg.assign(NodeKey::NameSalt("bob".into(), 1));

        assert_ne!(a, b);
    }

    #[test]
    fn sweep_is_a_no_op_for_fresh_entries() {
        let mut reg = NodeIdRegistry::new();
        reg.assign(NodeKey::NameSalt("alice".into(), 1));

        reg.sweep();

        assert_eq!(reg.len(), 1);
    }
}
