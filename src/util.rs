pub mod counter;
mod dense_map;
mod hash;
mod mean_list;
mod node_id;
mod num_stats;

pub use dense_map::DenseMap;
pub use hash::{Hash, HashParseError};
pub use mean_list::MeanList;
pub use node_id::{process_salt, NodeId, NodeIdRegistry, NodeKey, SWEEP_INTERVAL};
pub use num_stats::NumStats;

/// Returns current unix time in ms (compatible with JS Date.now())
pub fn now() -> u64 {
    use std::time::SystemTime;

    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("System time must be configured to be post Unix Epoch start; qed")
        .as_millis() as u64
}

/// FNV-1a hash of a string, used as a cheap fingerprint to avoid
/// re-subscribing a feed that's already subscribed to the same chain.
pub fn fnv(s: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    s.bytes().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(PRIME)
    })
}
