//! Watchable key-value store abstraction.
//!
//! The manager only needs `put`/`get`/`delete` and persistent tree watches;
//! replication and durability belong to the store implementation.

mod watchable;

#[cfg(feature = "memory-store")]
mod memory;

pub use watchable::{
    KvAction, KvPair, StoreResult, WatchCallback, WatchEvent, WatchId, WatchableStore,
};

#[cfg(feature = "memory-store")]
pub use memory::MemoryStore;

/// Returns true if `key` is `prefix` itself or lies beneath it.
///
/// `cfg/nodes` contains `cfg/nodes/n1` but not `cfg/nodesx/n1`.
pub fn key_in_tree(prefix: &str, key: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match key.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
