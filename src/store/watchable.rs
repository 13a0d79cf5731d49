//! The store contract consumed by the configuration manager.

use crate::error::StoreError;
use std::fmt;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Callback invoked by a store for every event under a watched prefix.
///
/// Receives the watched prefix and the event. Returning an error asks the
/// store to stop the watch.
pub type WatchCallback = Box<dyn Fn(&str, &WatchEvent) -> StoreResult<()> + Send + Sync>;

/// Kind of mutation that produced a [`KvPair`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KvAction {
    /// Key did not exist before.
    Create,
    /// Existing key was overwritten.
    Update,
    /// Key was removed.
    Delete,
}

/// A key with its value and the store-assigned version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    /// Full key path
    pub key: String,
    /// Raw value bytes (empty for deletes)
    pub value: Vec<u8>,
    /// Mutation that produced this pair
    pub action: KvAction,
    /// Store-assigned, monotonically increasing version
    pub modified_index: u64,
    /// Time-to-live in seconds, 0 for none
    pub ttl: u64,
}

/// Event delivered to a [`WatchCallback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A key under the prefix changed.
    Changed(KvPair),
    /// The watch channel reported a failure.
    Failed(StoreError),
}

/// Identifier of an established watch, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub u64);

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A key-value store with tree-scoped watches.
///
/// Implementations must be safe to call concurrently. Watch callbacks are
/// invoked on the store's own delivery thread, never on the caller of `put`
/// or `delete`.
pub trait WatchableStore: Send + Sync {
    /// Write `value` under `key`. A non-zero `ttl` expires the key after that many seconds.
    fn put(&self, key: &str, value: Vec<u8>, ttl: u64) -> StoreResult<KvPair>;

    /// Read `key`, failing with [`StoreError::NotFound`] if absent.
    fn get(&self, key: &str) -> StoreResult<KvPair>;

    /// Remove `key`, failing with [`StoreError::NotFound`] if absent.
    fn delete(&self, key: &str) -> StoreResult<KvPair>;

    /// List every live key under `prefix`.
    fn enumerate(&self, prefix: &str) -> StoreResult<Vec<KvPair>>;

    /// Register a persistent watch on every key under `prefix`.
    ///
    /// A non-zero `from_index` asks the store to also deliver changes at or
    /// after that version which were committed before the watch was created.
    fn watch_tree(&self, prefix: &str, from_index: u64, callback: WatchCallback)
    -> StoreResult<WatchId>;

    /// Stop a watch established with [`watch_tree`](Self::watch_tree).
    fn cancel_watch(&self, id: WatchId) -> StoreResult<()>;
}
