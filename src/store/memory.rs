//! In-process [`WatchableStore`] implementation.

use super::{KvAction, KvPair, StoreResult, WatchCallback, WatchEvent, WatchId, WatchableStore};
use crate::error::StoreError;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, trace};

struct Entry {
    value: Vec<u8>,
    action: KvAction,
    modified_index: u64,
    ttl: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    fn to_pair(&self, key: &str) -> KvPair {
        KvPair {
            key: key.to_string(),
            value: self.value.clone(),
            action: self.action,
            modified_index: self.modified_index,
            ttl: self.ttl,
        }
    }
}

struct WatchSlot {
    prefix: String,
    tx: mpsc::UnboundedSender<WatchEvent>,
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, Entry>,
    last_index: u64,
    watches: HashMap<u64, WatchSlot>,
    next_watch_id: u64,
}

impl Inner {
    /// Queue `pair` on every watch whose tree contains its key.
    ///
    /// Called with the lock held so each watch sees mutations in commit order.
    fn publish(&self, pair: &KvPair) {
        for (id, slot) in &self.watches {
            if super::key_in_tree(&slot.prefix, &pair.key) {
                trace!(watch = id, key = %pair.key, "queueing watch event");
                let _ = slot.tx.send(WatchEvent::Changed(pair.clone()));
            }
        }
    }

    fn live_entry(&self, key: &str, now: Instant) -> Option<&Entry> {
        self.entries.get(key).filter(|e| e.is_live(now))
    }

    /// Drop entries whose ttl has run out. Expiry publishes no event.
    fn prune_expired(&mut self, now: Instant) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        let pruned = before - self.entries.len();
        if pruned > 0 {
            trace!(pruned, "pruned expired entries");
        }
    }
}

/// A thread-safe, in-memory watchable key-value store.
///
/// Every mutation gets the next `modified_index`. Each watch owns a delivery
/// thread fed by an unbounded channel, so callbacks never run on the writer's
/// thread and one watch observes its tree in commit order.
///
/// # Examples
///
/// ```rust
/// use cluster_config::store::{MemoryStore, WatchableStore};
///
/// let store = MemoryStore::new();
/// store.put("osdconfig/cluster/main", b"v1".to_vec(), 0).unwrap();
/// assert_eq!(store.get("osdconfig/cluster/main").unwrap().value, b"v1");
/// ```
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of watches currently established.
    pub fn active_watches(&self) -> usize {
        self.inner.lock().watches.len()
    }

    /// Version assigned to the most recent mutation.
    pub fn last_index(&self) -> u64 {
        self.inner.lock().last_index
    }

    /// Deliver `err` to every active watch, as a dropped store connection would.
    pub fn broadcast_failure(&self, err: StoreError) {
        let inner = self.inner.lock();
        for slot in inner.watches.values() {
            let _ = slot.tx.send(WatchEvent::Failed(err.clone()));
        }
    }

    fn spawn_delivery(
        &self,
        id: u64,
        prefix: String,
        mut rx: mpsc::UnboundedReceiver<WatchEvent>,
        callback: WatchCallback,
    ) -> StoreResult<()> {
        let inner = Arc::clone(&self.inner);
        std::thread::Builder::new()
            .name(format!("watch-{id}"))
            .spawn(move || {
                while let Some(event) = rx.blocking_recv() {
                    if let Err(e) = callback(&prefix, &event) {
                        debug!(watch = id, prefix = %prefix, error = %e, "callback stopped watch");
                        inner.lock().watches.remove(&id);
                        break;
                    }
                }
                trace!(watch = id, "delivery thread exiting");
            })
            .map(|_| ())
            .map_err(|e| StoreError::Other(format!("Failed to spawn watch thread: {}", e)))
    }
}

impl WatchableStore for MemoryStore {
    fn put(&self, key: &str, value: Vec<u8>, ttl: u64) -> StoreResult<KvPair> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.prune_expired(now);
        let action = if inner.entries.contains_key(key) {
            KvAction::Update
        } else {
            KvAction::Create
        };
        inner.last_index += 1;
        let entry = Entry {
            value,
            action,
            modified_index: inner.last_index,
            ttl,
            expires_at: (ttl > 0).then(|| now + Duration::from_secs(ttl)),
        };
        let pair = entry.to_pair(key);
        inner.entries.insert(key.to_string(), entry);
        inner.publish(&pair);
        Ok(pair)
    }

    fn get(&self, key: &str) -> StoreResult<KvPair> {
        let inner = self.inner.lock();
        inner
            .live_entry(key, Instant::now())
            .map(|e| e.to_pair(key))
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn delete(&self, key: &str) -> StoreResult<KvPair> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let live = inner.live_entry(key, now).is_some();
        let removed = inner.entries.remove(key);
        let Some(removed) = removed.filter(|_| live) else {
            return Err(StoreError::NotFound(key.to_string()));
        };
        inner.last_index += 1;
        let pair = KvPair {
            key: key.to_string(),
            value: removed.value,
            action: KvAction::Delete,
            modified_index: inner.last_index,
            ttl: 0,
        };
        inner.publish(&pair);
        Ok(pair)
    }

    fn enumerate(&self, prefix: &str) -> StoreResult<Vec<KvPair>> {
        let mut inner = self.inner.lock();
        inner.prune_expired(Instant::now());
        Ok(inner
            .entries
            .iter()
            .filter(|(key, _)| super::key_in_tree(prefix, key))
            .map(|(key, entry)| entry.to_pair(key))
            .collect())
    }

    fn watch_tree(
        &self,
        prefix: &str,
        from_index: u64,
        callback: WatchCallback,
    ) -> StoreResult<WatchId> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let now = Instant::now();
            let mut inner = self.inner.lock();
            inner.next_watch_id += 1;
            let id = inner.next_watch_id;

            if from_index > 0 {
                let mut backlog: Vec<KvPair> = inner
                    .entries
                    .iter()
                    .filter(|(key, entry)| {
                        super::key_in_tree(prefix, key)
                            && entry.is_live(now)
                            && entry.modified_index >= from_index
                    })
                    .map(|(key, entry)| entry.to_pair(key))
                    .collect();
                backlog.sort_by_key(|pair| pair.modified_index);
                for pair in backlog {
                    let _ = tx.send(WatchEvent::Changed(pair));
                }
            }

            inner.watches.insert(
                id,
                WatchSlot {
                    prefix: prefix.to_string(),
                    tx,
                },
            );
            id
        };

        if let Err(e) = self.spawn_delivery(id, prefix.to_string(), rx, callback) {
            self.inner.lock().watches.remove(&id);
            return Err(e);
        }

        debug!(watch = id, prefix, from_index, "watch established");
        Ok(WatchId(id))
    }

    fn cancel_watch(&self, id: WatchId) -> StoreResult<()> {
        match self.inner.lock().watches.remove(&id.0) {
            Some(_) => {
                debug!(watch = id.0, "watch cancelled");
                Ok(())
            }
            None => Err(StoreError::WatchCancelled(id.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;

    fn recording_watch(
        store: &MemoryStore,
        prefix: &str,
        from_index: u64,
    ) -> (WatchId, std_mpsc::Receiver<WatchEvent>) {
        let (tx, rx) = std_mpsc::channel();
        let tx = Mutex::new(tx);
        let id = store
            .watch_tree(
                prefix,
                from_index,
                Box::new(move |_prefix: &str, event: &WatchEvent| {
                    let _ = tx.lock().send(event.clone());
                    Ok(())
                }),
            )
            .unwrap();
        (id, rx)
    }

    fn next_pair(rx: &std_mpsc::Receiver<WatchEvent>) -> KvPair {
        match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            WatchEvent::Changed(pair) => pair,
            WatchEvent::Failed(e) => panic!("unexpected watch failure: {e}"),
        }
    }

    #[test]
    fn test_put_get_delete() {
        let store = MemoryStore::new();
        let created = store.put("a/b", b"1".to_vec(), 0).unwrap();
        assert_eq!(created.action, KvAction::Create);
        assert_eq!(created.modified_index, 1);

        let updated = store.put("a/b", b"2".to_vec(), 0).unwrap();
        assert_eq!(updated.action, KvAction::Update);
        assert_eq!(store.get("a/b").unwrap().value, b"2");

        let deleted = store.delete("a/b").unwrap();
        assert_eq!(deleted.action, KvAction::Delete);
        assert_eq!(deleted.modified_index, 3);
        assert_eq!(store.get("a/b"), Err(StoreError::NotFound("a/b".into())));
        assert_eq!(store.delete("a/b"), Err(StoreError::NotFound("a/b".into())));
    }

    #[test]
    fn test_enumerate_respects_tree_boundaries() {
        let store = MemoryStore::new();
        store.put("cfg/nodes/n1", b"x".to_vec(), 0).unwrap();
        store.put("cfg/nodes/n2", b"y".to_vec(), 0).unwrap();
        store.put("cfg/nodesx/n3", b"z".to_vec(), 0).unwrap();

        let keys: Vec<_> = store
            .enumerate("cfg/nodes")
            .unwrap()
            .into_iter()
            .map(|p| p.key)
            .collect();
        assert_eq!(keys, vec!["cfg/nodes/n1", "cfg/nodes/n2"]);
    }

    #[test]
    fn test_expired_entries_are_invisible() {
        let store = MemoryStore::new();
        store.put("k", b"v".to_vec(), 0).unwrap();
        {
            let mut inner = store.inner.lock();
            let entry = inner.entries.get_mut("k").unwrap();
            entry.expires_at = Some(Instant::now() - Duration::from_secs(1));
        }
        assert!(store.get("k").is_err());
        assert_eq!(store.put("k", b"w".to_vec(), 0).unwrap().action, KvAction::Create);
    }

    #[test]
    fn test_ttl_sets_expiry() {
        let store = MemoryStore::new();
        let pair = store.put("k", b"v".to_vec(), 1).unwrap();
        assert_eq!(pair.ttl, 1);
        assert_eq!(store.get("k").unwrap().ttl, 1);

        let inner = store.inner.lock();
        let expires_at = inner.entries["k"].expires_at.unwrap();
        assert!(expires_at > Instant::now());
        assert!(expires_at <= Instant::now() + Duration::from_secs(1));
        assert!(inner.entries["k"].is_live(Instant::now()));
        assert!(!inner.entries["k"].is_live(expires_at));
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let store = MemoryStore::new();
        assert_eq!(store.put("k", b"v".to_vec(), 0).unwrap().ttl, 0);
        assert!(store.inner.lock().entries["k"].expires_at.is_none());
    }

    #[test]
    fn test_expired_entries_are_pruned() {
        let store = MemoryStore::new();
        store.put("cfg/a", b"1".to_vec(), 60).unwrap();
        store.put("cfg/b", b"2".to_vec(), 0).unwrap();
        store.inner.lock().entries.get_mut("cfg/a").unwrap().expires_at =
            Some(Instant::now() - Duration::from_secs(1));

        store.put("cfg/c", b"3".to_vec(), 0).unwrap();
        let keys: Vec<_> = store.inner.lock().entries.keys().cloned().collect();
        assert_eq!(keys, vec!["cfg/b", "cfg/c"]);

        store.inner.lock().entries.get_mut("cfg/b").unwrap().expires_at =
            Some(Instant::now() - Duration::from_secs(1));
        assert_eq!(store.enumerate("cfg").unwrap().len(), 1);
        assert_eq!(store.inner.lock().entries.len(), 1);
    }

    #[test]
    fn test_watch_delivers_in_commit_order() {
        let store = MemoryStore::new();
        let (_id, rx) = recording_watch(&store, "cfg/cluster", 0);

        store.put("cfg/cluster/a", b"1".to_vec(), 0).unwrap();
        store.put("cfg/nodes/n1", b"ignored".to_vec(), 0).unwrap();
        store.put("cfg/cluster/a", b"2".to_vec(), 0).unwrap();
        store.delete("cfg/cluster/a").unwrap();

        let actions: Vec<_> = (0..3).map(|_| next_pair(&rx).action).collect();
        assert_eq!(
            actions,
            vec![KvAction::Create, KvAction::Update, KvAction::Delete]
        );
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_from_index_replays_backlog() {
        let store = MemoryStore::new();
        store.put("cfg/cluster/a", b"1".to_vec(), 0).unwrap();
        store.put("cfg/cluster/b", b"2".to_vec(), 0).unwrap();

        let (_id, rx) = recording_watch(&store, "cfg/cluster", 2);
        let replayed = next_pair(&rx);
        assert_eq!(replayed.key, "cfg/cluster/b");
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_cancel_watch() {
        let store = MemoryStore::new();
        let (id, rx) = recording_watch(&store, "cfg", 0);
        assert_eq!(store.active_watches(), 1);

        store.cancel_watch(id).unwrap();
        assert_eq!(store.active_watches(), 0);
        assert_eq!(store.cancel_watch(id), Err(StoreError::WatchCancelled(id.0)));

        store.put("cfg/x", b"1".to_vec(), 0).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_callback_error_stops_watch() {
        let store = MemoryStore::new();
        store
            .watch_tree(
                "cfg",
                0,
                Box::new(|_: &str, _: &WatchEvent| {
                    Err(StoreError::Other("stop".into()))
                }),
            )
            .unwrap();
        store.put("cfg/x", b"1".to_vec(), 0).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while store.active_watches() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(store.active_watches(), 0);
    }

    #[test]
    fn test_broadcast_failure() {
        let store = MemoryStore::new();
        let (_id, rx) = recording_watch(&store, "cfg", 0);
        store.broadcast_failure(StoreError::Unavailable("lost leader".into()));
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            WatchEvent::Failed(StoreError::Unavailable("lost leader".into()))
        );
    }
}
