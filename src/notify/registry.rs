//! Named callback storage for one configuration scope.

use crate::core::{ChangeRecord, DuplicatePolicy, ScopeTag};
use crate::error::{ConfigError, HandlerResult, Result};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[cfg(feature = "metrics")]
use crate::metrics::DispatchMetrics;

/// A registered configuration callback.
///
/// Receives the object id and the change record.
pub type ConfigCallback = Arc<dyn Fn(&str, &ChangeRecord) -> HandlerResult + Send + Sync>;

/// Immutable point-in-time view of a registry, ordered by name.
pub type RegistrySnapshot = Arc<BTreeMap<String, ConfigCallback>>;

/// Registry of named callbacks for a single scope.
///
/// Writers are serialized by a mutex and publish a fresh map on every change.
/// [`snapshot`](Self::snapshot) never takes the mutex, so dispatch can iterate
/// while registrations continue, and handlers never run under the lock.
///
/// # Examples
///
/// ```rust
/// use cluster_config::core::{DuplicatePolicy, ScopeTag};
/// use cluster_config::notify::CallbackRegistry;
///
/// let registry = CallbackRegistry::new(ScopeTag::Cluster, DuplicatePolicy::Replace);
/// registry.register("audit", |_id, _record| Ok(())).unwrap();
/// assert_eq!(registry.len(), 1);
///
/// registry.deregister("audit");
/// assert!(registry.is_empty());
/// ```
pub struct CallbackRegistry {
    scope: ScopeTag,
    policy: DuplicatePolicy,
    write_lock: Mutex<()>,
    callbacks: ArcSwap<BTreeMap<String, ConfigCallback>>,
    #[cfg(feature = "metrics")]
    metrics: Option<DispatchMetrics>,
}

impl CallbackRegistry {
    /// Create an empty registry for `scope`.
    pub fn new(scope: ScopeTag, policy: DuplicatePolicy) -> Self {
        Self {
            scope,
            policy,
            write_lock: Mutex::new(()),
            callbacks: ArcSwap::from_pointee(BTreeMap::new()),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Report the registered count through `metrics` after every change.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: DispatchMetrics) -> Self {
        metrics.record_registered(self.scope, self.len());
        self.metrics = Some(metrics);
        self
    }

    /// Publish `next` as the current map. Caller holds `write_lock`.
    fn publish(&self, next: BTreeMap<String, ConfigCallback>) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_registered(self.scope, next.len());
        }
        self.callbacks.store(Arc::new(next));
    }

    /// Scope this registry serves.
    pub fn scope(&self) -> ScopeTag {
        self.scope
    }

    /// Register `callback` under `name`.
    ///
    /// With [`DuplicatePolicy::Replace`] an existing entry is overwritten and
    /// this always succeeds.
    ///
    /// # Errors
    ///
    /// With [`DuplicatePolicy::Reject`], returns
    /// [`ConfigError::DuplicateCallback`] if `name` is taken.
    pub fn register<F>(&self, name: impl Into<String>, callback: F) -> Result<()>
    where
        F: Fn(&str, &ChangeRecord) -> HandlerResult + Send + Sync + 'static,
    {
        self.register_arc(name.into(), Arc::new(callback))
    }

    pub(crate) fn register_arc(&self, name: String, callback: ConfigCallback) -> Result<()> {
        let _guard = self.write_lock.lock();
        let current = self.callbacks.load();

        if current.contains_key(&name) && self.policy == DuplicatePolicy::Reject {
            return Err(ConfigError::DuplicateCallback {
                scope: self.scope,
                name,
            });
        }

        let mut next = BTreeMap::clone(&current);
        let replaced = next.insert(name.clone(), callback).is_some();
        self.publish(next);

        debug!(scope = %self.scope, name = %name, replaced, "callback registered");
        Ok(())
    }

    /// Remove the callback registered under `name`.
    ///
    /// Returns true if an entry was removed. Unknown names are ignored.
    pub fn deregister(&self, name: &str) -> bool {
        let _guard = self.write_lock.lock();
        let current = self.callbacks.load();
        if !current.contains_key(name) {
            return false;
        }

        let mut next = BTreeMap::clone(&current);
        next.remove(name);
        self.publish(next);

        debug!(scope = %self.scope, name, "callback deregistered");
        true
    }

    /// Remove every callback.
    pub fn clear(&self) {
        let _guard = self.write_lock.lock();
        self.publish(BTreeMap::new());
    }

    /// Current callbacks as an immutable snapshot.
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.callbacks.load_full()
    }

    /// Registered names in dispatch order.
    pub fn names(&self) -> Vec<String> {
        self.callbacks.load().keys().cloned().collect()
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.load().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
