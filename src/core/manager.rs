//! The configuration manager façade.

use super::{ChangeRecord, KeyLayout, ManagerSettings, ScopeTag};
use crate::error::{ConfigError, HandlerResult, Result, StoreError};
use crate::notify::{CallbackRegistry, ChangeRouter};
use crate::store::{KvPair, WatchEvent, WatchId, WatchableStore};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Watches cluster and node configuration in a store and dispatches changes
/// to registered callbacks.
///
/// Construction establishes one tree watch per scope; if either fails, no
/// manager is returned and no watch is left behind. Writes go to the store
/// only: callbacks (including the writer's own) are driven solely by the
/// watches, so every subscriber sees the same notification stream.
///
/// # Examples
///
/// ```rust,no_run
/// use cluster_config::prelude::*;
/// use cluster_config::store::MemoryStore;
/// use std::sync::Arc;
///
/// # fn example() -> Result<()> {
/// let manager = ConfigManager::new(Arc::new(MemoryStore::new()))?;
///
/// manager.register_node_callback("scheduler", |id, record| {
///     println!("node {} changed: {:?}", id, record.action);
///     Ok(())
/// })?;
///
/// manager.set_node_config("node-1", b"weight=3".to_vec())?;
/// # Ok(())
/// # }
/// ```
pub struct ConfigManager {
    store: Arc<dyn WatchableStore>,
    settings: ManagerSettings,
    layout: KeyLayout,
    router: Arc<ChangeRouter>,
    /// `None` once closed.
    watches: Mutex<Option<[WatchId; 2]>>,
}

impl ConfigManager {
    /// Create a manager with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Construction`] if either watch cannot be established.
    pub fn new(store: Arc<dyn WatchableStore>) -> Result<Self> {
        Self::builder().build(store)
    }

    /// Create a builder for configuring a manager.
    pub fn builder() -> super::ConfigManagerBuilder {
        super::ConfigManagerBuilder::new()
    }

    /// Wire both watches to `router`.
    pub(crate) fn start(
        store: Arc<dyn WatchableStore>,
        settings: ManagerSettings,
        router: ChangeRouter,
    ) -> Result<Self> {
        let layout = settings.layout();
        let router = Arc::new(router);

        let mut established: Vec<WatchId> = Vec::with_capacity(2);
        for scope in ScopeTag::ALL {
            let prefix = layout.prefix(scope);
            let watch_router = Arc::clone(&router);
            let result = store.watch_tree(
                prefix,
                settings.watch_from_index,
                Box::new(move |prefix: &str, event: &WatchEvent| {
                    watch_router.on_watch_event(prefix, event)
                }),
            );

            match result {
                Ok(id) => established.push(id),
                Err(e) => {
                    error!(
                        scope = %scope,
                        prefix,
                        error = %e,
                        "failed to watch configuration subtree"
                    );
                    for id in established {
                        if let Err(cancel_err) = store.cancel_watch(id) {
                            warn!(
                                watch = %id,
                                error = %cancel_err,
                                "failed to cancel partial watch"
                            );
                        }
                    }
                    return Err(ConfigError::Construction(e));
                }
            }
        }

        info!(
            cluster = layout.prefix(ScopeTag::Cluster),
            node = layout.prefix(ScopeTag::Node),
            "configuration watches established"
        );

        Ok(Self {
            store,
            settings,
            layout,
            router,
            watches: Mutex::new(Some([established[0], established[1]])),
        })
    }

    /// Settings the manager was built with.
    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Key layout of the two subtrees.
    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    /// Returns true until [`close`](Self::close) is called.
    pub fn is_active(&self) -> bool {
        self.watches.lock().is_some()
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(ConfigError::Closed)
        }
    }

    fn registry(&self, scope: ScopeTag) -> &CallbackRegistry {
        self.router.registry(scope)
    }

    /// Register a callback for cluster configuration changes.
    ///
    /// # Errors
    ///
    /// Fails if the manager is closed, or if `name` is taken and the
    /// duplicate policy is [`Reject`](super::DuplicatePolicy::Reject).
    pub fn register_cluster_callback<F>(&self, name: impl Into<String>, callback: F) -> Result<()>
    where
        F: Fn(&str, &ChangeRecord) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(ScopeTag::Cluster, name.into(), callback)
    }

    /// Register a callback for node configuration changes.
    ///
    /// # Errors
    ///
    /// Same as [`register_cluster_callback`](Self::register_cluster_callback).
    pub fn register_node_callback<F>(&self, name: impl Into<String>, callback: F) -> Result<()>
    where
        F: Fn(&str, &ChangeRecord) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(ScopeTag::Node, name.into(), callback)
    }

    fn register<F>(&self, scope: ScopeTag, name: String, callback: F) -> Result<()>
    where
        F: Fn(&str, &ChangeRecord) -> HandlerResult + Send + Sync + 'static,
    {
        // Held across the insert so a concurrent `close` clears after us.
        let watches = self.watches.lock();
        if watches.is_none() {
            return Err(ConfigError::Closed);
        }
        self.registry(scope).register_arc(name, Arc::new(callback))
    }

    /// Remove a cluster callback. Unknown names are ignored.
    pub fn deregister_cluster_callback(&self, name: &str) {
        self.registry(ScopeTag::Cluster).deregister(name);
    }

    /// Remove a node callback. Unknown names are ignored.
    pub fn deregister_node_callback(&self, name: &str) {
        self.registry(ScopeTag::Node).deregister(name);
    }

    /// Names of the registered cluster callbacks.
    pub fn cluster_callback_names(&self) -> Vec<String> {
        self.registry(ScopeTag::Cluster).names()
    }

    /// Names of the registered node callbacks.
    pub fn node_callback_names(&self) -> Vec<String> {
        self.registry(ScopeTag::Node).names()
    }

    /// Write cluster configuration object `id`.
    ///
    /// Callbacks run only when the store's watch delivers the change.
    pub fn set_cluster_config(&self, id: &str, value: impl Into<Vec<u8>>) -> Result<KvPair> {
        self.put(ScopeTag::Cluster, id, value.into())
    }

    /// Write node configuration object `id`.
    pub fn set_node_config(&self, id: &str, value: impl Into<Vec<u8>>) -> Result<KvPair> {
        self.put(ScopeTag::Node, id, value.into())
    }

    /// Read cluster configuration object `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if it is absent, and other store
    /// failures as [`ConfigError::Store`].
    pub fn get_cluster_config(&self, id: &str) -> Result<KvPair> {
        self.get(ScopeTag::Cluster, id)
    }

    /// Read node configuration object `id`.
    pub fn get_node_config(&self, id: &str) -> Result<KvPair> {
        self.get(ScopeTag::Node, id)
    }

    /// Delete cluster configuration object `id`.
    pub fn delete_cluster_config(&self, id: &str) -> Result<KvPair> {
        self.delete(ScopeTag::Cluster, id)
    }

    /// Delete node configuration object `id`.
    pub fn delete_node_config(&self, id: &str) -> Result<KvPair> {
        self.delete(ScopeTag::Node, id)
    }

    /// All cluster configuration objects, keyed by id.
    pub fn enumerate_cluster_configs(&self) -> Result<Vec<(String, KvPair)>> {
        self.enumerate(ScopeTag::Cluster)
    }

    /// All node configuration objects, keyed by id.
    pub fn enumerate_node_configs(&self) -> Result<Vec<(String, KvPair)>> {
        self.enumerate(ScopeTag::Node)
    }

    fn put(&self, scope: ScopeTag, id: &str, value: Vec<u8>) -> Result<KvPair> {
        self.ensure_active()?;
        let key = self.layout.key(scope, id);
        Ok(self.store.put(&key, value, self.settings.default_ttl)?)
    }

    fn get(&self, scope: ScopeTag, id: &str) -> Result<KvPair> {
        self.ensure_active()?;
        Ok(self.store.get(&self.layout.key(scope, id))?)
    }

    fn delete(&self, scope: ScopeTag, id: &str) -> Result<KvPair> {
        self.ensure_active()?;
        Ok(self.store.delete(&self.layout.key(scope, id))?)
    }

    fn enumerate(&self, scope: ScopeTag) -> Result<Vec<(String, KvPair)>> {
        self.ensure_active()?;
        let pairs = self.store.enumerate(self.layout.prefix(scope))?;
        Ok(pairs
            .into_iter()
            .filter_map(|pair| match self.layout.classify(&pair.key) {
                Some((found, id)) if found == scope && !id.is_empty() => {
                    Some((id.to_string(), pair))
                }
                _ => None,
            })
            .collect())
    }

    /// Write cluster object `id` as JSON.
    #[cfg(feature = "json")]
    pub fn set_cluster_config_json<T: serde::Serialize>(
        &self,
        id: &str,
        value: &T,
    ) -> Result<KvPair> {
        self.set_cluster_config(id, serde_json::to_vec(value)?)
    }

    /// Write node object `id` as JSON.
    #[cfg(feature = "json")]
    pub fn set_node_config_json<T: serde::Serialize>(
        &self,
        id: &str,
        value: &T,
    ) -> Result<KvPair> {
        self.set_node_config(id, serde_json::to_vec(value)?)
    }

    /// Read cluster object `id` and decode it from JSON.
    #[cfg(feature = "json")]
    pub fn get_cluster_config_json<T: serde::de::DeserializeOwned>(&self, id: &str) -> Result<T> {
        Ok(serde_json::from_slice(&self.get_cluster_config(id)?.value)?)
    }

    /// Read node object `id` and decode it from JSON.
    #[cfg(feature = "json")]
    pub fn get_node_config_json<T: serde::de::DeserializeOwned>(&self, id: &str) -> Result<T> {
        Ok(serde_json::from_slice(&self.get_node_config(id)?.value)?)
    }

    /// Cancel both watches and drop every registered callback.
    ///
    /// Idempotent. Afterwards store operations and registrations fail with
    /// [`ConfigError::Closed`]. Events already queued by the store may still
    /// arrive but find no callbacks.
    ///
    /// # Errors
    ///
    /// Returns the first cancellation failure; both watches are attempted
    /// regardless, and the manager is closed either way.
    pub fn close(&self) -> Result<()> {
        let Some(watches) = self.watches.lock().take() else {
            return Ok(());
        };

        let mut first_err: Option<StoreError> = None;
        for id in watches {
            if let Err(e) = self.store.cancel_watch(id) {
                warn!(watch = %id, error = %e, "failed to cancel configuration watch");
                first_err.get_or_insert(e);
            }
        }

        for scope in ScopeTag::ALL {
            self.registry(scope).clear();
        }

        info!("configuration manager closed");
        match first_err {
            Some(e) => Err(ConfigError::Store(e)),
            None => Ok(()),
        }
    }
}

impl Drop for ConfigManager {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
