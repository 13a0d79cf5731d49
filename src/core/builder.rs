//! Builder for constructing ConfigManager instances.

use super::settings::SettingsLoader;
use super::{ConfigManager, DuplicatePolicy, ManagerSettings, ScopeTag};
use crate::error::Result;
use crate::notify::{CallbackRegistry, ChangeRouter};
use crate::store::WatchableStore;
use std::path::PathBuf;
use std::sync::Arc;

#[cfg(feature = "metrics")]
use crate::metrics::DispatchMetrics;

/// Builder for constructing a [`ConfigManager`].
///
/// Settings are layered: explicit [`with_settings`](Self::with_settings) (or
/// the defaults), then settings files in the order given, then environment
/// overrides. [`with_duplicate_policy`](Self::with_duplicate_policy) wins over
/// all of them.
///
/// # Examples
///
/// ```rust,no_run
/// use cluster_config::prelude::*;
/// use cluster_config::store::MemoryStore;
/// use std::sync::Arc;
///
/// # fn example() -> Result<()> {
/// let manager = ConfigManager::builder()
///     .with_settings_file("config/cluster-config.yaml")
///     .with_env_overrides("CLUSTER_CONFIG", "__")
///     .with_duplicate_policy(DuplicatePolicy::Reject)
///     .build(Arc::new(MemoryStore::new()))?;
/// # Ok(())
/// # }
/// ```
pub struct ConfigManagerBuilder {
    settings: ManagerSettings,
    loader: SettingsLoader,
    duplicate_policy: Option<DuplicatePolicy>,
    #[cfg(feature = "metrics")]
    metrics: Option<DispatchMetrics>,
}

impl ConfigManagerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            settings: ManagerSettings::default(),
            loader: SettingsLoader::default(),
            duplicate_policy: None,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Use `settings` as the base layer.
    pub fn with_settings(mut self, settings: ManagerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Add a settings file (YAML, TOML or JSON, detected by extension).
    ///
    /// Later files override earlier ones.
    pub fn with_settings_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.loader.add_file(path.into());
        self
    }

    /// Read overrides from environment variables.
    ///
    /// With prefix `CLUSTER_CONFIG`, `CLUSTER_CONFIG_BASE_KEY=fleet` sets
    /// `base_key`.
    pub fn with_env_overrides(mut self, prefix: &str, separator: &str) -> Self {
        self.loader.set_env(prefix.to_string(), separator.to_string());
        self
    }

    /// Choose how duplicate callback names are handled.
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = Some(policy);
        self
    }

    /// Record dispatch metrics with `metrics`.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: DispatchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Resolve the layered settings without building a manager.
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file cannot be read or parsed, or if
    /// the result fails [`ManagerSettings::validate`].
    pub fn resolve_settings(&self) -> Result<ManagerSettings> {
        let mut settings = if self.loader.is_empty() {
            self.settings.clone()
        } else {
            self.loader.load(&self.settings)?
        };
        if let Some(policy) = self.duplicate_policy {
            settings.duplicate_policy = policy;
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Build the manager and establish both watches on `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings cannot be loaded or are invalid (no watch is attempted)
    /// - Either tree watch fails
    ///   ([`ConfigError::Construction`](crate::error::ConfigError::Construction))
    pub fn build(self, store: Arc<dyn WatchableStore>) -> Result<ConfigManager> {
        let settings = self.resolve_settings()?;
        let policy = settings.duplicate_policy;

        let cluster = CallbackRegistry::new(ScopeTag::Cluster, policy);
        let node = CallbackRegistry::new(ScopeTag::Node, policy);
        #[cfg(feature = "metrics")]
        let (cluster, node) = match &self.metrics {
            Some(metrics) => (
                cluster.with_metrics(metrics.clone()),
                node.with_metrics(metrics.clone()),
            ),
            None => (cluster, node),
        };

        let router = ChangeRouter::new(settings.layout(), Arc::new(cluster), Arc::new(node));
        #[cfg(feature = "metrics")]
        let router = match self.metrics {
            Some(metrics) => router.with_metrics(metrics),
            None => router,
        };

        ConfigManager::start(store, settings, router)
    }
}

impl Default for ConfigManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    #[test]
    fn test_policy_override_wins() {
        let builder = ConfigManagerBuilder::new()
            .with_settings(ManagerSettings {
                duplicate_policy: DuplicatePolicy::Replace,
                ..Default::default()
            })
            .with_duplicate_policy(DuplicatePolicy::Reject);

        assert_eq!(
            builder.resolve_settings().unwrap().duplicate_policy,
            DuplicatePolicy::Reject
        );
    }

    #[cfg(feature = "memory-store")]
    #[test]
    fn test_invalid_settings_fail_before_watching() {
        let store = Arc::new(crate::store::MemoryStore::new());
        let result = ConfigManagerBuilder::new()
            .with_settings(ManagerSettings {
                node_key: "cluster".to_string(),
                ..Default::default()
            })
            .build(store.clone());

        assert!(matches!(result, Err(ConfigError::InvalidSettings(_))));
        assert_eq!(store.active_watches(), 0);
    }

    #[cfg(all(feature = "metrics", feature = "memory-store"))]
    #[test]
    fn test_metrics_reach_both_registries() {
        use opentelemetry::global;

        let store = Arc::new(crate::store::MemoryStore::new());
        let manager = ConfigManagerBuilder::new()
            .with_metrics(DispatchMetrics::new(global::meter("test")))
            .build(store)
            .unwrap();
        manager.register_cluster_callback("c", |_, _| Ok(())).unwrap();
        manager.register_node_callback("n", |_, _| Ok(())).unwrap();
        manager.deregister_node_callback("n");
        assert_eq!(manager.cluster_callback_names(), vec!["c"]);
        assert!(manager.node_callback_names().is_empty());
    }
}
