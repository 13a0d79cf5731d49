//! Manager settings and their layered loading.

use super::KeyLayout;
use crate::error::{ConfigError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What to do when a callback name is registered twice in one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// The new handler replaces the old one (last writer wins).
    #[default]
    Replace,
    /// The second registration fails with [`ConfigError::DuplicateCallback`].
    Reject,
}

/// Settings for a [`ConfigManager`](super::ConfigManager).
///
/// Every field has a default, so an empty settings file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// Root of both configuration subtrees
    pub base_key: String,
    /// Subtree of cluster-wide objects under `base_key`
    pub cluster_key: String,
    /// Subtree of per-node objects under `base_key`
    pub node_key: String,
    /// Handling of duplicate callback names
    pub duplicate_policy: DuplicatePolicy,
    /// Store version both watches start from (0 = live changes only)
    pub watch_from_index: u64,
    /// TTL in seconds applied to every write (0 = no expiry)
    pub default_ttl: u64,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            base_key: "osdconfig".to_string(),
            cluster_key: "cluster".to_string(),
            node_key: "nodes".to_string(),
            duplicate_policy: DuplicatePolicy::Replace,
            watch_from_index: 0,
            default_ttl: 0,
        }
    }
}

impl ManagerSettings {
    /// Check that the key layout is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSettings`] if a key component is empty or
    /// contains `/`, or if the cluster and node subtrees coincide.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("base_key", &self.base_key),
            ("cluster_key", &self.cluster_key),
            ("node_key", &self.node_key),
        ] {
            if value.is_empty() {
                return Err(ConfigError::InvalidSettings(format!("{} must not be empty", field)));
            }
            if value.contains('/') {
                return Err(ConfigError::InvalidSettings(format!(
                    "{} must be a single path component, got '{}'",
                    field, value
                )));
            }
        }
        if self.cluster_key == self.node_key {
            return Err(ConfigError::InvalidSettings(format!(
                "cluster_key and node_key must differ (both '{}')",
                self.cluster_key
            )));
        }
        Ok(())
    }

    /// Key layout described by these settings.
    pub fn layout(&self) -> KeyLayout {
        KeyLayout::new(&self.base_key, &self.cluster_key, &self.node_key)
    }
}

/// Loads [`ManagerSettings`] by layering files and environment variables.
///
/// Layers are merged in order: the base settings, then each file in the
/// order added, then environment variables. Later layers override earlier ones.
#[derive(Debug, Default)]
pub(crate) struct SettingsLoader {
    files: Vec<PathBuf>,
    env: Option<(String, String)>,
}

impl SettingsLoader {
    pub(crate) fn add_file(&mut self, path: PathBuf) {
        self.files.push(path);
    }

    pub(crate) fn set_env(&mut self, prefix: String, separator: String) {
        self.env = Some((prefix, separator));
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.files.is_empty() && self.env.is_none()
    }

    pub(crate) fn load(&self, base: &ManagerSettings) -> Result<ManagerSettings> {
        let defaults = Config::try_from(base)
            .map_err(|e| ConfigError::LoadError(format!("Failed to seed defaults: {}", e)))?;
        let mut builder = Config::builder().add_source(defaults);

        for path in &self.files {
            validate_extension(path)?;
            if !path.exists() {
                return Err(ConfigError::LoadError(format!(
                    "Settings file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path.clone()).required(true));
        }

        if let Some((prefix, separator)) = &self.env {
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator(separator)
                    .try_parsing(true),
            );
        }

        let merged = builder
            .build()
            .map_err(|e| ConfigError::LoadError(format!("Failed to build settings: {}", e)))?;

        merged.try_deserialize::<ManagerSettings>().map_err(|e| {
            ConfigError::DeserializationError(format!("Failed to deserialize settings: {}", e))
        })
    }
}

fn validate_extension(path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| {
            ConfigError::LoadError(format!(
                "Unable to determine file format for: {}",
                path.display()
            ))
        })?;

    match extension {
        "yaml" | "yml" | "toml" | "json" => Ok(()),
        _ => Err(ConfigError::LoadError(format!(
            "Unsupported file extension: {}. Supported: .yaml, .yml, .toml, .json",
            extension
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let settings = ManagerSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.layout().prefix(crate::core::ScopeTag::Node), "osdconfig/nodes");
    }

    #[test]
    fn test_validate_rejects_bad_layouts() {
        let empty = ManagerSettings {
            base_key: String::new(),
            ..Default::default()
        };
        assert!(matches!(empty.validate(), Err(ConfigError::InvalidSettings(_))));

        let nested = ManagerSettings {
            cluster_key: "a/b".to_string(),
            ..Default::default()
        };
        assert!(nested.validate().is_err());

        let same = ManagerSettings {
            node_key: "cluster".to_string(),
            ..Default::default()
        };
        assert!(same.validate().is_err());
    }

    #[test]
    fn test_load_without_layers_returns_base() {
        let loader = SettingsLoader::default();
        assert!(loader.is_empty());
        let base = ManagerSettings {
            default_ttl: 5,
            ..Default::default()
        };
        assert_eq!(loader.load(&base).unwrap(), base);
    }

    #[test]
    fn test_later_files_override_earlier() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("base.yaml");
        let second = dir.path().join("override.toml");
        fs::write(&first, "base_key: pxconfig\nduplicate_policy: reject\n").unwrap();
        fs::write(&second, "base_key = \"fleet\"\n").unwrap();

        let mut loader = SettingsLoader::default();
        loader.add_file(first);
        loader.add_file(second);
        let settings = loader.load(&ManagerSettings::default()).unwrap();

        assert_eq!(settings.base_key, "fleet");
        assert_eq!(settings.duplicate_policy, DuplicatePolicy::Reject);
        assert_eq!(settings.node_key, "nodes");
    }

    #[test]
    fn test_unsupported_extension() {
        let mut loader = SettingsLoader::default();
        loader.add_file(PathBuf::from("settings.ini"));
        assert!(matches!(
            loader.load(&ManagerSettings::default()),
            Err(ConfigError::LoadError(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let mut loader = SettingsLoader::default();
        loader.add_file(PathBuf::from("/nonexistent/settings.yaml"));
        assert!(loader.load(&ManagerSettings::default()).is_err());
    }
}
