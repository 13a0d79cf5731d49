//! Error types for cluster-config.

use crate::core::ScopeTag;

/// Result type alias for cluster-config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Error returned by a registered callback.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by registered callbacks.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Errors reported by a [`WatchableStore`](crate::store::WatchableStore).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The requested key does not exist.
    #[error("Key not found: {0}")]
    NotFound(String),

    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The watch was cancelled or never existed.
    #[error("Watch {0} is not active")]
    WatchCancelled(u64),

    /// Any other store failure.
    #[error("Store error: {0}")]
    Other(String),
}

/// Errors that can occur when working with the configuration manager.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Establishing one of the tree watches failed.
    #[error("Failed to establish configuration watch: {0}")]
    Construction(StoreError),

    /// No configuration object is stored under the key.
    #[error("Configuration not found: {key}")]
    NotFound {
        /// The full store key that was looked up
        key: String,
    },

    /// A store operation failed.
    #[error(transparent)]
    Store(StoreError),

    /// A callback with this name is already registered and duplicates are rejected.
    #[error("Callback '{name}' is already registered for {scope} scope")]
    DuplicateCallback {
        /// Scope the registration was attempted in
        scope: ScopeTag,
        /// The conflicting registration name
        name: String,
    },

    /// The manager has been closed.
    #[error("Configuration manager is closed")]
    Closed,

    /// Failed to encode or decode a configuration value.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Failed to load manager settings.
    #[error("Failed to load settings: {0}")]
    LoadError(String),

    /// Failed to deserialize manager settings.
    #[error("Failed to deserialize settings: {0}")]
    DeserializationError(String),

    /// Manager settings are not usable.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

impl ConfigError {
    /// Returns true if this error means the key was absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<StoreError> for ConfigError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => ConfigError::NotFound { key },
            other => ConfigError::Store(other),
        }
    }
}

#[cfg(feature = "json")]
impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Serialization(err.to_string())
    }
}
