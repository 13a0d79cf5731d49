//! # cluster-config
//!
//! Cluster and node scoped configuration propagation over a watchable key-value store.
//!
//! ## Overview
//!
//! `cluster-config` lets any process in a cluster subscribe to configuration
//! changes committed to a shared store:
//! - Two tree watches, one for cluster-wide objects and one for per-node objects
//! - Named callbacks per scope, replaced or rejected on duplicate names
//! - Best-effort fan-out: a failing callback never blocks the others
//! - Read-through and write-through access to configuration objects
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cluster_config::prelude::*;
//! use cluster_config::store::MemoryStore;
//! use std::sync::Arc;
//!
//! # fn example() -> Result<()> {
//! let manager = ConfigManager::new(Arc::new(MemoryStore::new()))?;
//!
//! manager.register_cluster_callback("logger", |id, record| {
//!     println!("cluster object {} is now {:?}", id, record.value_str());
//!     Ok(())
//! })?;
//!
//! // Delivered to "logger" through the store's watch, not synchronously.
//! manager.set_cluster_config("main", "replicas=3")?;
//!
//! match manager.get_node_config("node-7") {
//!     Err(e) if e.is_not_found() => println!("node-7 has no configuration yet"),
//!     other => println!("{:?}", other?),
//! }
//!
//! manager.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Layout
//!
//! Objects live at `<base_key>/<cluster_key>/<id>` and
//! `<base_key>/<node_key>/<id>`, by default `osdconfig/cluster/<id>` and
//! `osdconfig/nodes/<id>`. See [`core::ManagerSettings`].
//!
//! ## Feature Flags
//!
//! - `memory-store` (default): in-process [`store::MemoryStore`]
//! - `json` (default): typed JSON helpers
//! - `metrics`: OpenTelemetry dispatch metrics

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod notify;
pub mod store;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{
        ChangeRecord, ConfigManager, ConfigManagerBuilder, DuplicatePolicy, ManagerSettings,
        ScopeTag,
    };
    pub use crate::error::{ConfigError, HandlerError, HandlerResult, Result};
    pub use crate::store::{KvAction, KvPair, WatchableStore};
}
