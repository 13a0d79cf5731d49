//! Built-in metrics for change dispatch.
//!
//! Provides OpenTelemetry metrics tracking:
//! - Records dispatched per scope
//! - Callback invocations and failures
//! - Fan-out duration
//! - Notifications dropped as unexpected
//!
//! # Examples
//!
//! ```rust,no_run
//! use cluster_config::metrics::DispatchMetrics;
//! use cluster_config::prelude::*;
//! use cluster_config::store::MemoryStore;
//! use opentelemetry::global;
//! use std::sync::Arc;
//!
//! # fn example() -> Result<()> {
//! let manager = ConfigManager::builder()
//!     .with_metrics(DispatchMetrics::new(global::meter("my-app")))
//!     .build(Arc::new(MemoryStore::new()))?;
//! # Ok(())
//! # }
//! ```

mod dispatch_metrics;

pub use dispatch_metrics::DispatchMetrics;
