//! Dispatch metrics tracking using OpenTelemetry.

use crate::core::ScopeTag;
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::time::Instant;

/// Metrics collector for change dispatch.
///
/// Every measurement carries a `scope` attribute (`cluster` or `node`).
///
/// # Examples
///
/// ```rust,no_run
/// use cluster_config::metrics::DispatchMetrics;
/// use opentelemetry::global;
///
/// let metrics = DispatchMetrics::new(global::meter("cluster-config"));
/// ```
#[derive(Clone)]
pub struct DispatchMetrics {
    records_dispatched: Counter<u64>,
    handler_invocations: Counter<u64>,
    handler_failures: Counter<u64>,
    unexpected_keys: Counter<u64>,
    dispatch_duration: Histogram<f64>,
    registered_callbacks: Gauge<i64>,
}

impl DispatchMetrics {
    /// Create a new metrics collector with the provided meter.
    pub fn new(meter: Meter) -> Self {
        let records_dispatched = meter
            .u64_counter("cluster_config.dispatch.records")
            .with_description("Number of change records dispatched")
            .build();

        let handler_invocations = meter
            .u64_counter("cluster_config.dispatch.invocations")
            .with_description("Number of callback invocations")
            .build();

        let handler_failures = meter
            .u64_counter("cluster_config.dispatch.failures")
            .with_description("Number of callbacks that returned an error or panicked")
            .build();

        let unexpected_keys = meter
            .u64_counter("cluster_config.dispatch.unexpected_keys")
            .with_description("Notifications dropped because their key matched no scope")
            .build();

        let dispatch_duration = meter
            .f64_histogram("cluster_config.dispatch.duration")
            .with_description("Time spent fanning out one change record")
            .with_unit("s")
            .build();

        let registered_callbacks = meter
            .i64_gauge("cluster_config.callbacks.registered")
            .with_description("Callbacks currently registered")
            .build();

        Self {
            records_dispatched,
            handler_invocations,
            handler_failures,
            unexpected_keys,
            dispatch_duration,
            registered_callbacks,
        }
    }

    /// Record one completed fan-out that started at `start`.
    pub fn record_dispatch(&self, scope: ScopeTag, start: Instant, invoked: usize, failed: usize) {
        let attrs = [KeyValue::new("scope", scope.as_str())];
        self.records_dispatched.add(1, &attrs);
        self.handler_invocations.add(invoked as u64, &attrs);
        if failed > 0 {
            self.handler_failures.add(failed as u64, &attrs);
        }
        self.dispatch_duration.record(start.elapsed().as_secs_f64(), &attrs);
    }

    /// Record the number of callbacks registered in `scope`.
    pub fn record_registered(&self, scope: ScopeTag, count: usize) {
        self.registered_callbacks
            .record(count as i64, &[KeyValue::new("scope", scope.as_str())]);
    }

    /// Record a notification whose key matched neither scope.
    pub fn record_unexpected_key(&self) {
        self.unexpected_keys.add(1, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::global;

    #[test]
    fn test_metrics_creation() {
        let metrics = DispatchMetrics::new(global::meter("test"));

        // Without an installed provider these are no-ops; they must not panic.
        metrics.record_dispatch(ScopeTag::Cluster, Instant::now(), 3, 1);
        metrics.record_dispatch(ScopeTag::Node, Instant::now(), 0, 0);
        metrics.record_unexpected_key();
        metrics.record_registered(ScopeTag::Cluster, 2);
        metrics.record_registered(ScopeTag::Node, 0);
    }

    #[test]
    fn test_metrics_clone() {
        let metrics = DispatchMetrics::new(global::meter("test"));
        let metrics2 = metrics.clone();

        metrics.record_dispatch(ScopeTag::Node, Instant::now(), 1, 0);
        metrics2.record_dispatch(ScopeTag::Node, Instant::now(), 1, 0);
    }
}
