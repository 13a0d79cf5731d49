//! Routing of store notifications to the callbacks of their scope.

use super::CallbackRegistry;
use crate::core::{ChangeRecord, KeyLayout, ScopeTag};
use crate::store::{StoreResult, WatchEvent};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{debug, warn};

#[cfg(feature = "metrics")]
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::DispatchMetrics;

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that were called
    pub invoked: usize,
    /// Handlers that returned an error or panicked
    pub failed: usize,
}

/// Classifies change notifications by scope and fans them out.
///
/// Fan-out is best effort: every handler in the scope's snapshot is called in
/// name order, and a handler that fails (by error or panic) is logged and
/// skipped without affecting the rest or being deregistered.
pub struct ChangeRouter {
    layout: KeyLayout,
    cluster: Arc<CallbackRegistry>,
    node: Arc<CallbackRegistry>,
    #[cfg(feature = "metrics")]
    metrics: Option<DispatchMetrics>,
}

impl ChangeRouter {
    /// Create a router over the two scope registries.
    pub fn new(
        layout: KeyLayout,
        cluster: Arc<CallbackRegistry>,
        node: Arc<CallbackRegistry>,
    ) -> Self {
        Self {
            layout,
            cluster,
            node,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Record dispatch metrics through `metrics`.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: DispatchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Registry serving `scope`.
    pub fn registry(&self, scope: ScopeTag) -> &Arc<CallbackRegistry> {
        match scope {
            ScopeTag::Cluster => &self.cluster,
            ScopeTag::Node => &self.node,
        }
    }

    /// Watch callback entry point.
    ///
    /// Always returns `Ok` so the store keeps the watch alive: handler errors
    /// stay local and watch failures are the store's to recover from.
    pub fn on_watch_event(&self, prefix: &str, event: &WatchEvent) -> StoreResult<()> {
        match event {
            WatchEvent::Changed(pair) => match self.layout.classify(&pair.key) {
                Some((scope, id)) => {
                    let record = ChangeRecord::from_pair(scope, id, pair);
                    self.dispatch(&record);
                }
                None => {
                    #[cfg(feature = "metrics")]
                    if let Some(metrics) = &self.metrics {
                        metrics.record_unexpected_key();
                    }
                    warn!(
                        prefix,
                        key = %pair.key,
                        "dropping change outside configuration subtrees"
                    );
                }
            },
            WatchEvent::Failed(err) => {
                warn!(prefix, error = %err, "configuration watch reported a failure");
            }
        }
        Ok(())
    }

    /// Invoke every callback registered for the record's scope.
    pub fn dispatch(&self, record: &ChangeRecord) -> DispatchReport {
        let snapshot = self.registry(record.scope).snapshot();
        debug!(
            scope = %record.scope,
            key = %record.key,
            action = ?record.action,
            handlers = snapshot.len(),
            "dispatching configuration change"
        );

        #[cfg(feature = "metrics")]
        let start = Instant::now();
        let mut report = DispatchReport::default();
        for (name, callback) in snapshot.iter() {
            report.invoked += 1;
            match catch_unwind(AssertUnwindSafe(|| callback(&record.id, record))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(
                        scope = %record.scope,
                        name = %name,
                        key = %record.key,
                        error = %e,
                        "configuration callback failed"
                    );
                }
                Err(_) => {
                    report.failed += 1;
                    warn!(
                        scope = %record.scope,
                        name = %name,
                        key = %record.key,
                        "configuration callback panicked"
                    );
                }
            }
        }

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_dispatch(record.scope, start, report.invoked, report.failed);
        }

        report
    }
}
