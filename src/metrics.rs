//! # Reconciliation Metrics
//!
//! Observability hooks invoked by the scheduler. Every hook has a no-op default,
//! so an implementation only overrides what it records. Exporting the numbers is
//! left to the embedding application.
//!
//! [`ReconcileMetrics`] is a lock-free counter set suitable for health endpoints
//! and tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::ReconcilerError;
use crate::events::Event;
use crate::resource::{ResourceId, ResourceSnapshot};
use crate::retry::RetryInfo;

pub trait Metrics: Send + Sync {
    fn received_event(&self, _event: &Event) {}

    fn reconcile_resource(&self, _resource: &ResourceSnapshot, _retry_info: Option<&RetryInfo>) {}

    fn failed_reconciliation(&self, _id: &ResourceId, _error: &ReconcilerError) {}

    fn finished_reconciliation(&self, _id: &ResourceId) {}

    fn cleanup_done_for(&self, _id: &ResourceId) {}

    fn execution_started(&self, _id: &ResourceId) {}

    fn execution_finished(&self, _id: &ResourceId) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {}

/// Point-in-time copy of [`ReconcileMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_received: u64,
    pub reconciliations_started: u64,
    pub reconciliations_failed: u64,
    pub reconciliations_succeeded: u64,
    pub cleanups_completed: u64,
    pub executions_started: u64,
    pub executions_finished: u64,
}

impl MetricsSnapshot {
    /// Executions currently in flight
    pub fn in_flight(&self) -> u64 {
        self.executions_started
            .saturating_sub(self.executions_finished)
    }
}

/// Counter-based metrics
#[derive(Debug, Clone, Default)]
pub struct ReconcileMetrics {
    events_received: Arc<AtomicU64>,
    reconciliations_started: Arc<AtomicU64>,
    reconciliations_failed: Arc<AtomicU64>,
    reconciliations_succeeded: Arc<AtomicU64>,
    cleanups_completed: Arc<AtomicU64>,
    executions_started: Arc<AtomicU64>,
    executions_finished: Arc<AtomicU64>,
}

impl ReconcileMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            reconciliations_started: self.reconciliations_started.load(Ordering::Relaxed),
            reconciliations_failed: self.reconciliations_failed.load(Ordering::Relaxed),
            reconciliations_succeeded: self.reconciliations_succeeded.load(Ordering::Relaxed),
            cleanups_completed: self.cleanups_completed.load(Ordering::Relaxed),
            executions_started: self.executions_started.load(Ordering::Relaxed),
            executions_finished: self.executions_finished.load(Ordering::Relaxed),
        }
    }
}

impl Metrics for ReconcileMetrics {
    fn received_event(&self, _event: &Event) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    fn reconcile_resource(&self, _resource: &ResourceSnapshot, _retry_info: Option<&RetryInfo>) {
        self.reconciliations_started.fetch_add(1, Ordering::Relaxed);
    }

    fn failed_reconciliation(&self, _id: &ResourceId, _error: &ReconcilerError) {
        self.reconciliations_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn finished_reconciliation(&self, _id: &ResourceId) {
        self.reconciliations_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    fn cleanup_done_for(&self, _id: &ResourceId) {
        self.cleanups_completed.fetch_add(1, Ordering::Relaxed);
    }

    fn execution_started(&self, _id: &ResourceId) {
        self.executions_started.fetch_add(1, Ordering::Relaxed);
    }

    fn execution_finished(&self, _id: &ResourceId) {
        self.executions_finished.fetch_add(1, Ordering::Relaxed);
    }
}
