//! # Conductor Metrics
//!
//! Lock-free counters updated by conductor workers and read by status
//! reporting. Counters only ever increase; [`ConductorMetrics::snapshot`]
//! produces a serializable copy.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::services::Severity;

#[derive(Debug)]
pub struct ConductorMetrics {
    started_at: Instant,
    /// Descriptors accepted by `add`
    descriptors_added: AtomicU64,
    /// Descriptors that arrived while their object was already queued or in flight
    collisions: AtomicU64,
    /// Descriptors whose whole pipeline finished successfully
    descriptors_completed: AtomicU64,
    /// Individual service executions that succeeded
    services_completed: AtomicU64,
    /// Recoverable failures sent back to the queue
    retries: AtomicU64,
    unrecoverable_failures: AtomicU64,
    fatal_failures: AtomicU64,
    unclassified_failures: AtomicU64,
    /// In-flight descriptors discarded by abort
    aborted: AtomicU64,
}

/// Serializable copy of [`ConductorMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub descriptors_added: u64,
    pub collisions: u64,
    pub descriptors_completed: u64,
    pub services_completed: u64,
    pub retries: u64,
    pub unrecoverable_failures: u64,
    pub fatal_failures: u64,
    pub unclassified_failures: u64,
    pub aborted: u64,
}

impl MetricsSnapshot {
    /// Descriptors that ended in a recorded failure
    pub fn total_failures(&self) -> u64 {
        self.unrecoverable_failures + self.fatal_failures + self.unclassified_failures
    }
}

impl Default for ConductorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ConductorMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            descriptors_added: AtomicU64::new(0),
            collisions: AtomicU64::new(0),
            descriptors_completed: AtomicU64::new(0),
            services_completed: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            unrecoverable_failures: AtomicU64::new(0),
            fatal_failures: AtomicU64::new(0),
            unclassified_failures: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
        }
    }

    pub fn record_added(&self, collision: bool) {
        self.descriptors_added.fetch_add(1, Ordering::Relaxed);
        if collision {
            self.collisions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_completed(&self, services_executed: u64) {
        self.descriptors_completed.fetch_add(1, Ordering::Relaxed);
        self.services_completed
            .fetch_add(services_executed, Ordering::Relaxed);
    }

    /// Services that succeeded before a later service in the pipeline failed
    pub fn record_services_completed(&self, services_executed: u64) {
        self.services_completed
            .fetch_add(services_executed, Ordering::Relaxed);
    }

    pub fn record_failure(&self, severity: Severity) {
        let counter = match severity {
            Severity::Recoverable => &self.retries,
            Severity::Unrecoverable => &self.unrecoverable_failures,
            Severity::Fatal => &self.fatal_failures,
            Severity::Unclassified => &self.unclassified_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_aborted(&self, count: u64) {
        self.aborted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn services_completed(&self) -> u64 {
        self.services_completed.load(Ordering::Relaxed)
    }

    pub fn descriptors_completed(&self) -> u64 {
        self.descriptors_completed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_seconds: self.started_at.elapsed().as_secs(),
            descriptors_added: self.descriptors_added.load(Ordering::Relaxed),
            collisions: self.collisions.load(Ordering::Relaxed),
            descriptors_completed: self.descriptors_completed.load(Ordering::Relaxed),
            services_completed: self.services_completed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            unrecoverable_failures: self.unrecoverable_failures.load(Ordering::Relaxed),
            fatal_failures: self.fatal_failures.load(Ordering::Relaxed),
            unclassified_failures: self.unclassified_failures.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_counted_by_severity() {
        let metrics = ConductorMetrics::new();
        metrics.record_failure(Severity::Recoverable);
        metrics.record_failure(Severity::Fatal);
        metrics.record_failure(Severity::Unclassified);
        metrics.record_failure(Severity::Unclassified);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.fatal_failures, 1);
        assert_eq!(snapshot.unclassified_failures, 2);
        assert_eq!(snapshot.total_failures(), 3);
    }

    #[test]
    fn test_completion_counts_services() {
        let metrics = ConductorMetrics::new();
        metrics.record_added(false);
        metrics.record_added(true);
        metrics.record_completed(3);
        metrics.record_services_completed(1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.descriptors_added, 2);
        assert_eq!(snapshot.collisions, 1);
        assert_eq!(snapshot.descriptors_completed, 1);
        assert_eq!(snapshot.services_completed, 4);
    }
}
