//! # Metrics
//!
//! Counters for index traffic, shared cheaply between an index and whoever
//! wants to observe it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Metrics collector
#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    // Write metrics
    items_added: AtomicU64,
    insert_failures: AtomicU64,
    deletions: AtomicU64,

    // Query metrics
    queries: AtomicU64,
    padded_rows: AtomicU64,
    failed_queries: AtomicU64,

    // Batch metrics
    batches: AtomicU64,
    worker_failures: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record items stored by the engine
    pub fn record_added(&self, count: u64) {
        self.inner.items_added.fetch_add(count, Ordering::Relaxed);
    }

    /// Record items the engine did not store
    pub fn record_insert_failures(&self, count: u64) {
        self.inner.insert_failures.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a soft deletion
    pub fn record_deletion(&self) {
        self.inner.deletions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record executed queries
    pub fn record_queries(&self, count: u64) {
        self.inner.queries.fetch_add(count, Ordering::Relaxed);
    }

    /// Record batch rows padded with sentinels
    pub fn record_padded_rows(&self, count: u64) {
        self.inner.padded_rows.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a query call that failed for lack of neighbors
    pub fn record_failed_query(&self) {
        self.inner.failed_queries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a partitioned batch call
    pub fn record_batch(&self) {
        self.inner.batches.fetch_add(1, Ordering::Relaxed);
    }

    /// Record worker chunks that failed or panicked
    pub fn record_worker_failures(&self, count: u64) {
        self.inner.worker_failures.fetch_add(count, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_added: self.inner.items_added.load(Ordering::Relaxed),
            insert_failures: self.inner.insert_failures.load(Ordering::Relaxed),
            deletions: self.inner.deletions.load(Ordering::Relaxed),
            queries: self.inner.queries.load(Ordering::Relaxed),
            padded_rows: self.inner.padded_rows.load(Ordering::Relaxed),
            failed_queries: self.inner.failed_queries.load(Ordering::Relaxed),
            batches: self.inner.batches.load(Ordering::Relaxed),
            worker_failures: self.inner.worker_failures.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub items_added: u64,
    pub insert_failures: u64,
    pub deletions: u64,
    pub queries: u64,
    pub padded_rows: u64,
    pub failed_queries: u64,
    pub batches: u64,
    pub worker_failures: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    name: &'static str,
}

impl Timer {
    /// Start new timer
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop timer and log duration
    pub fn stop(self, items: usize) {
        let duration = self.elapsed();
        tracing::debug!(
            name = self.name,
            items,
            duration_ms = duration.as_millis() as u64,
            "Batch completed"
        );
    }
}
