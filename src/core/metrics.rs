//! Tap metrics for observability
//!
//! Counters for captured records, flushed batches and rows lost to sink
//! failures.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for tap observability
///
/// # Example
///
/// ```
/// use rust_log_tap::TapMetrics;
///
/// let metrics = TapMetrics::new();
///
/// metrics.record_captured();
/// metrics.record_batch(1);
///
/// assert_eq!(metrics.records_captured(), 1);
/// assert_eq!(metrics.rows_inserted(), 1);
/// ```
#[derive(Debug)]
pub struct TapMetrics {
    /// Console calls turned into records
    records_captured: AtomicU64,

    /// Insert calls that fully succeeded
    batches_flushed: AtomicU64,

    /// Rows accepted by the sink
    rows_inserted: AtomicU64,

    /// Rows lost to total or partial insert failures
    rows_dropped: AtomicU64,

    /// Insert calls that failed, totally or partially
    flush_failures: AtomicU64,

    tables_created: AtomicU64,
}

impl TapMetrics {
    /// Create a new metrics instance with all counters at zero
    pub const fn new() -> Self {
        Self {
            records_captured: AtomicU64::new(0),
            batches_flushed: AtomicU64::new(0),
            rows_inserted: AtomicU64::new(0),
            rows_dropped: AtomicU64::new(0),
            flush_failures: AtomicU64::new(0),
            tables_created: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn records_captured(&self) -> u64 {
        self.records_captured.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn batches_flushed(&self) -> u64 {
        self.batches_flushed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rows_inserted(&self) -> u64 {
        self.rows_inserted.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rows_dropped(&self) -> u64 {
        self.rows_dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn flush_failures(&self) -> u64 {
        self.flush_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn tables_created(&self) -> u64 {
        self.tables_created.load(Ordering::Relaxed)
    }

    /// Record a captured console call
    #[inline]
    pub fn record_captured(&self) -> u64 {
        self.records_captured.fetch_add(1, Ordering::Relaxed)
    }

    /// Record a fully accepted batch of `rows` rows
    #[inline]
    pub fn record_batch(&self, rows: usize) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.rows_inserted.fetch_add(rows as u64, Ordering::Relaxed);
    }

    /// Record a failed batch of `total` rows of which `rejected` were lost
    #[inline]
    pub fn record_failed_batch(&self, total: usize, rejected: usize) {
        self.flush_failures.fetch_add(1, Ordering::Relaxed);
        self.rows_dropped.fetch_add(rejected as u64, Ordering::Relaxed);
        self.rows_inserted
            .fetch_add(total.saturating_sub(rejected) as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_table_created(&self) -> u64 {
        self.tables_created.fetch_add(1, Ordering::Relaxed)
    }

    /// Share of sink-bound rows that were lost, as a percentage (0.0 - 100.0)
    ///
    /// Returns 0.0 if nothing has been flushed yet.
    pub fn drop_rate(&self) -> f64 {
        let dropped = self.rows_dropped() as f64;
        let total = self.rows_inserted() as f64 + dropped;
        if total == 0.0 {
            0.0
        } else {
            (dropped / total) * 100.0
        }
    }

    /// Reset all metrics to zero
    pub fn reset(&self) {
        self.records_captured.store(0, Ordering::Relaxed);
        self.batches_flushed.store(0, Ordering::Relaxed);
        self.rows_inserted.store(0, Ordering::Relaxed);
        self.rows_dropped.store(0, Ordering::Relaxed);
        self.flush_failures.store(0, Ordering::Relaxed);
        self.tables_created.store(0, Ordering::Relaxed);
    }
}

impl Default for TapMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for TapMetrics {
    /// Create a snapshot of the current metrics values
    fn clone(&self) -> Self {
        Self {
            records_captured: AtomicU64::new(self.records_captured()),
            batches_flushed: AtomicU64::new(self.batches_flushed()),
            rows_inserted: AtomicU64::new(self.rows_inserted()),
            rows_dropped: AtomicU64::new(self.rows_dropped()),
            flush_failures: AtomicU64::new(self.flush_failures()),
            tables_created: AtomicU64::new(self.tables_created()),
        }
    }
}
