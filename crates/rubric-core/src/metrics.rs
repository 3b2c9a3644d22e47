//! Global atomic counters for Rubric.
//!
//! Counters are incremented at the call site. Call [`Metrics::flush`] to
//! emit the current values as one `tracing::info!` event (for example when
//! a CLI command finishes).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    records_submitted: AtomicU64,
    submissions_rejected: AtomicU64,
    snapshots_computed: AtomicU64,
    cache_hits: AtomicU64,
    metadata_timeouts: AtomicU64,
    records_exported: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            records_submitted: AtomicU64::new(0),
            submissions_rejected: AtomicU64::new(0),
            snapshots_computed: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            metadata_timeouts: AtomicU64::new(0),
            records_exported: AtomicU64::new(0),
        }
    }

    pub fn inc_records_submitted(&self) {
        self.records_submitted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "records_submitted", "counter incremented");
    }

    pub fn inc_submissions_rejected(&self) {
        self.submissions_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "submissions_rejected", "counter incremented");
    }

    pub fn inc_snapshots_computed(&self) {
        self.snapshots_computed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "snapshots_computed", "counter incremented");
    }

    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cache_hits", "counter incremented");
    }

    pub fn inc_metadata_timeouts(&self) {
        self.metadata_timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "metadata_timeouts", "counter incremented");
    }

    pub fn add_records_exported(&self, n: u64) {
        self.records_exported.fetch_add(n, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            records_submitted = self.records_submitted(),
            submissions_rejected = self.submissions_rejected(),
            snapshots_computed = self.snapshots_computed(),
            cache_hits = self.cache_hits(),
            metadata_timeouts = self.metadata_timeouts(),
            records_exported = self.records_exported(),
        );
    }

    pub fn records_submitted(&self) -> u64 {
        self.records_submitted.load(Ordering::Relaxed)
    }

    pub fn submissions_rejected(&self) -> u64 {
        self.submissions_rejected.load(Ordering::Relaxed)
    }

    pub fn snapshots_computed(&self) -> u64 {
        self.snapshots_computed.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn metadata_timeouts(&self) -> u64 {
        self.metadata_timeouts.load(Ordering::Relaxed)
    }

    pub fn records_exported(&self) -> u64 {
        self.records_exported.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.records_submitted.store(0, Ordering::Relaxed);
        self.submissions_rejected.store(0, Ordering::Relaxed);
        self.snapshots_computed.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.metadata_timeouts.store(0, Ordering::Relaxed);
        self.records_exported.store(0, Ordering::Relaxed);
    }
}
