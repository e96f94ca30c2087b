//! Pipeline counters.
//!
//! Relaxed atomics, readable from any thread while the pipeline runs.

use std::sync::atomic::{ AtomicU64, Ordering };

pub struct PipelineMetrics {
    pub published: AtomicU64,
    pub processed: AtomicU64,
    pub batches: AtomicU64,
    pub backpressure_events: AtomicU64,
    pub discarded: AtomicU64,
    pub synchronous: AtomicU64,
    pub handler_failures: AtomicU64,
    pub rejected_after_shutdown: AtomicU64,
}

impl PipelineMetrics {
    pub const fn new() -> Self {
        Self {
            published: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            backpressure_events: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            synchronous: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            rejected_after_shutdown: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_publish(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// One consumer drain pass of `events` events
    #[inline]
    pub fn record_batch(&self, events: u64) {
        self.processed.fetch_add(events, Ordering::Relaxed);
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_backpressure(&self) {
        self.backpressure_events.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_discard(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_synchronous(&self) {
        self.synchronous.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_handler_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected(&self) {
        self.rejected_after_shutdown.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            backpressure_events: self.backpressure_events.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            synchronous: self.synchronous.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            rejected_after_shutdown: self.rejected_after_shutdown.load(Ordering::Relaxed),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub published: u64,
    pub processed: u64,
    pub batches: u64,
    pub backpressure_events: u64,
    pub discarded: u64,
    pub synchronous: u64,
    pub handler_failures: u64,
    pub rejected_after_shutdown: u64,
}

impl MetricsSnapshot {
    /// Mean events per consumer drain pass
    pub fn average_batch(&self) -> f64 {
        if self.batches == 0 {
            return 0.0;
        }
        (self.processed as f64) / (self.batches as f64)
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "published={} processed={} batches={} backpressure={} discarded={} sync={} failures={} rejected={}",
            self.published,
            self.processed,
            self.batches,
            self.backpressure_events,
            self.discarded,
            self.synchronous,
            self.handler_failures,
            self.rejected_after_shutdown
        )
    }
}
