//! Metrics registry
//!
//! - Counters only, monotonic
//! - Thread-safe, lock-free
//! - Shared as `Arc<MetricsRegistry>` between executors and controllers

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters for query execution and live result delivery
///
/// # Thread Safety
///
/// All counters use Relaxed atomics; readers may observe slightly stale
/// values while other threads are incrementing.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Successful fetches (objects, rows or ids)
    fetches_executed: AtomicU64,
    /// Fetches that failed to compile or execute
    fetches_failed: AtomicU64,
    /// Count requests
    counts_executed: AtomicU64,
    /// Async fetches scheduled on a background context
    async_fetches_issued: AtomicU64,
    /// Async controller fetches whose result was applied
    async_fetches_applied: AtomicU64,
    /// Async controller fetches dropped as superseded
    async_fetches_discarded: AtomicU64,
    /// Change batches delivered through a delegate
    batches_delivered: AtomicU64,
    /// Batches delivered as a full reload
    full_reloads: AtomicU64,
    /// Named result caches invalidated
    cache_invalidations: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    // Fetch metrics

    pub fn increment_fetches_executed(&self) {
        self.fetches_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_fetches_failed(&self) {
        self.fetches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_counts_executed(&self) {
        self.counts_executed.fetch_add(1, Ordering::Relaxed);
    }

    // Async metrics

    pub fn increment_async_issued(&self) {
        self.async_fetches_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_async_applied(&self) {
        self.async_fetches_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_async_discarded(&self) {
        self.async_fetches_discarded.fetch_add(1, Ordering::Relaxed);
    }

    // Delivery metrics

    pub fn increment_batches_delivered(&self) {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_full_reloads(&self) {
        self.full_reloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_invalidations(&self) {
        self.cache_invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            fetches_executed: self.fetches_executed.load(Ordering::Relaxed),
            fetches_failed: self.fetches_failed.load(Ordering::Relaxed),
            counts_executed: self.counts_executed.load(Ordering::Relaxed),
            async_fetches_issued: self.async_fetches_issued.load(Ordering::Relaxed),
            async_fetches_applied: self.async_fetches_applied.load(Ordering::Relaxed),
            async_fetches_discarded: self.async_fetches_discarded.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            full_reloads: self.full_reloads.load(Ordering::Relaxed),
            cache_invalidations: self.cache_invalidations.load(Ordering::Relaxed),
        }
    }

    /// Get current snapshot of all metrics as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_default()
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub fetches_executed: u64,
    pub fetches_failed: u64,
    pub counts_executed: u64,
    pub async_fetches_issued: u64,
    pub async_fetches_applied: u64,
    pub async_fetches_discarded: u64,
    pub batches_delivered: u64,
    pub full_reloads: u64,
    pub cache_invalidations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_registry_is_zero() {
        assert_eq!(MetricsRegistry::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_increments() {
        let metrics = MetricsRegistry::new();
        metrics.increment_fetches_executed();
        metrics.increment_fetches_executed();
        metrics.increment_full_reloads();

        let snap = metrics.snapshot();
        assert_eq!(snap.fetches_executed, 2);
        assert_eq!(snap.full_reloads, 1);
        assert_eq!(snap.fetches_failed, 0);
    }

    #[test]
    fn test_thread_safety() {
        let metrics = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        m.increment_batches_delivered();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(metrics.snapshot().batches_delivered, 400);
    }

    #[test]
    fn test_to_json() {
        let metrics = MetricsRegistry::new();
        metrics.increment_async_discarded();
        let json: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(json["async_fetches_discarded"], 1);
    }
}
