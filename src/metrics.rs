//! Metrics collection for the servlet resolver
//!
//! Thread-safe counters using atomic operations. They track resolutions,
//! cache behaviour, collector work, error handling and registry churn.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector for the servlet resolver
///
/// All operations are thread-safe using atomic operations.
#[derive(Debug, Default)]
pub struct ResolverMetrics {
    // Resolution statistics
    resolutions: AtomicU64,
    default_fallbacks: AtomicU64,

    // Cache statistics
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_flushes: AtomicU64,
    cache_rejected_puts: AtomicU64,

    // Collector / selector statistics
    collector_runs: AtomicU64,
    candidates_probed: AtomicU64,
    opting_declined: AtomicU64,

    // Error handling statistics
    error_handlings: AtomicU64,
    recursive_errors: AtomicU64,

    // Registry statistics
    binds: AtomicU64,
    bind_rejections: AtomicU64,
    unbinds: AtomicU64,
    teardown_failures: AtomicU64,
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub resolutions: u64,
    pub default_fallbacks: u64,

    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_flushes: u64,
    pub cache_rejected_puts: u64,

    pub collector_runs: u64,
    pub candidates_probed: u64,
    pub opting_declined: u64,

    pub error_handlings: u64,
    pub recursive_errors: u64,

    pub binds: u64,
    pub bind_rejections: u64,
    pub unbinds: u64,
    pub teardown_failures: u64,
}

impl ResolverMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished request resolution
    ///
    /// # Arguments
    /// * `fallback` - Whether the built-in default handler was returned
    pub fn record_resolution(&self, fallback: bool) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        if fallback {
            self.default_fallbacks.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_flush(&self) {
        self.cache_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_rejected_put(&self) {
        self.cache_rejected_puts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one collector run and the number of paths it produced
    pub fn record_collector_run(&self, candidates: usize) {
        self.collector_runs.fetch_add(1, Ordering::Relaxed);
        self.candidates_probed
            .fetch_add(candidates as u64, Ordering::Relaxed);
    }

    pub fn record_opting_declined(&self) {
        self.opting_declined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error_handling(&self) {
        self.error_handlings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recursive_error(&self) {
        self.recursive_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a bind attempt
    ///
    /// # Arguments
    /// * `accepted` - Whether the bind was bound or queued (true) or rejected (false)
    pub fn record_bind(&self, accepted: bool) {
        if accepted {
            self.binds.fetch_add(1, Ordering::Relaxed);
        } else {
            self.bind_rejections.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_unbind(&self) {
        self.unbinds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_teardown_failure(&self) {
        self.teardown_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn get_stats(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            resolutions: self.resolutions.load(Ordering::Relaxed),
            default_fallbacks: self.default_fallbacks.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_flushes: self.cache_flushes.load(Ordering::Relaxed),
            cache_rejected_puts: self.cache_rejected_puts.load(Ordering::Relaxed),
            collector_runs: self.collector_runs.load(Ordering::Relaxed),
            candidates_probed: self.candidates_probed.load(Ordering::Relaxed),
            opting_declined: self.opting_declined.load(Ordering::Relaxed),
            error_handlings: self.error_handlings.load(Ordering::Relaxed),
            recursive_errors: self.recursive_errors.load(Ordering::Relaxed),
            binds: self.binds.load(Ordering::Relaxed),
            bind_rejections: self.bind_rejections.load(Ordering::Relaxed),
            unbinds: self.unbinds.load(Ordering::Relaxed),
            teardown_failures: self.teardown_failures.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics to zero
    ///
    /// This is primarily useful for testing.
    pub fn reset(&self) {
        for counter in [
            &self.resolutions,
            &self.default_fallbacks,
            &self.cache_hits,
            &self.cache_misses,
            &self.cache_flushes,
            &self.cache_rejected_puts,
            &self.collector_runs,
            &self.candidates_probed,
            &self.opting_declined,
            &self.error_handlings,
            &self.recursive_errors,
            &self.binds,
            &self.bind_rejections,
            &self.unbinds,
            &self.teardown_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl MetricsSnapshot {
    /// Calculate cache hit rate as a percentage (0.0 to 100.0)
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            (self.cache_hits as f64 / total as f64) * 100.0
        }
    }

    /// Average number of candidate paths per collector run
    pub fn avg_candidates_per_run(&self) -> f64 {
        if self.collector_runs == 0 {
            0.0
        } else {
            self.candidates_probed as f64 / self.collector_runs as f64
        }
    }

    /// Share of resolutions that ended at the default handler (0.0 to 100.0)
    pub fn fallback_rate(&self) -> f64 {
        if self.resolutions == 0 {
            0.0
        } else {
            (self.default_fallbacks as f64 / self.resolutions as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_record_resolution() {
        let metrics = ResolverMetrics::new();

        metrics.record_resolution(false);
        metrics.record_resolution(true);
        metrics.record_resolution(false);
        metrics.record_resolution(false);

        let stats = metrics.get_stats();
        assert_eq!(stats.resolutions, 4);
        assert_eq!(stats.default_fallbacks, 1);
        assert_eq!(stats.fallback_rate(), 25.0);
    }

    #[test]
    fn test_record_cache_operations() {
        let metrics = ResolverMetrics::new();

        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_cache_flush();

        let stats = metrics.get_stats();
        assert_eq!(stats.cache_hits, 3);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.cache_flushes, 1);
        assert_eq!(stats.cache_hit_rate(), 75.0);
    }

    #[test]
    fn test_collector_runs() {
        let metrics = ResolverMetrics::new();
        assert_eq!(metrics.get_stats().avg_candidates_per_run(), 0.0);

        metrics.record_collector_run(10);
        metrics.record_collector_run(20);

        let stats = metrics.get_stats();
        assert_eq!(stats.collector_runs, 2);
        assert_eq!(stats.candidates_probed, 30);
        assert_eq!(stats.avg_candidates_per_run(), 15.0);
    }

    #[test]
    fn test_record_bind() {
        let metrics = ResolverMetrics::new();
        metrics.record_bind(true);
        metrics.record_bind(false);
        metrics.record_unbind();
        metrics.record_teardown_failure();

        let stats = metrics.get_stats();
        assert_eq!(stats.binds, 1);
        assert_eq!(stats.bind_rejections, 1);
        assert_eq!(stats.unbinds, 1);
        assert_eq!(stats.teardown_failures, 1);
    }

    #[test]
    fn test_reset() {
        let metrics = ResolverMetrics::new();
        metrics.record_resolution(true);
        metrics.record_error_handling();
        metrics.record_recursive_error();
        metrics.reset();
        assert_eq!(metrics.get_stats(), MetricsSnapshot::default());
    }

    #[test]
    fn test_concurrent_updates() {
        let metrics = Arc::new(ResolverMetrics::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let metrics_clone = Arc::clone(&metrics);
            let handle = thread::spawn(move || {
                for _ in 0..100 {
                    metrics_clone.record_resolution(false);
                    metrics_clone.record_cache_hit();
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = metrics.get_stats();
        assert_eq!(stats.resolutions, 1000);
        assert_eq!(stats.cache_hits, 1000);
    }
}
