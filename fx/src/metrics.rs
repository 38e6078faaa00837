//! Counters for rate cache monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Rate engine metrics.
#[derive(Debug, Default)]
pub struct FxMetrics {
    /// Lookups that reached the engine.
    pub lookups: AtomicU64,
    /// Lookups answered from the cache without taking the write lock.
    pub cache_hits: AtomicU64,
    /// Remote fetches started.
    pub fetch_attempts: AtomicU64,
    /// Remote fetches that failed or timed out.
    pub fetch_failures: AtomicU64,
    /// Persisted snapshots adopted as fresh.
    pub persisted_loads: AtomicU64,
    /// Stale snapshots served after a failed fetch.
    pub stale_fallbacks: AtomicU64,
    /// Snapshot writes that failed and were skipped.
    pub persist_failures: AtomicU64,
}

impl FxMetrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_attempted(&self) {
        self.fetch_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_failed(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn persisted_loaded(&self) {
        self.persisted_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stale_fallback(&self) {
        self.stale_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn persist_failed(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lookups: self.lookups.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            fetch_attempts: self.fetch_attempts.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            persisted_loads: self.persisted_loads.load(Ordering::Relaxed),
            stale_fallbacks: self.stale_fallbacks.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let counters = [
            ("lookups_total", "Rate lookups served by the engine", snapshot.lookups),
            ("cache_hits_total", "Lookups answered from a fresh cache", snapshot.cache_hits),
            ("fetch_attempts_total", "Remote feed fetches started", snapshot.fetch_attempts),
            ("fetch_failures_total", "Remote feed fetches that failed", snapshot.fetch_failures),
            ("persisted_loads_total", "Fresh persisted snapshots adopted", snapshot.persisted_loads),
            ("stale_fallbacks_total", "Stale snapshots served after a failed fetch", snapshot.stale_fallbacks),
            ("persist_failures_total", "Snapshot writes that failed", snapshot.persist_failures),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            out.push_str(&format!(
                "# HELP ratekeeper_{name} {help}\n# TYPE ratekeeper_{name} counter\nratekeeper_{name} {value}\n"
            ));
        }
        out
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub lookups: u64,
    pub cache_hits: u64,
    pub fetch_attempts: u64,
    pub fetch_failures: u64,
    pub persisted_loads: u64,
    pub stale_fallbacks: u64,
    pub persist_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = FxMetrics::new();
        metrics.lookup();
        metrics.lookup();
        metrics.cache_hit();
        metrics.fetch_attempted();
        metrics.fetch_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.lookups, 2);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.fetch_failures, 1);
        assert_eq!(snapshot.stale_fallbacks, 0);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = FxMetrics::new();
        metrics.stale_fallback();

        let text = metrics.to_prometheus();
        assert!(text.contains("# TYPE ratekeeper_stale_fallbacks_total counter"));
        assert!(text.contains("ratekeeper_stale_fallbacks_total 1\n"));
        assert!(text.contains("ratekeeper_lookups_total 0\n"));
    }
}
