//! Lock-free usage counters.
//!
//! One instance lives for the process lifetime and is bumped from request
//! handlers, the in-flight registry, and the cache eviction hook. Snapshots
//! are served by `GET /health`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lock-free per-request counters.
#[derive(Debug, Default)]
pub struct UsageMetrics {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    coalesced_joins: AtomicU64,
    upstream_calls: AtomicU64,
    upstream_failures: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Serialize)]
pub struct UsageSnapshot {
    pub requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub coalesced_joins: u64,
    pub upstream_calls: u64,
    pub upstream_failures: u64,
    pub evictions: u64,
}

impl UsageMetrics {
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// A request joined an already-pending upstream fetch.
    pub fn record_coalesced_join(&self) {
        self.coalesced_joins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_call(&self) {
        self.upstream_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy all counters at once.
    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            coalesced_joins: self.coalesced_joins.load(Ordering::Relaxed),
            upstream_calls: self.upstream_calls.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = UsageMetrics::default();
        let snap = metrics.snapshot();
        assert_eq!(snap.requests, 0);
        assert_eq!(snap.evictions, 0);
    }

    #[test]
    fn test_counters_increment_independently() {
        let metrics = UsageMetrics::default();
        metrics.record_request();
        metrics.record_request();
        metrics.record_cache_hit();
        metrics.record_upstream_call();
        let snap = metrics.snapshot();
        assert_eq!(snap.requests, 2);
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.cache_misses, 0);
        assert_eq!(snap.upstream_calls, 1);
    }

    #[test]
    fn test_snapshot_serializes_to_json() {
        let metrics = UsageMetrics::default();
        metrics.record_coalesced_join();
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["coalesced_joins"], 1);
    }
}
