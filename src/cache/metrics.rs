//! Cache Metrics
//!
//! Process-wide statistics. Counters are plain atomics so concurrent `get`
//! and `set` calls never contend on a lock.

use crate::cache::events::CacheObserver;
use crate::cache::tier::TierName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

// =============================================================================
// Counters
// =============================================================================

/// Running cache statistics
#[derive(Debug, Default)]
pub struct CacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub sets: AtomicU64,
    pub compressions: AtomicU64,
    pub decompressions: AtomicU64,
    /// Entries removed by pattern invalidation
    pub invalidations: AtomicU64,
    pub evictions: AtomicU64,
    pub expirations: AtomicU64,
    /// Sum of lookup times in nanoseconds
    response_time_nanos: AtomicU64,
    /// Last memory estimate in bytes
    memory_usage_bytes: AtomicU64,
}

impl CacheMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a hit and its lookup time
    #[inline]
    pub fn record_hit(&self, elapsed: Duration) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.record_request(elapsed);
    }

    /// Record a miss and its lookup time
    #[inline]
    pub fn record_miss(&self, elapsed: Duration) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.record_request(elapsed);
    }

    #[inline]
    fn record_request(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.response_time_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_compression(&self) {
        self.compressions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decompression(&self) {
        self.decompressions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_invalidations(&self, count: usize) {
        self.invalidations.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Store a fresh memory estimate
    pub fn set_memory_usage(&self, bytes: u64) {
        self.memory_usage_bytes.store(bytes, Ordering::Relaxed);
    }

    /// Last memory estimate
    pub fn memory_usage(&self) -> u64 {
        self.memory_usage_bytes.load(Ordering::Relaxed)
    }

    /// Number of `get` calls, always `hits + misses`
    pub fn total_requests(&self) -> u64 {
        self.hits.load(Ordering::Relaxed) + self.misses.load(Ordering::Relaxed)
    }

    /// Mean lookup time in milliseconds over all `get` calls
    ///
    /// Equal to the running mean `(avg * (n - 1) + latest) / n`.
    pub fn average_response_time_ms(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        let nanos = self.response_time_nanos.load(Ordering::Relaxed);
        nanos as f64 / total as f64 / 1_000_000.0
    }

    /// Zero every counter
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.sets,
            &self.compressions,
            &self.decompressions,
            &self.invalidations,
            &self.evictions,
            &self.expirations,
            &self.response_time_nanos,
            &self.memory_usage_bytes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Create a snapshot combined with current per-tier key counts
    pub fn snapshot(&self, tier_keys: BTreeMap<TierName, usize>) -> CacheStatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total_requests = hits + misses;
        let compressions = self.compressions.load(Ordering::Relaxed);

        CacheStatsSnapshot {
            hits,
            misses,
            total_requests,
            sets: self.sets.load(Ordering::Relaxed),
            compressions,
            decompressions: self.decompressions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            average_response_time_ms: self.average_response_time_ms(),
            memory_usage_bytes: self.memory_usage(),
            hit_rate: format_hit_rate(hits, total_requests),
            compression_ratio: if total_requests == 0 {
                0.0
            } else {
                compressions as f64 / total_requests as f64
            },
            total_keys: tier_keys.values().sum(),
            tier_count: tier_keys.len(),
            tiers: tier_keys,
        }
    }
}

impl CacheObserver for CacheMetrics {
    fn on_set(&self, _tier: TierName, _key: &str, _size_bytes: u64, _compressed: bool) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    fn on_expire(&self, _tier: TierName, _key: &str) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    fn on_evict(&self, _tier: TierName, _key: &str) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }
}

/// `hits / total` as a percentage with one decimal, `"0%"` before any request
pub fn format_hit_rate(hits: u64, total: u64) -> String {
    if total == 0 {
        return "0%".to_string();
    }
    format!("{:.1}%", hits as f64 / total as f64 * 100.0)
}

// =============================================================================
// Snapshot
// =============================================================================

/// Point-in-time statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    pub sets: u64,
    pub compressions: u64,
    pub decompressions: u64,
    pub invalidations: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub average_response_time_ms: f64,
    pub memory_usage_bytes: u64,
    /// Formatted percentage, e.g. `"66.7%"`
    pub hit_rate: String,
    /// compressions / total_requests
    pub compression_ratio: f64,
    pub total_keys: usize,
    pub tier_count: usize,
    /// Key count per tier
    pub tiers: BTreeMap<TierName, usize>,
}

impl CacheStatsSnapshot {
    /// Hit ratio in 0.0..=1.0
    pub fn hit_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_requests as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_formatting() {
        assert_eq!(format_hit_rate(0, 0), "0%");
        assert_eq!(format_hit_rate(2, 3), "66.7%");
        assert_eq!(format_hit_rate(1, 1), "100.0%");
        assert_eq!(format_hit_rate(0, 4), "0.0%");
    }

    #[test]
    fn test_request_accounting() {
        let metrics = CacheMetrics::new();
        metrics.record_hit(Duration::from_millis(2));
        metrics.record_hit(Duration::from_millis(4));
        metrics.record_miss(Duration::from_millis(6));

        let snapshot = metrics.snapshot(BTreeMap::new());
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.total_requests, snapshot.hits + snapshot.misses);
        assert!((snapshot.average_response_time_ms - 4.0).abs() < 1e-9);
        assert!((snapshot.hit_ratio() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_tier_totals() {
        let metrics = CacheMetrics::new();
        metrics.record_compression();
        metrics.record_miss(Duration::ZERO);
        metrics.record_miss(Duration::ZERO);

        let tiers = BTreeMap::from([(TierName::Critical, 3), (TierName::Standard, 4)]);
        let snapshot = metrics.snapshot(tiers);
        assert_eq!(snapshot.total_keys, 7);
        assert_eq!(snapshot.tier_count, 2);
        assert!((snapshot.compression_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_observer_counters_and_reset() {
        let metrics = CacheMetrics::new();
        metrics.on_set(TierName::Database, "q", 10, false);
        metrics.on_evict(TierName::Database, "q");
        metrics.on_expire(TierName::Database, "r");
        metrics.record_invalidations(3);
        metrics.set_memory_usage(4096);

        assert_eq!(metrics.sets.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.evictions.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.expirations.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.invalidations.load(Ordering::Relaxed), 3);

        metrics.reset();
        let snapshot = metrics.snapshot(BTreeMap::new());
        assert_eq!(snapshot.sets, 0);
        assert_eq!(snapshot.invalidations, 0);
        assert_eq!(snapshot.memory_usage_bytes, 0);
        assert_eq!(snapshot.hit_rate, "0%");
    }

    #[test]
    fn test_concurrent_requests_stay_consistent() {
        let metrics = std::sync::Arc::new(CacheMetrics::new());
        let workers: Vec<_> = (0..8)
            .map(|i| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for n in 0..1000 {
                        if (i + n) % 3 == 0 {
                            metrics.record_miss(Duration::ZERO);
                        } else {
                            metrics.record_hit(Duration::ZERO);
                        }
                        let snapshot = metrics.snapshot(BTreeMap::new());
                        assert_eq!(snapshot.hits + snapshot.misses, snapshot.total_requests);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let snapshot = metrics.snapshot(BTreeMap::new());
        assert_eq!(snapshot.total_requests, 8000);
        assert_eq!(metrics.total_requests(), 8000);
    }
}
