//! Advanced Cache Manager
//!
//! The public surface of the cache: tiered get/set with transparent
//! compression, pattern and event driven invalidation, statistics, health
//! probing and export.
//!
//! Every failure except a configuration error degrades to "not cached": a
//! failed `set` returns `Ok(false)`, an unreadable entry is a miss.

use crate::cache::compression::CompressionManager;
use crate::cache::config::CacheConfig;
use crate::cache::entry::{CacheEntry, CachePayload};
use crate::cache::events::{CacheEvent, CacheObserver, EventBroadcaster, LoggingObserver};
use crate::cache::health::{HealthReport, TierHealth};
use crate::cache::invalidation::{
    InvalidationAction, InvalidationOptions, InvalidationPattern, SmartInvalidationRules,
};
use crate::cache::key;
use crate::cache::metrics::{CacheMetrics, CacheStatsSnapshot};
use crate::cache::storage::{MemoryTier, TierStorage};
use crate::cache::tier::TierName;
use crate::cache::{BatchGet, BatchSet, CacheExport, CachedValue, ValueLoader};
use crate::error::{Error, Result};
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Prefix of the keys written by health probes
pub const HEALTH_PROBE_PREFIX: &str = "__health_check__";

// =============================================================================
// Advanced Cache
// =============================================================================

/// Tiered in-memory cache
pub struct AdvancedCache {
    /// One storage per tier, indexed by `TierName::index`
    tiers: [Box<dyn TierStorage>; 6],
    /// Shared so large payloads can be compressed on the blocking pool
    compression: Arc<CompressionManager>,
    metrics: Arc<CacheMetrics>,
    events: Arc<EventBroadcaster>,
    rules: SmartInvalidationRules,
    config: CacheConfig,
    /// Suffix for probe keys so concurrent health checks never collide
    probe_seq: AtomicU64,
}

impl AdvancedCache {
    /// Create a cache with the default six tiers
    pub fn new() -> Result<Self> {
        Self::with_config(CacheConfig::default())
    }

    /// Create a cache with custom configuration
    pub fn with_config(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(CacheMetrics::new());
        let events = Arc::new(EventBroadcaster::new(config.event_channel_capacity));
        let observers: Vec<Arc<dyn CacheObserver>> =
            vec![metrics.clone(), events.clone(), Arc::new(LoggingObserver)];

        let tiers = TierName::ALL.map(|tier| {
            let storage = observers.iter().fold(
                MemoryTier::new(tier, config.tier(tier)).with_capacity_policy(
                    config.capacity_high_watermark,
                    config.capacity_evict_fraction,
                ),
                |storage, observer| storage.with_observer(observer.clone()),
            );
            Box::new(storage) as Box<dyn TierStorage>
        });

        let cache = Self {
            tiers,
            compression: Arc::new(CompressionManager::with_config(config.compression.clone())),
            metrics,
            events,
            rules: SmartInvalidationRules::new()?,
            config,
            probe_seq: AtomicU64::new(0),
        };

        info!(
            tiers = TierName::ALL.len(),
            compression = cache.config.compression.enabled,
            threshold = cache.config.compression.threshold_bytes,
            "Advanced cache initialized"
        );
        Ok(cache)
    }

    /// Swap the storage of one tier
    ///
    /// Custom storages should attach `observers()` to keep statistics exact.
    pub fn replace_tier(&mut self, storage: Box<dyn TierStorage>) {
        let index = storage.tier().index();
        self.tiers[index] = storage;
    }

    /// Observers the built-in tiers report to
    pub fn observers(&self) -> Vec<Arc<dyn CacheObserver>> {
        vec![
            self.metrics.clone(),
            self.events.clone(),
            Arc::new(LoggingObserver),
        ]
    }

    /// Subscribe to cache events
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Configuration in use
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Raw counters
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    fn storage(&self, tier: TierName) -> &dyn TierStorage {
        self.tiers[tier.index()].as_ref()
    }

    fn resolve(&self, tier: &str) -> Result<(TierName, &dyn TierStorage)> {
        let name: TierName = tier.parse()?;
        Ok((name, self.storage(name)))
    }

    // =========================================================================
    // Get / Set
    // =========================================================================

    /// Look up `key` in `tier`
    ///
    /// `Ok(None)` is a miss and is distinct from a stored `null`.
    pub async fn get(&self, tier: &str, key: &str) -> Result<Option<CachedValue>> {
        let (tier, storage) = self.resolve(tier)?;
        let start = Instant::now();

        let entry = match storage.get(key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(tier = %tier, key = %key, error = %e, "Tier lookup failed");
                None
            }
        };

        let Some(entry) = entry else {
            self.metrics.record_miss(start.elapsed());
            self.events.publish(CacheEvent::Miss {
                tier,
                key: key.to_string(),
            });
            debug!(tier = %tier, key = %key, "Cache miss");
            return Ok(None);
        };

        let data = match self.unpack(entry.payload.clone()).await {
            Ok(data) => data,
            Err(e) => {
                warn!(tier = %tier, key = %key, error = %e, "Dropping unreadable cache entry");
                let _ = storage.remove(key);
                self.metrics.record_miss(start.elapsed());
                self.events.publish(CacheEvent::Miss {
                    tier,
                    key: key.to_string(),
                });
                return Ok(None);
            }
        };
        if entry.payload.is_compressed() {
            self.metrics.record_decompression();
        }

        let elapsed = start.elapsed();
        self.metrics.record_hit(elapsed);
        self.events.publish(CacheEvent::Hit {
            tier,
            key: key.to_string(),
        });
        debug!(tier = %tier, key = %key, "Cache hit");

        Ok(Some(CachedValue {
            data,
            cached: true,
            tier,
            response_time_ms: elapsed.as_secs_f64() * 1000.0,
        }))
    }

    /// Typed lookup
    pub async fn get_as<T: DeserializeOwned>(&self, tier: &str, key: &str) -> Result<Option<T>> {
        match self.get(tier, key).await? {
            Some(hit) => Ok(Some(serde_json::from_value(hit.data)?)),
            None => Ok(None),
        }
    }

    /// Store `value` under `key`
    ///
    /// `ttl_seconds` overrides the tier default when positive. Returns
    /// `Ok(false)` if the value could not be cached.
    pub async fn set<T>(&self, tier: &str, key: &str, value: &T, ttl_seconds: Option<u64>) -> Result<bool>
    where
        T: Serialize + ?Sized,
    {
        let (tier, storage) = self.resolve(tier)?;

        let serialized = serde_json::to_value(value)
            .and_then(|value| serde_json::to_vec(&value).map(|bytes| (value, bytes)));
        let (value, bytes) = match serialized {
            Ok(pair) => pair,
            Err(e) => {
                warn!(tier = %tier, key = %key, error = %Error::from(e), "Value not cached");
                return Ok(false);
            }
        };

        let payload = match self.pack(value, bytes).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(tier = %tier, key = %key, error = %e, "Value not cached");
                return Ok(false);
            }
        };
        if payload.is_compressed() {
            self.metrics.record_compression();
        }

        let entry = match ttl_seconds {
            Some(ttl) if ttl > 0 => CacheEntry::with_ttl_override(key, payload, ttl),
            _ => CacheEntry::new(key, payload, storage.config().ttl()),
        };

        match storage.insert(entry) {
            Ok(evicted) => {
                if evicted > 0 {
                    debug!(tier = %tier, evicted, "Capacity eviction");
                }
                Ok(true)
            }
            Err(e) => {
                warn!(tier = %tier, key = %key, error = %e, "Tier insert failed");
                Ok(false)
            }
        }
    }

    /// Remove a single key
    pub fn delete(&self, tier: &str, key: &str) -> Result<bool> {
        let (tier, storage) = self.resolve(tier)?;
        match storage.remove(key) {
            Ok(removed) => Ok(removed.is_some()),
            Err(e) => {
                warn!(tier = %tier, key = %key, error = %e, "Tier delete failed");
                Ok(false)
            }
        }
    }

    /// Cache-aside read: serve from `tier` or load and populate it
    pub async fn get_or_load(
        &self,
        tier: &str,
        key: &str,
        ttl_seconds: Option<u64>,
        loader: &dyn ValueLoader,
    ) -> Result<Value> {
        if let Some(hit) = self.get(tier, key).await? {
            return Ok(hit.data);
        }
        let value = loader.load(key).await?;
        if !self.set(tier, key, &value, ttl_seconds).await? {
            debug!(tier = %tier, key = %key, "Loaded value served uncached");
        }
        Ok(value)
    }

    async fn pack(&self, value: Value, serialized: Vec<u8>) -> Result<CachePayload> {
        if !self.compression.should_offload(serialized.len()) {
            return self.compression.pack(value, &serialized);
        }
        let compression = Arc::clone(&self.compression);
        tokio::task::spawn_blocking(move || compression.pack(value, &serialized))
            .await
            .map_err(|e| Error::Internal(format!("compression task failed: {}", e)))?
    }

    async fn unpack(&self, payload: Arc<CachePayload>) -> Result<Value> {
        let offload_at = self.compression.config().offload_threshold_bytes as u64;
        if !payload.is_compressed() || payload.original_size() < offload_at {
            return self.compression.unpack(&payload);
        }
        let compression = Arc::clone(&self.compression);
        tokio::task::spawn_blocking(move || compression.unpack(&payload))
            .await
            .map_err(|e| Error::Internal(format!("decompression task failed: {}", e)))?
    }

    // =========================================================================
    // Batch Operations
    // =========================================================================

    /// Run several lookups concurrently; each result is independent
    pub async fn batch_get(&self, ops: &[BatchGet]) -> Vec<Result<Option<CachedValue>>> {
        join_all(ops.iter().map(|op| self.get(&op.tier_name, &op.key))).await
    }

    /// Run several stores concurrently; true only if every store succeeded
    pub async fn batch_set(&self, ops: &[BatchSet]) -> bool {
        let results = join_all(
            ops.iter()
                .map(|op| self.set(&op.tier_name, &op.key, &op.value, op.ttl)),
        )
        .await;
        results.iter().all(|r| matches!(r, Ok(true)))
    }

    // =========================================================================
    // Keys
    // =========================================================================

    /// Build a key from a prefix and a value, hashing overlong keys on request
    pub fn create_key(&self, prefix: &str, data: &Value, hash: bool) -> String {
        key::create_key(prefix, data, hash, self.config.max_key_length)
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    /// Remove every key matching `pattern` from the selected tiers
    pub fn invalidate(
        &self,
        pattern: impl Into<InvalidationPattern>,
        options: &InvalidationOptions,
    ) -> Result<usize> {
        let pattern = pattern.into();
        let tiers = options.resolve()?;

        let mut removed = 0;
        for tier in tiers {
            match self
                .storage(tier)
                .remove_matching(&|key: &str| pattern.matches(key))
            {
                Ok(count) => removed += count,
                Err(e) => warn!(tier = %tier, pattern = %pattern, error = %e, "Invalidation failed"),
            }
        }

        self.metrics.record_invalidations(removed);
        self.events.publish(CacheEvent::Invalidated {
            pattern: pattern.to_string(),
            removed,
        });
        debug!(pattern = %pattern, removed, "Invalidated cache entries");
        Ok(removed)
    }

    /// Apply the invalidation rule for a domain event
    ///
    /// Unknown events do nothing. Returns the number of entries removed.
    pub fn smart_invalidate(&self, event: &str, payload: &Value) -> Result<usize> {
        if !self.rules.knows(event) {
            debug!(event = %event, "No invalidation rule for event");
            return Ok(0);
        }

        let mut removed = 0;
        for action in self.rules.actions(event, payload)? {
            removed += match action {
                InvalidationAction::Invalidate(pattern) => {
                    self.invalidate(pattern, &InvalidationOptions::all())?
                }
                InvalidationAction::Compact(tier) => self.compact(tier),
            };
        }
        info!(event = %event, removed, "Smart invalidation applied");
        Ok(removed)
    }

    /// Known smart invalidation events
    pub fn invalidation_events(&self) -> Vec<&'static str> {
        self.rules.events()
    }

    /// Evict the oldest entries of `tier` if it is past its high watermark
    pub fn compact_tier(&self, tier: &str) -> Result<usize> {
        let tier: TierName = tier.parse()?;
        Ok(self.compact(tier))
    }

    fn compact(&self, tier: TierName) -> usize {
        let evicted = self.storage(tier).compact();
        if evicted > 0 {
            info!(tier = %tier, evicted, "Compacted cache tier");
        }
        evicted
    }

    // =========================================================================
    // Expiry
    // =========================================================================

    /// Remove expired entries from one tier
    pub fn sweep_tier(&self, tier: TierName) -> usize {
        self.storage(tier).sweep_expired()
    }

    /// Remove expired entries from every tier
    pub fn sweep_expired(&self) -> usize {
        TierName::ALL.iter().map(|t| self.sweep_tier(*t)).sum()
    }

    // =========================================================================
    // Statistics & Monitoring
    // =========================================================================

    /// Key count per tier
    pub fn tier_key_counts(&self) -> BTreeMap<TierName, usize> {
        TierName::ALL
            .iter()
            .map(|t| (*t, self.storage(*t).len()))
            .collect()
    }

    /// Statistics snapshot
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.metrics.snapshot(self.tier_key_counts())
    }

    /// Re-estimate memory usage by sampling stored sizes and extrapolating
    pub fn refresh_memory_usage(&self) -> u64 {
        let sample_size = self.config.memory_sample_size.max(1);
        let mut total = 0u64;

        for tier in TierName::ALL {
            let entries = self.storage(tier).entries();
            if entries.is_empty() {
                continue;
            }
            let step = (entries.len() / sample_size).max(1);
            let (sampled, bytes) = entries
                .iter()
                .step_by(step)
                .take(sample_size)
                .fold((0u64, 0u64), |(n, bytes), e| {
                    (n + 1, bytes + e.stored_size() + e.key.len() as u64)
                });
            total += bytes * entries.len() as u64 / sampled;
        }

        self.metrics.set_memory_usage(total);
        total
    }

    /// Log a one-line statistics summary
    pub fn log_summary(&self) {
        let stats = self.stats();
        info!(
            hit_rate = %stats.hit_rate,
            avg_response_ms = stats.average_response_time_ms,
            compressions = stats.compressions,
            memory_bytes = stats.memory_usage_bytes,
            keys = ?stats.tiers,
            "Cache statistics"
        );
    }

    /// Round-trip a probe key through every tier
    pub async fn health_check(&self) -> HealthReport {
        let mut tiers = BTreeMap::new();
        for tier in TierName::ALL {
            let start = Instant::now();
            let health = self.probe(tier).with_duration(start.elapsed());
            if !health.status.is_healthy() {
                let err = Error::HealthProbe {
                    tier: tier.to_string(),
                    reason: health.message.clone().unwrap_or_default(),
                };
                warn!(error = %err, status = %health.status, "Cache tier probe failed");
            }
            tiers.insert(tier, health);
        }

        let report = HealthReport::new(tiers);
        debug!(status = %report.status, "Cache health check complete");
        report
    }

    fn probe(&self, tier: TierName) -> TierHealth {
        let storage = self.storage(tier);
        let seq = self.probe_seq.fetch_add(1, Ordering::Relaxed);
        let key = format!("{}:{}:{}", HEALTH_PROBE_PREFIX, tier, seq);
        let expected = json!({ "probe": key, "ts": chrono::Utc::now().timestamp_millis() });
        let size = expected.to_string().len() as u64;

        let entry = CacheEntry::with_ttl_override(
            key.clone(),
            CachePayload::raw(expected.clone(), size),
            1,
        );
        // Diagnostics must never evict user entries
        if let Err(e) = storage.insert_probe(entry) {
            return TierHealth::error(storage.len(), format!("set failed: {}", e));
        }

        let read = storage.get(&key);
        let _ = storage.remove(&key);
        let keys = storage.len();

        match read {
            Err(e) => TierHealth::error(keys, format!("get failed: {}", e)),
            Ok(None) => TierHealth::degraded(keys, "probe value missing after write"),
            Ok(Some(entry)) => match self.compression.unpack(&entry.payload) {
                Ok(actual) if actual == expected => TierHealth::healthy(keys),
                Ok(_) => TierHealth::degraded(keys, "probe value mismatch"),
                Err(e) => TierHealth::error(keys, format!("probe unreadable: {}", e)),
            },
        }
    }

    // =========================================================================
    // Export / Reset
    // =========================================================================

    /// Dump every live key/value pair
    pub async fn export(&self) -> CacheExport {
        let mut tiers = BTreeMap::new();
        for tier in TierName::ALL {
            let mut values = BTreeMap::new();
            for entry in self.storage(tier).entries() {
                match self.unpack(entry.payload.clone()).await {
                    Ok(value) => {
                        values.insert(entry.key.clone(), value);
                    }
                    Err(e) => warn!(tier = %tier, key = %entry.key, error = %e, "Skipping unreadable entry"),
                }
            }
            tiers.insert(tier, values);
        }
        CacheExport {
            exported_at: chrono::Utc::now(),
            tiers,
        }
    }

    /// Flush every tier and zero all statistics
    pub fn clear_all(&self) -> usize {
        let removed: usize = self.tiers.iter().map(|t| t.flush()).sum();
        self.metrics.reset();
        info!(removed, "Cleared all cache tiers");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::config::CacheConfig;
    use crate::cache::tier::TierConfig;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use serde::Serializer;
    use std::time::Duration;

    fn cache() -> AdvancedCache {
        AdvancedCache::new().unwrap()
    }

    fn large_value() -> Value {
        let items: Vec<Value> = (0..100)
            .map(|i| json!({"id": i, "title": format!("Entry {}", i), "tags": ["a", "b"]}))
            .collect();
        Value::Array(items)
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("cyclic structure"))
        }
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = cache();
        assert!(cache.set("standard", "posts:list", &json!([{"id": 1}]), None).await.unwrap());

        let hit = cache.get("standard", "posts:list").await.unwrap().unwrap();
        assert_eq!(hit.data, json!([{"id": 1}]));
        assert!(hit.cached);
        assert_eq!(hit.tier, TierName::Standard);
    }

    #[tokio::test]
    async fn test_stored_null_is_not_a_miss() {
        let cache = cache();
        cache.set("critical", "flag", &Value::Null, None).await.unwrap();
        cache.set("critical", "off", &false, None).await.unwrap();

        assert_eq!(cache.get("critical", "flag").await.unwrap().unwrap().data, Value::Null);
        assert_eq!(cache.get("critical", "off").await.unwrap().unwrap().data, json!(false));
        assert!(cache.get("critical", "absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_tier_is_configuration_error() {
        let cache = cache();
        assert_matches!(cache.get("hot", "k").await, Err(Error::UnknownTier { .. }));
        assert_matches!(cache.set("hot", "k", &1, None).await, Err(Error::UnknownTier { .. }));
        assert_matches!(
            cache.invalidate("k", &InvalidationOptions::tiers(["hot"])),
            Err(Error::UnknownTier { .. })
        );
        assert_eq!(cache.stats().total_requests, 0);
    }

    #[tokio::test]
    async fn test_compression_roundtrip_and_counters() {
        let cache = cache();
        let value = large_value();

        cache.set("longterm", "big", &value, None).await.unwrap();
        cache.set("longterm", "small", &json!({"id": 1}), None).await.unwrap();
        assert_eq!(cache.stats().compressions, 1);

        let entry = cache.storage(TierName::Longterm).get("big").unwrap().unwrap();
        assert!(entry.payload.is_compressed());
        let entry = cache.storage(TierName::Longterm).get("small").unwrap().unwrap();
        assert!(!entry.payload.is_compressed());

        assert_eq!(cache.get("longterm", "big").await.unwrap().unwrap().data, value);
        assert_eq!(cache.stats().decompressions, 1);
    }

    #[tokio::test]
    async fn test_offloaded_compression_roundtrip() {
        let mut config = CacheConfig::default();
        config.compression.offload_threshold_bytes = 2048;
        let cache = AdvancedCache::with_config(config).unwrap();
        let value = large_value();

        cache.set("standard", "offloaded", &value, None).await.unwrap();
        assert_eq!(cache.get("standard", "offloaded").await.unwrap().unwrap().data, value);
    }

    #[tokio::test]
    async fn test_serialization_failure_reports_false() {
        let cache = cache();
        assert!(!cache.set("standard", "bad", &Unserializable, None).await.unwrap());
        assert!(cache.get("standard", "bad").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let cache = cache();
        let payload = CachePayload::compressed(
            bytes::Bytes::from_static(b"not gzip at all"),
            Default::default(),
            4096,
        );
        cache
            .storage(TierName::Standard)
            .insert(CacheEntry::new("broken", payload, Duration::from_secs(60)))
            .unwrap();
        let mut rx = cache.subscribe();

        assert!(cache.get("standard", "broken").await.unwrap().is_none());
        let mut misses = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, CacheEvent::Miss { ref key, .. } if key == "broken") {
                misses += 1;
            }
        }
        assert_eq!(misses, 1);
        assert!(cache.storage(TierName::Standard).get("broken").unwrap().is_none());
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.total_requests), (0, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_override() {
        let cache = cache();
        cache.set("longterm", "short", &1, Some(1)).await.unwrap();
        cache.set("longterm", "default", &2, None).await.unwrap();
        assert!(cache.get("longterm", "short").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("longterm", "short").await.unwrap().is_none());
        assert!(cache.get("longterm", "default").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_scoped_to_tiers() {
        let cache = cache();
        cache.set("standard", "post:1", &1, None).await.unwrap();
        cache.set("frequent", "post:2", &2, None).await.unwrap();

        let removed = cache
            .invalidate("post", &InvalidationOptions::tiers(["standard"]))
            .unwrap();
        assert_eq!(removed, 1);
        assert!(cache.get("frequent", "post:2").await.unwrap().is_some());
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[tokio::test]
    async fn test_smart_invalidate_cache_full() {
        let config = CacheConfig::default().with_tier(TierName::Critical, TierConfig::new(30, 5, 10));
        let cache = AdvancedCache::with_config(config).unwrap();
        for i in 0..9 {
            cache.set("critical", &format!("k{}", i), &i, None).await.unwrap();
        }
        // At the watermark, not past it
        assert_eq!(cache.smart_invalidate("cache_full", &json!("critical")).unwrap(), 0);
        assert_matches!(
            cache.smart_invalidate("cache_full", &json!("hot")),
            Err(Error::UnknownTier { .. })
        );
        assert_eq!(cache.smart_invalidate("unknown_event", &json!(1)).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_batch_operations() {
        let cache = cache();
        let ok = cache
            .batch_set(&[
                BatchSet::new("standard", "a", json!(1), None),
                BatchSet::new("database", "b", json!(2), Some(5)),
            ])
            .await;
        assert!(ok);

        let failed = cache
            .batch_set(&[
                BatchSet::new("standard", "c", json!(3), None),
                BatchSet::new("hot", "d", json!(4), None),
            ])
            .await;
        assert!(!failed);
        assert!(cache.get("standard", "c").await.unwrap().is_some());

        let results = cache
            .batch_get(&[
                BatchGet::new("standard", "a"),
                BatchGet::new("hot", "a"),
                BatchGet::new("database", "missing"),
            ])
            .await;
        assert_eq!(results[0].as_ref().unwrap().as_ref().unwrap().data, json!(1));
        assert_matches!(results[1], Err(Error::UnknownTier { .. }));
        assert!(results[2].as_ref().unwrap().is_none());
    }

    struct CountingLoader {
        calls: AtomicU64,
    }

    #[async_trait]
    impl ValueLoader for CountingLoader {
        async fn load(&self, key: &str) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(json!({ "loaded": key }))
        }
    }

    #[tokio::test]
    async fn test_get_or_load() {
        let cache = cache();
        let loader = CountingLoader {
            calls: AtomicU64::new(0),
        };

        let first = cache.get_or_load("database", "q:1", None, &loader).await.unwrap();
        let second = cache.get_or_load("database", "q:1", None, &loader).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(loader.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_memory_estimate_and_clear_all() {
        let cache = cache();
        for i in 0..25 {
            cache.set("standard", &format!("k{}", i), &json!({"i": i}), None).await.unwrap();
        }
        cache.get("standard", "k1").await.unwrap();

        assert!(cache.refresh_memory_usage() > 0);
        assert!(cache.stats().memory_usage_bytes > 0);

        assert_eq!(cache.clear_all(), 25);
        let stats = cache.stats();
        assert_eq!(stats.total_keys, 0);
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.sets, 0);
        assert_eq!(stats.hit_rate, "0%");
    }

    #[tokio::test]
    async fn test_export_includes_compressed_values() {
        let cache = cache();
        let value = large_value();
        cache.set("longterm", "big", &value, None).await.unwrap();
        cache.set("critical", "small", &json!("v"), None).await.unwrap();

        let export = cache.export().await;
        assert_eq!(export.tiers[&TierName::Longterm]["big"], value);
        assert_eq!(export.tiers[&TierName::Critical]["small"], json!("v"));
        assert!(export.tiers[&TierName::Database].is_empty());
    }

    #[tokio::test]
    async fn test_health_check_healthy_and_clean() {
        let cache = cache();
        let report = cache.health_check().await;
        assert!(report.is_healthy());
        assert_eq!(report.tiers.len(), 6);
        assert_eq!(cache.stats().total_keys, 0);
        assert_eq!(cache.stats().total_requests, 0);
    }

    #[tokio::test]
    async fn test_health_check_never_evicts() {
        let config =
            CacheConfig::default().with_tier(TierName::Standard, TierConfig::new(300, 60, 10));
        let cache = AdvancedCache::with_config(config).unwrap();
        for i in 0..9 {
            cache.set("standard", &format!("k{}", i), &i, None).await.unwrap();
        }

        for _ in 0..3 {
            assert!(cache.health_check().await.is_healthy());
        }

        assert_eq!(cache.tier_key_counts()[&TierName::Standard], 9);
        assert!(cache.get("standard", "k0").await.unwrap().is_some());
        assert_eq!(cache.stats().evictions, 0);

        // A full tier keeps every entry too
        let storage = cache.storage(TierName::Standard);
        storage
            .insert_probe(CacheEntry::new(
                "k9",
                CachePayload::raw(json!(9), 1),
                Duration::from_secs(60),
            ))
            .unwrap();
        assert_eq!(storage.len(), 10);
        let keys = cache.storage(TierName::Standard).keys();
        cache.health_check().await;
        assert_eq!(cache.storage(TierName::Standard).keys(), keys);
    }

    #[tokio::test]
    async fn test_probe_sequence_is_per_instance() {
        let first = cache();
        let second = cache();
        first.health_check().await;
        second.health_check().await;
        assert_eq!(first.probe_seq.load(Ordering::Relaxed), 6);
        assert_eq!(second.probe_seq.load(Ordering::Relaxed), 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_gets_and_sets() {
        let cache = Arc::new(cache());
        cache.set("frequent", "hot", &0, None).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..200u64 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let key = if i % 4 == 0 { "cold".to_string() } else { "hot".to_string() };
                cache.get("frequent", &key).await.unwrap();
                cache.set("frequent", "shared", &i, None).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stats = cache.stats();
        assert_eq!(stats.total_requests, 200);
        assert_eq!(stats.hits + stats.misses, stats.total_requests);
        assert_eq!(stats.misses, 50);

        let last = cache.get_as::<u64>("frequent", "shared").await.unwrap().unwrap();
        assert!(last < 200);
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let cache = cache();
        let mut rx = cache.subscribe();
        cache.set("critical", "k", &1, None).await.unwrap();
        cache.get("critical", "k").await.unwrap();

        assert_matches!(rx.recv().await.unwrap(), CacheEvent::Set { ref key, .. } if key == "k");
        assert_matches!(rx.recv().await.unwrap(), CacheEvent::Hit { ref key, .. } if key == "k");
    }
}
