//! Advanced Caching System
//!
//! Six named in-memory tiers, each with its own TTL, sweep interval and
//! capacity:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Advanced Cache                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  critical 30s   frequent 120s   standard 300s   longterm 1800s          │
//! │  database 10s   ai_providers 180s                                       │
//! │         │                                                               │
//! │   ┌─────┴──────┐   ┌──────────────┐   ┌──────────────────────────┐      │
//! │   │ Compression│   │ Invalidation │   │ Observers                │      │
//! │   │ gzip > 1KiB│   │ rules/pattern│   │ metrics, events, logging │      │
//! │   └────────────┘   └──────────────┘   └──────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use advanced_cache::cache::{AdvancedCache, InvalidationOptions};
//! use serde_json::json;
//!
//! let cache = AdvancedCache::new()?;
//! cache.set("standard", "posts:list", &json!([{"id": 1}]), None).await?;
//!
//! if let Some(hit) = cache.get("standard", "posts:list").await? {
//!     println!("{} in {:.3}ms", hit.data, hit.response_time_ms);
//! }
//!
//! cache.smart_invalidate("post_updated", &json!({"postId": 1}))?;
//! cache.invalidate("posts", &InvalidationOptions::all())?;
//! println!("hit rate {}", cache.stats().hit_rate);
//! ```

pub mod compression;
pub mod config;
pub mod entry;
pub mod events;
pub mod health;
pub mod invalidation;
pub mod key;
pub mod manager;
pub mod metrics;
pub mod monitor;
pub mod storage;
pub mod tier;

// Re-export main types
pub use compression::{CompressionConfig, CompressionManager, Compressor};
pub use config::CacheConfig;
pub use entry::{CacheEntry, CachePayload, CompressionAlgorithm};
pub use events::{CacheEvent, CacheObserver, EventBroadcaster, LoggingObserver, RemovalReason};
pub use health::{HealthReport, HealthStatus, TierHealth};
pub use invalidation::{InvalidationOptions, InvalidationPattern, PatternKind, SmartInvalidationRules};
pub use manager::AdvancedCache;
pub use metrics::{CacheMetrics, CacheStatsSnapshot};
pub use monitor::CacheMonitor;
pub use storage::{MemoryTier, TierStorage};
pub use tier::{TierConfig, TierName};

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// =============================================================================
// Lookup Result
// =============================================================================

/// A cache hit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedValue {
    /// The stored value, decompressed
    pub data: Value,
    /// Always true; distinguishes a hit envelope from a raw value
    pub cached: bool,
    /// Tier the value was found in
    pub tier: TierName,
    /// Lookup latency in milliseconds
    pub response_time_ms: f64,
}

impl CachedValue {
    /// Deserialize the value into `T`
    pub fn into_typed<T: serde::de::DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.data)?)
    }
}

// =============================================================================
// Batch Operations
// =============================================================================

/// One lookup of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGet {
    pub tier_name: String,
    pub key: String,
}

impl BatchGet {
    pub fn new(tier_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            tier_name: tier_name.into(),
            key: key.into(),
        }
    }
}

/// One store of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSet {
    pub tier_name: String,
    pub key: String,
    pub value: Value,
    /// TTL override in seconds
    #[serde(default)]
    pub ttl: Option<u64>,
}

impl BatchSet {
    pub fn new(
        tier_name: impl Into<String>,
        key: impl Into<String>,
        value: Value,
        ttl: Option<u64>,
    ) -> Self {
        Self {
            tier_name: tier_name.into(),
            key: key.into(),
            value,
            ttl,
        }
    }
}

// =============================================================================
// Export
// =============================================================================

/// Dump of every live entry, grouped by tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheExport {
    pub exported_at: DateTime<Utc>,
    pub tiers: BTreeMap<TierName, BTreeMap<String, Value>>,
}

impl CacheExport {
    /// Total number of exported entries
    pub fn len(&self) -> usize {
        self.tiers.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// ValueLoader Trait (Port)
// =============================================================================

/// Source of values for cache-aside reads
///
/// Implemented by whatever owns the data behind the cache (a database
/// query, an upstream API).
#[async_trait]
pub trait ValueLoader: Send + Sync {
    /// Produce the value for `key`
    async fn load(&self, key: &str) -> Result<Value>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cached_value_serialization() {
        let hit = CachedValue {
            data: json!({"id": 7}),
            cached: true,
            tier: TierName::AiProviders,
            response_time_ms: 0.25,
        };
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(json["cached"], true);
        assert_eq!(json["tier"], "ai_providers");
        assert_eq!(json["responseTimeMs"], 0.25);

        #[derive(Deserialize)]
        struct Post {
            id: u32,
        }
        assert_eq!(hit.into_typed::<Post>().unwrap().id, 7);
    }

    #[test]
    fn test_batch_wire_format() {
        let op: BatchSet =
            serde_json::from_value(json!({"tierName": "database", "key": "q", "value": [1]}))
                .unwrap();
        assert_eq!(op, BatchSet::new("database", "q", json!([1]), None));
    }

    #[test]
    fn test_export_len() {
        let mut tiers = BTreeMap::new();
        tiers.insert(TierName::Standard, BTreeMap::from([("a".to_string(), json!(1))]));
        tiers.insert(TierName::Critical, BTreeMap::new());
        let export = CacheExport {
            exported_at: Utc::now(),
            tiers,
        };
        assert_eq!(export.len(), 1);
        assert!(!export.is_empty());
    }
}
