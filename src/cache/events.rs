//! Cache Events
//!
//! Per-tier observer hooks invoked synchronously on every mutating operation,
//! plus the event type broadcast to subscribers.

use crate::cache::tier::TierName;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Reason an entry left a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// TTL elapsed
    Expired,
    /// Capacity eviction
    Capacity,
    /// Explicit delete or pattern invalidation
    Deleted,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalReason::Expired => write!(f, "expired"),
            RemovalReason::Capacity => write!(f, "capacity"),
            RemovalReason::Deleted => write!(f, "deleted"),
        }
    }
}

// =============================================================================
// Observer Trait
// =============================================================================

/// Hooks fired by tier storage
///
/// Implementations must be cheap; they run inline with the tier operation.
pub trait CacheObserver: Send + Sync {
    /// An entry was stored
    fn on_set(&self, _tier: TierName, _key: &str, _size_bytes: u64, _compressed: bool) {}

    /// An entry expired and was removed
    fn on_expire(&self, _tier: TierName, _key: &str) {}

    /// An entry was removed explicitly or by invalidation
    fn on_delete(&self, _tier: TierName, _key: &str) {}

    /// An entry was evicted for capacity
    fn on_evict(&self, _tier: TierName, _key: &str) {}

    /// A tier was flushed
    fn on_flush(&self, _tier: TierName, _entries_removed: usize) {}
}

/// Observer that writes each tier event to the debug log
#[derive(Debug, Default)]
pub struct LoggingObserver;

impl CacheObserver for LoggingObserver {
    fn on_set(&self, tier: TierName, key: &str, size_bytes: u64, compressed: bool) {
        debug!(tier = %tier, key = %key, size = size_bytes, compressed, "Cache set");
    }

    fn on_expire(&self, tier: TierName, key: &str) {
        debug!(tier = %tier, key = %key, "Cache entry expired");
    }

    fn on_delete(&self, tier: TierName, key: &str) {
        debug!(tier = %tier, key = %key, "Cache entry deleted");
    }

    fn on_evict(&self, tier: TierName, key: &str) {
        debug!(tier = %tier, key = %key, "Cache entry evicted");
    }

    fn on_flush(&self, tier: TierName, entries_removed: usize) {
        debug!(tier = %tier, entries = entries_removed, "Cache tier flushed");
    }
}

// =============================================================================
// Broadcast Events
// =============================================================================

/// Events published to subscribers of the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheEvent {
    /// Entry was stored
    Set {
        tier: TierName,
        key: String,
        size_bytes: u64,
        compressed: bool,
    },
    /// Lookup found an entry
    Hit { tier: TierName, key: String },
    /// Lookup found nothing
    Miss { tier: TierName, key: String },
    /// Entry left a tier
    Removed {
        tier: TierName,
        key: String,
        reason: RemovalReason,
    },
    /// Pattern invalidation completed
    Invalidated { pattern: String, removed: usize },
    /// Tier was flushed
    TierFlushed { tier: TierName, entries_removed: usize },
}

impl CacheEvent {
    /// Key associated with this event, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            CacheEvent::Set { key, .. }
            | CacheEvent::Hit { key, .. }
            | CacheEvent::Miss { key, .. }
            | CacheEvent::Removed { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Tier associated with this event, if any
    pub fn tier(&self) -> Option<TierName> {
        match self {
            CacheEvent::Set { tier, .. }
            | CacheEvent::Hit { tier, .. }
            | CacheEvent::Miss { tier, .. }
            | CacheEvent::Removed { tier, .. }
            | CacheEvent::TierFlushed { tier, .. } => Some(*tier),
            CacheEvent::Invalidated { .. } => None,
        }
    }
}

/// Observer forwarding tier events onto a broadcast channel
pub struct EventBroadcaster {
    tx: broadcast::Sender<CacheEvent>,
}

impl EventBroadcaster {
    /// Create a broadcaster with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; dropped silently when nobody listens
    pub fn publish(&self, event: CacheEvent) {
        let _ = self.tx.send(event);
    }
}

impl CacheObserver for EventBroadcaster {
    fn on_set(&self, tier: TierName, key: &str, size_bytes: u64, compressed: bool) {
        self.publish(CacheEvent::Set {
            tier,
            key: key.to_string(),
            size_bytes,
            compressed,
        });
    }

    fn on_expire(&self, tier: TierName, key: &str) {
        self.publish(CacheEvent::Removed {
            tier,
            key: key.to_string(),
            reason: RemovalReason::Expired,
        });
    }

    fn on_delete(&self, tier: TierName, key: &str) {
        self.publish(CacheEvent::Removed {
            tier,
            key: key.to_string(),
            reason: RemovalReason::Deleted,
        });
    }

    fn on_evict(&self, tier: TierName, key: &str) {
        self.publish(CacheEvent::Removed {
            tier,
            key: key.to_string(),
            reason: RemovalReason::Capacity,
        });
    }

    fn on_flush(&self, tier: TierName, entries_removed: usize) {
        self.publish(CacheEvent::TierFlushed {
            tier,
            entries_removed,
        });
    }
}
