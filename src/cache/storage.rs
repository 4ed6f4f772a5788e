//! Tier Storage
//!
//! The `TierStorage` seam and its in-memory implementation. Entries are kept
//! in an insertion-ordered map so "oldest N entries" is well defined: the
//! front of the map is the oldest insertion, and replacing a key moves it to
//! the back.

use crate::cache::entry::CacheEntry;
use crate::cache::events::CacheObserver;
use crate::cache::tier::{TierConfig, TierName, DEFAULT_EVICT_FRACTION, DEFAULT_HIGH_WATERMARK};
use crate::error::Result;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::time::Instant;

// =============================================================================
// TierStorage Trait
// =============================================================================

/// Storage operations for a single tier
///
/// All operations are synchronous; compression happens before an entry is
/// handed to `insert` and after it is returned from `get`.
pub trait TierStorage: Send + Sync {
    /// Tier this storage serves
    fn tier(&self) -> TierName;

    /// Tier configuration
    fn config(&self) -> &TierConfig;

    /// Get a live entry; an expired entry is removed and reported as absent
    fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Store an entry, replacing any previous entry under the same key
    ///
    /// Returns the number of entries evicted for capacity.
    fn insert(&self, entry: CacheEntry) -> Result<usize>;

    /// Store a short-lived diagnostic entry without running capacity eviction
    ///
    /// The tier may hold one entry past `max_entries` until the caller
    /// removes it again.
    fn insert_probe(&self, entry: CacheEntry) -> Result<()> {
        self.insert(entry).map(|_| ())
    }

    /// Remove an entry
    fn remove(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Remove every key matching `predicate`, returning how many were removed
    fn remove_matching(&self, predicate: &dyn Fn(&str) -> bool) -> Result<usize>;

    /// All keys in insertion order (oldest first)
    fn keys(&self) -> Vec<String>;

    /// Current entry count
    fn len(&self) -> usize;

    /// Check if the tier is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live entries in insertion order
    fn entries(&self) -> Vec<CacheEntry>;

    /// Remove all expired entries
    fn sweep_expired(&self) -> usize;

    /// Drop the oldest entries if the tier is past its high watermark
    fn compact(&self) -> usize;

    /// Remove all entries
    fn flush(&self) -> usize;
}

// =============================================================================
// Memory Tier
// =============================================================================

/// In-memory tier backed by an insertion-ordered map
pub struct MemoryTier {
    tier: TierName,
    config: TierConfig,
    high_watermark: f64,
    evict_fraction: f64,
    entries: RwLock<IndexMap<String, CacheEntry>>,
    observers: Vec<Arc<dyn CacheObserver>>,
}

impl MemoryTier {
    /// Create a tier with default capacity policy
    pub fn new(tier: TierName, config: TierConfig) -> Self {
        Self {
            tier,
            config,
            high_watermark: DEFAULT_HIGH_WATERMARK,
            evict_fraction: DEFAULT_EVICT_FRACTION,
            entries: RwLock::new(IndexMap::new()),
            observers: Vec::new(),
        }
    }

    /// Override the capacity eviction policy
    pub fn with_capacity_policy(mut self, high_watermark: f64, evict_fraction: f64) -> Self {
        self.high_watermark = high_watermark;
        self.evict_fraction = evict_fraction;
        self
    }

    /// Attach an observer
    pub fn with_observer(mut self, observer: Arc<dyn CacheObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    fn notify(&self, f: impl Fn(&dyn CacheObserver)) {
        for observer in &self.observers {
            f(observer.as_ref());
        }
    }

    /// Pop the `count` oldest entries; caller holds the write lock
    fn evict_oldest(&self, entries: &mut IndexMap<String, CacheEntry>, count: usize) -> Vec<String> {
        let count = count.min(entries.len());
        entries.drain(..count).map(|(key, _)| key).collect()
    }
}

impl TierStorage for MemoryTier {
    fn tier(&self) -> TierName {
        self.tier
    }

    fn config(&self) -> &TierConfig {
        &self.config
    }

    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired() => return Ok(Some(entry.clone())),
                Some(_) => {}
            }
        }

        // Expired: never served, even if the sweeper has not run yet
        if self.config.delete_on_expire {
            let removed = {
                let mut entries = self.entries.write();
                match entries.get(key) {
                    Some(entry) if entry.is_expired() => entries.shift_remove(key).is_some(),
                    _ => false,
                }
            };
            if removed {
                self.notify(|o| o.on_expire(self.tier, key));
            }
        }
        Ok(None)
    }

    fn insert(&self, entry: CacheEntry) -> Result<usize> {
        let key = entry.key.clone();
        let size = entry.stored_size();
        let compressed = entry.payload.is_compressed();

        let evicted = {
            let mut entries = self.entries.write();
            let replaced = entries.shift_remove(&key).is_some();

            // Hard bound: never exceed max_entries, even with tiny tiers
            let mut evicted = Vec::new();
            if !replaced && entries.len() >= self.config.max_entries {
                let overflow = entries.len() + 1 - self.config.max_entries;
                evicted.extend(self.evict_oldest(&mut entries, overflow));
            }

            entries.insert(key.clone(), entry);

            // Soft guard: past the watermark drop the oldest fraction
            if self.config.should_compact(entries.len(), self.high_watermark) {
                let count = self.config.eviction_count(entries.len(), self.evict_fraction);
                evicted.extend(self.evict_oldest(&mut entries, count));
            }
            evicted
        };

        self.notify(|o| o.on_set(self.tier, &key, size, compressed));
        for evicted_key in &evicted {
            self.notify(|o| o.on_evict(self.tier, evicted_key));
        }
        Ok(evicted.len())
    }

    fn insert_probe(&self, entry: CacheEntry) -> Result<()> {
        self.entries.write().insert(entry.key.clone(), entry);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<Option<CacheEntry>> {
        let removed = self.entries.write().shift_remove(key);
        if removed.is_some() {
            self.notify(|o| o.on_delete(self.tier, key));
        }
        Ok(removed)
    }

    fn remove_matching(&self, predicate: &dyn Fn(&str) -> bool) -> Result<usize> {
        let removed: Vec<String> = {
            let mut entries = self.entries.write();
            let matched: Vec<String> = entries.keys().filter(|k| predicate(k)).cloned().collect();
            for key in &matched {
                entries.shift_remove(key);
            }
            matched
        };
        for key in &removed {
            self.notify(|o| o.on_delete(self.tier, key));
        }
        Ok(removed.len())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn entries(&self) -> Vec<CacheEntry> {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|e| !e.is_expired_at(now))
            .cloned()
            .collect()
    }

    fn sweep_expired(&self) -> usize {
        if !self.config.delete_on_expire {
            return 0;
        }
        let now = Instant::now();
        let expired: Vec<String> = {
            let mut entries = self.entries.write();
            let expired: Vec<String> = entries
                .iter()
                .filter(|(_, e)| e.is_expired_at(now))
                .map(|(k, _)| k.clone())
                .collect();
            entries.retain(|_, e| !e.is_expired_at(now));
            expired
        };
        for key in &expired {
            self.notify(|o| o.on_expire(self.tier, key));
        }
        expired.len()
    }

    fn compact(&self) -> usize {
        let evicted = {
            let mut entries = self.entries.write();
            if !self.config.should_compact(entries.len(), self.high_watermark) {
                return 0;
            }
            let count = self.config.eviction_count(entries.len(), self.evict_fraction);
            self.evict_oldest(&mut entries, count)
        };
        for key in &evicted {
            self.notify(|o| o.on_evict(self.tier, key));
        }
        evicted.len()
    }

    fn flush(&self) -> usize {
        let removed = {
            let mut entries = self.entries.write();
            let n = entries.len();
            entries.clear();
            n
        };
        self.notify(|o| o.on_flush(self.tier, removed));
        removed
    }
}
