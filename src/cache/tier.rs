//! Cache Tier Definitions
//!
//! Six fixed, independently configured tiers. Each tier has its own default
//! TTL, expiry sweep interval and entry capacity.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// =============================================================================
// Capacity Defaults
// =============================================================================

/// Fraction of `max_entries` above which capacity eviction kicks in
pub const DEFAULT_HIGH_WATERMARK: f64 = 0.90;

/// Fraction of current entries removed by one capacity eviction pass
pub const DEFAULT_EVICT_FRACTION: f64 = 0.20;

// =============================================================================
// Tier Name
// =============================================================================

/// Name of one of the six cache tiers
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TierName {
    /// Very short lived, hot data
    Critical,
    /// Frequently requested data
    Frequent,
    /// General purpose responses
    Standard,
    /// Rarely changing data
    Longterm,
    /// Database query results
    Database,
    /// AI provider listings and responses
    AiProviders,
}

impl TierName {
    /// All tiers in declaration order
    pub const ALL: [TierName; 6] = [
        TierName::Critical,
        TierName::Frequent,
        TierName::Standard,
        TierName::Longterm,
        TierName::Database,
        TierName::AiProviders,
    ];

    /// Position of the tier in `ALL`
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Wire name of the tier
    pub fn as_str(&self) -> &'static str {
        match self {
            TierName::Critical => "critical",
            TierName::Frequent => "frequent",
            TierName::Standard => "standard",
            TierName::Longterm => "longterm",
            TierName::Database => "database",
            TierName::AiProviders => "ai_providers",
        }
    }

    /// Default configuration for this tier
    pub fn default_config(&self) -> TierConfig {
        match self {
            TierName::Critical => TierConfig::new(30, 5, 500),
            TierName::Frequent => TierConfig::new(120, 20, 1000),
            TierName::Standard => TierConfig::new(300, 60, 2000),
            TierName::Longterm => TierConfig::new(1800, 300, 1000),
            TierName::Database => TierConfig::new(10, 2, 3000),
            TierName::AiProviders => TierConfig::new(180, 30, 200),
        }
    }
}

impl fmt::Display for TierName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TierName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TierName::ALL
            .iter()
            .copied()
            .find(|tier| tier.as_str() == s)
            .ok_or_else(|| Error::UnknownTier {
                name: s.to_string(),
            })
    }
}

// =============================================================================
// Tier Configuration
// =============================================================================

/// Configuration for a single tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierConfig {
    /// Default lifetime of an entry
    pub ttl_seconds: u64,
    /// How often expired entries are swept
    pub check_interval_seconds: u64,
    /// Capacity bound
    pub max_entries: usize,
    /// Remove entries once expired
    #[serde(default = "default_delete_on_expire")]
    pub delete_on_expire: bool,
}

fn default_delete_on_expire() -> bool {
    true
}

impl TierConfig {
    /// Create a tier config with `delete_on_expire` set
    pub fn new(ttl_seconds: u64, check_interval_seconds: u64, max_entries: usize) -> Self {
        Self {
            ttl_seconds,
            check_interval_seconds,
            max_entries,
            delete_on_expire: true,
        }
    }

    /// Default TTL as a duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Sweep interval as a duration
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds.max(1))
    }

    /// Entry count above which capacity eviction runs
    pub fn high_watermark(&self, watermark: f64) -> usize {
        (self.max_entries as f64 * watermark).floor() as usize
    }

    /// Check if `len` entries is past the high watermark
    pub fn should_compact(&self, len: usize, watermark: f64) -> bool {
        len > self.high_watermark(watermark)
    }

    /// Number of oldest entries to drop from a tier holding `len` entries
    pub fn eviction_count(&self, len: usize, fraction: f64) -> usize {
        if len == 0 {
            return 0;
        }
        ((len as f64 * fraction).ceil() as usize).clamp(1, len)
    }

    /// Validate the config for the given tier
    pub fn validate(&self, tier: TierName) -> Result<()> {
        if self.ttl_seconds == 0 {
            return Err(Error::Configuration(format!("tier {}: ttlSeconds must be > 0", tier)));
        }
        if self.check_interval_seconds == 0 {
            return Err(Error::Configuration(format!(
                "tier {}: checkIntervalSeconds must be > 0",
                tier
            )));
        }
        if self.max_entries == 0 {
            return Err(Error::Configuration(format!("tier {}: maxEntries must be > 0", tier)));
        }
        Ok(())
    }
}
