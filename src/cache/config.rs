//! Cache Configuration
//!
//! Defaults reproduce the six built-in tiers. YAML files override any subset
//! of fields; tiers missing from the file keep their defaults.

use crate::cache::compression::CompressionConfig;
use crate::cache::tier::{TierConfig, TierName, DEFAULT_EVICT_FRACTION, DEFAULT_HIGH_WATERMARK};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Configuration for the advanced cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Per-tier overrides
    pub tiers: BTreeMap<TierName, TierConfig>,
    /// Compression configuration
    pub compression: CompressionConfig,
    /// Interval of the statistics reporter
    pub monitor_interval_secs: u64,
    /// Fraction of capacity above which the oldest entries are evicted
    pub capacity_high_watermark: f64,
    /// Fraction of entries evicted per capacity pass
    pub capacity_evict_fraction: f64,
    /// Keys longer than this are hashed by `create_key` when asked to
    pub max_key_length: usize,
    /// Number of keys sampled per tier for the memory estimate
    pub memory_sample_size: usize,
    /// Capacity of the event broadcast channel
    pub event_channel_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            tiers: TierName::ALL
                .iter()
                .map(|tier| (*tier, tier.default_config()))
                .collect(),
            compression: CompressionConfig::default(),
            monitor_interval_secs: 60,
            capacity_high_watermark: DEFAULT_HIGH_WATERMARK,
            capacity_evict_fraction: DEFAULT_EVICT_FRACTION,
            max_key_length: 200,
            memory_sample_size: 10,
            event_channel_capacity: 1024,
        }
    }
}

impl CacheConfig {
    /// Parse YAML over the defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut config: CacheConfig = serde_yaml::from_str(yaml)?;
        for tier in TierName::ALL {
            config
                .tiers
                .entry(tier)
                .or_insert_with(|| tier.default_config());
        }
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML config file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    /// Configuration for `tier`
    pub fn tier(&self, tier: TierName) -> TierConfig {
        self.tiers
            .get(&tier)
            .cloned()
            .unwrap_or_else(|| tier.default_config())
    }

    /// Override one tier
    pub fn with_tier(mut self, tier: TierName, config: TierConfig) -> Self {
        self.tiers.insert(tier, config);
        self
    }

    /// Statistics reporter interval
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs.max(1))
    }

    /// Reject configurations the cache cannot honour
    pub fn validate(&self) -> Result<()> {
        for (tier, config) in &self.tiers {
            config.validate(*tier)?;
        }
        let in_unit = |v: f64| v > 0.0 && v <= 1.0;
        if !in_unit(self.capacity_high_watermark) {
            return Err(Error::Configuration(format!(
                "capacityHighWatermark must be in (0, 1], got {}",
                self.capacity_high_watermark
            )));
        }
        if !in_unit(self.capacity_evict_fraction) {
            return Err(Error::Configuration(format!(
                "capacityEvictFraction must be in (0, 1], got {}",
                self.capacity_evict_fraction
            )));
        }
        if self.max_key_length == 0 {
            return Err(Error::Configuration("maxKeyLength must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::CompressionAlgorithm;
    use assert_matches::assert_matches;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.tiers.len(), 6);
        assert_eq!(config.tier(TierName::Standard).ttl_seconds, 300);
        assert_eq!(config.compression.threshold_bytes, 1024);
        assert_eq!(config.monitor_interval(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
tiers:
  critical:
    ttlSeconds: 15
    checkIntervalSeconds: 3
    maxEntries: 50
compression:
  thresholdBytes: 4096
  algorithm: zstd
monitorIntervalSecs: 30
"#;
        let config = CacheConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.tier(TierName::Critical), TierConfig::new(15, 3, 50));
        assert_eq!(config.tier(TierName::Longterm).ttl_seconds, 1800);
        assert_eq!(config.compression.threshold_bytes, 4096);
        assert_eq!(config.compression.algorithm, CompressionAlgorithm::Zstd);
        assert!(config.compression.enabled);
        assert_eq!(config.monitor_interval_secs, 30);
    }

    #[test]
    fn test_invalid_yaml_values() {
        assert_matches!(
            CacheConfig::from_yaml_str("capacityHighWatermark: 1.5"),
            Err(Error::Configuration(_))
        );
        assert_matches!(
            CacheConfig::from_yaml_str("tiers:\n  hot:\n    ttlSeconds: 1\n"),
            Err(Error::Yaml(_))
        );
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "maxKeyLength: 120").unwrap();

        let config = CacheConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.max_key_length, 120);

        assert_matches!(
            CacheConfig::from_yaml_file("/nonexistent/advanced-cache.yaml"),
            Err(Error::Io(_))
        );
    }
}
