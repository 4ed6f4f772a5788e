//! Health Report Types
//!
//! Results of the per-tier round-trip probe.

use crate::cache::tier::TierName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Outcome of probing one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Probe value read back intact
    Healthy,
    /// Probe completed but read back something else
    Degraded,
    /// Tier returned an error
    Error,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        *self == HealthStatus::Healthy
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Error => write!(f, "error"),
        }
    }
}

/// Probe result for one tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub keys: usize,
    pub probe_ms: u64,
}

impl TierHealth {
    pub fn healthy(keys: usize) -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
            keys,
            probe_ms: 0,
        }
    }

    pub fn degraded(keys: usize, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            keys,
            probe_ms: 0,
        }
    }

    pub fn error(keys: usize, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Error,
            message: Some(message.into()),
            keys,
            probe_ms: 0,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.probe_ms = duration.as_millis() as u64;
        self
    }
}

/// Overall cache health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Healthy only if every tier is healthy, otherwise degraded
    pub status: HealthStatus,
    pub tiers: BTreeMap<TierName, TierHealth>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    /// Aggregate per-tier results
    pub fn new(tiers: BTreeMap<TierName, TierHealth>) -> Self {
        let status = if tiers.values().all(|t| t.status.is_healthy()) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        Self {
            status,
            tiers,
            checked_at: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }

    /// Tiers that did not pass
    pub fn failing_tiers(&self) -> Vec<TierName> {
        self.tiers
            .iter()
            .filter(|(_, h)| !h.status.is_healthy())
            .map(|(t, _)| *t)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_healthy() {
        let tiers = TierName::ALL.iter().map(|t| (*t, TierHealth::healthy(0))).collect();
        let report = HealthReport::new(tiers);
        assert!(report.is_healthy());
        assert!(report.failing_tiers().is_empty());
    }

    #[test]
    fn test_any_failure_degrades() {
        let mut tiers: BTreeMap<_, _> =
            TierName::ALL.iter().map(|t| (*t, TierHealth::healthy(0))).collect();
        tiers.insert(TierName::Database, TierHealth::error(0, "boom"));

        let report = HealthReport::new(tiers);
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.failing_tiers(), vec![TierName::Database]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["tiers"]["database"]["status"], "error");
        assert_eq!(json["tiers"]["database"]["message"], "boom");
    }
}
