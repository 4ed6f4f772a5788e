//! Background Maintenance
//!
//! One expiry sweeper per tier, ticking at the tier's check interval, plus a
//! statistics reporter that refreshes the memory estimate and logs a summary.
//! All tasks stop when the cancellation token fires.

use crate::cache::manager::AdvancedCache;
use crate::cache::tier::TierName;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Spawns and owns the cache's background tasks
pub struct CacheMonitor {
    handles: Vec<JoinHandle<()>>,
    token: CancellationToken,
}

impl CacheMonitor {
    /// Start sweepers and the reporter on the current runtime
    pub fn spawn(cache: Arc<AdvancedCache>, token: CancellationToken) -> Self {
        let mut handles = Vec::with_capacity(TierName::ALL.len() + 1);

        for tier in TierName::ALL {
            let every = cache.config().tier(tier).check_interval();
            handles.push(tokio::spawn(run_sweeper(
                cache.clone(),
                tier,
                every,
                token.clone(),
            )));
        }

        let every = cache.config().monitor_interval();
        handles.push(tokio::spawn(run_reporter(cache, every, token.clone())));

        info!(tasks = handles.len(), "Cache monitor started");
        Self { handles, token }
    }

    /// Number of running tasks
    pub fn task_count(&self) -> usize {
        self.handles.len()
    }

    /// Signal shutdown and wait for every task to finish
    pub async fn shutdown(self) {
        self.token.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("Cache monitor stopped");
    }
}

#[instrument(skip(cache, token))]
async fn run_sweeper(
    cache: Arc<AdvancedCache>,
    tier: TierName,
    every: Duration,
    token: CancellationToken,
) {
    let mut tick = interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    tick.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!(tier = %tier, "Expiry sweeper shutting down");
                break;
            }
            _ = tick.tick() => {
                let removed = cache.sweep_tier(tier);
                if removed > 0 {
                    debug!(tier = %tier, removed, "Swept expired entries");
                }
            }
        }
    }
}

#[instrument(skip(cache, token))]
async fn run_reporter(cache: Arc<AdvancedCache>, every: Duration, token: CancellationToken) {
    let mut tick = interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("Statistics reporter shutting down");
                break;
            }
            _ = tick.tick() => {
                cache.refresh_memory_usage();
                cache.log_summary();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_entries() {
        let cache = Arc::new(AdvancedCache::new().unwrap());
        cache.set("database", "q:1", &json!([1, 2]), None).await.unwrap();
        cache.set("longterm", "stable", &json!(1), None).await.unwrap();

        let monitor = CacheMonitor::spawn(cache.clone(), CancellationToken::new());
        assert_eq!(monitor.task_count(), 7);

        // database: ttl 10s, swept every 2s
        tokio::time::sleep(Duration::from_secs(13)).await;
        assert_eq!(cache.tier_key_counts()[&TierName::Database], 0);
        assert_eq!(cache.tier_key_counts()[&TierName::Longterm], 1);
        assert_eq!(cache.stats().expirations, 1);

        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reporter_refreshes_memory_estimate() {
        let cache = Arc::new(AdvancedCache::new().unwrap());
        cache.set("longterm", "k", &json!({"a": "b"}), None).await.unwrap();
        assert_eq!(cache.stats().memory_usage_bytes, 0);

        let token = CancellationToken::new();
        let monitor = CacheMonitor::spawn(cache.clone(), token.clone());
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(cache.stats().memory_usage_bytes > 0);

        token.cancel();
        monitor.shutdown().await;
    }
}
