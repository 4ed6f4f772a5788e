//! Prometheus export of cache statistics
//!
//! Gauges live on a private registry and are refreshed from a
//! `CacheStatsSnapshot` right before each scrape.

use crate::cache::manager::AdvancedCache;
use crate::cache::metrics::CacheStatsSnapshot;
use crate::error::{Error, Result};
use prometheus::{Encoder, Gauge, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

const NAMESPACE: &str = "advanced_cache";

/// Cache statistics as Prometheus gauges
pub struct PrometheusExporter {
    cache: Arc<AdvancedCache>,
    registry: Registry,
    hits: IntGauge,
    misses: IntGauge,
    requests: IntGauge,
    sets: IntGauge,
    compressions: IntGauge,
    decompressions: IntGauge,
    invalidations: IntGauge,
    evictions: IntGauge,
    expirations: IntGauge,
    memory_bytes: IntGauge,
    hit_ratio: Gauge,
    avg_response_ms: Gauge,
    tier_keys: IntGaugeVec,
}

fn int_gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge> {
    let gauge = IntGauge::with_opts(Opts::new(name, help).namespace(NAMESPACE)).map_err(prom_err)?;
    registry.register(Box::new(gauge.clone())).map_err(prom_err)?;
    Ok(gauge)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<Gauge> {
    let gauge = Gauge::with_opts(Opts::new(name, help).namespace(NAMESPACE)).map_err(prom_err)?;
    registry.register(Box::new(gauge.clone())).map_err(prom_err)?;
    Ok(gauge)
}

fn prom_err(e: prometheus::Error) -> Error {
    Error::Internal(format!("prometheus: {}", e))
}

impl PrometheusExporter {
    /// Register all cache gauges on a fresh registry
    pub fn new(cache: Arc<AdvancedCache>) -> Result<Self> {
        let registry = Registry::new();

        let tier_keys = IntGaugeVec::new(
            Opts::new("tier_keys", "Keys currently held per tier").namespace(NAMESPACE),
            &["tier"],
        )
        .map_err(prom_err)?;
        registry.register(Box::new(tier_keys.clone())).map_err(prom_err)?;

        Ok(Self {
            hits: int_gauge(&registry, "hits", "Lookups that found a live entry")?,
            misses: int_gauge(&registry, "misses", "Lookups that found nothing")?,
            requests: int_gauge(&registry, "requests", "Total lookups")?,
            sets: int_gauge(&registry, "sets", "Entries stored")?,
            compressions: int_gauge(&registry, "compressions", "Values stored compressed")?,
            decompressions: int_gauge(&registry, "decompressions", "Compressed values read back")?,
            invalidations: int_gauge(&registry, "invalidations", "Entries removed by invalidation")?,
            evictions: int_gauge(&registry, "evictions", "Entries evicted for capacity")?,
            expirations: int_gauge(&registry, "expirations", "Entries removed after expiry")?,
            memory_bytes: int_gauge(&registry, "memory_bytes", "Estimated stored bytes")?,
            hit_ratio: gauge(&registry, "hit_ratio", "Hits over total lookups")?,
            avg_response_ms: gauge(
                &registry,
                "avg_response_ms",
                "Mean lookup latency in milliseconds",
            )?,
            tier_keys,
            registry,
            cache,
        })
    }

    /// Copy a snapshot into the gauges
    pub fn update(&self, stats: &CacheStatsSnapshot) {
        self.hits.set(stats.hits as i64);
        self.misses.set(stats.misses as i64);
        self.requests.set(stats.total_requests as i64);
        self.sets.set(stats.sets as i64);
        self.compressions.set(stats.compressions as i64);
        self.decompressions.set(stats.decompressions as i64);
        self.invalidations.set(stats.invalidations as i64);
        self.evictions.set(stats.evictions as i64);
        self.expirations.set(stats.expirations as i64);
        self.memory_bytes.set(stats.memory_usage_bytes as i64);
        self.hit_ratio.set(stats.hit_ratio());
        self.avg_response_ms.set(stats.average_response_time_ms);
        for (tier, keys) in &stats.tiers {
            self.tier_keys
                .with_label_values(&[tier.as_str()])
                .set(*keys as i64);
        }
    }

    /// Refresh from the cache and render the text exposition format
    pub fn render(&self) -> Result<(String, Vec<u8>)> {
        self.update(&self.cache.stats());

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(prom_err)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}
