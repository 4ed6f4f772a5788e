//! Advanced Cache - Multi-Tier In-Memory Caching
//!
//! An in-process cache for API responses and query results, organised as six
//! named tiers with per-tier TTL, sweep interval and capacity.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                              HTTP Surface                                    │
//! │  ┌─────────────────────┐  ┌─────────────────────┐  ┌─────────────────────┐  │
//! │  │  Response Caching   │  │   Admin REST API    │  │  Prometheus Export  │  │
//! │  │  Middleware (axum)  │  │   /cache/*          │  │  /metrics           │  │
//! │  └──────────┬──────────┘  └──────────┬──────────┘  └──────────┬──────────┘  │
//! │             └────────────────────────┼────────────────────────┘             │
//! ├──────────────────────────────────────┼──────────────────────────────────────┤
//! │                           ┌──────────┴──────────┐                           │
//! │                           │    AdvancedCache    │                           │
//! │                           └──────────┬──────────┘                           │
//! │  ┌───────────┐ ┌───────────┐ ┌───────┴───┐ ┌───────────┐ ┌───────────┐      │
//! │  │ critical  │ │ frequent  │ │ standard  │ │ longterm  │ │ database  │ ...  │
//! │  └───────────┘ └───────────┘ └───────────┘ └───────────┘ └───────────┘      │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  Compression (gzip/zstd/lz4)  •  Smart invalidation  •  Expiry sweepers     │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: Tiers, compression, invalidation, statistics and health
//! - [`api`]: HTTP middleware, admin endpoints and metrics export
//! - [`error`]: Error types and handling

pub mod api;
pub mod cache;
pub mod error;

// Re-export commonly used types
pub use api::{cache_layer, CacheAdminRouter, CacheLayerConfig, PrometheusExporter};

pub use cache::{
    AdvancedCache, CacheConfig, CacheEvent, CacheMonitor, CacheStatsSnapshot, CachedValue,
    HealthReport, InvalidationOptions, InvalidationPattern, TierConfig, TierName, ValueLoader,
};

pub use error::{Error, ErrorClass, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
