//! API Module
//!
//! HTTP integration for the cache: response caching middleware, admin REST
//! endpoints and Prometheus export.

pub mod metrics;
pub mod middleware;
pub mod rest;

pub use metrics::PrometheusExporter;
pub use middleware::{cache_layer, default_key, CacheLayerConfig, KeyFn, X_CACHE, X_CACHE_TIER};
pub use rest::{ApiErrorResponse, CacheAdminRouter, InvalidateRequest};
