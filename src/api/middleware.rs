//! Response caching middleware for Axum
//!
//! Serves cached JSON bodies for safe requests and populates the cache from
//! successful JSON responses. Mutating methods pass straight through.

use crate::cache::manager::AdvancedCache;
use crate::cache::tier::TierName;
use axum::{
    body::{to_bytes, Body, HttpBody},
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Response header carrying `HIT` or `MISS`
pub const X_CACHE: &str = "x-cache";

/// Response header naming the tier a hit came from
pub const X_CACHE_TIER: &str = "x-cache-tier";

/// Builds the cache key for a request
pub type KeyFn = Arc<dyn Fn(&Method, &Uri) -> String + Send + Sync>;

/// State for the caching middleware
#[derive(Clone)]
pub struct CacheLayerConfig {
    pub cache: Arc<AdvancedCache>,
    pub tier: TierName,
    /// TTL override for cached responses
    pub ttl_seconds: Option<u64>,
    /// Custom key function; defaults to method + decoded path and query
    pub key_fn: Option<KeyFn>,
    /// Largest response body that will be buffered
    pub max_body_bytes: usize,
}

impl CacheLayerConfig {
    pub fn new(cache: Arc<AdvancedCache>, tier: TierName) -> Self {
        Self {
            cache,
            tier,
            ttl_seconds: None,
            key_fn: None,
            max_body_bytes: 10 * 1024 * 1024, // 10MB
        }
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = Some(ttl_seconds);
        self
    }

    pub fn with_key_fn(mut self, f: impl Fn(&Method, &Uri) -> String + Send + Sync + 'static) -> Self {
        self.key_fn = Some(Arc::new(f));
        self
    }

    fn key_for(&self, method: &Method, uri: &Uri) -> String {
        match &self.key_fn {
            Some(f) => f(method, uri),
            None => default_key(method, uri),
        }
    }
}

/// `http:{METHOD}:{path?query}` with percent-decoding applied
pub fn default_key(method: &Method, uri: &Uri) -> String {
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let decoded = urlencoding::decode(target)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| target.to_string());
    format!("http:{}:{}", method, decoded)
}

fn is_cacheable_method(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/json"))
        .unwrap_or(false)
}

/// Caching middleware; install with `axum::middleware::from_fn_with_state`
pub async fn cache_layer(
    State(config): State<CacheLayerConfig>,
    request: Request,
    next: Next,
) -> Response {
    if !is_cacheable_method(request.method()) {
        return next.run(request).await;
    }

    let key = config.key_for(request.method(), request.uri());

    match config.cache.get(config.tier.as_str(), &key).await {
        Ok(Some(hit)) => {
            debug!(key = %key, tier = %config.tier, "Serving cached response");
            let mut response = Json(hit.data).into_response();
            mark(&mut response, "HIT");
            if let Ok(tier) = HeaderValue::from_str(config.tier.as_str()) {
                response.headers_mut().insert(X_CACHE_TIER, tier);
            }
            return response;
        }
        Ok(None) => {}
        Err(e) => warn!(key = %key, error = %e, "Cache lookup failed"),
    }

    let response = next.run(request).await;
    if !response.status().is_success() || !is_json(&response) {
        let mut response = response;
        mark(&mut response, "MISS");
        return response;
    }

    // Only buffer bodies of known length that fit; everything else streams through
    let fits = response
        .body()
        .size_hint()
        .upper()
        .is_some_and(|len| len <= config.max_body_bytes as u64);
    if !fits {
        debug!(key = %key, limit = config.max_body_bytes, "Response too large to cache");
        let mut response = response;
        mark(&mut response, "MISS");
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, config.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            // Stream already consumed, nothing left to forward
            warn!(key = %key, error = %e, "Failed to buffer response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(value) => {
            match config
                .cache
                .set(config.tier.as_str(), &key, &value, config.ttl_seconds)
                .await
            {
                Ok(true) => debug!(key = %key, tier = %config.tier, "Cached response"),
                Ok(false) => {}
                Err(e) => warn!(key = %key, error = %e, "Failed to cache response"),
            }
        }
        Err(e) => debug!(key = %key, error = %e, "Response body is not valid JSON"),
    }

    let mut response = Response::from_parts(parts, Body::from(bytes));
    mark(&mut response, "MISS");
    response
}

fn mark(response: &mut Response, status: &'static str) {
    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static(status));
}
