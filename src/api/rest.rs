//! Cache Admin REST API
//!
//! Statistics, health, export and invalidation endpoints over a shared
//! `AdvancedCache`.

use crate::cache::invalidation::{InvalidationOptions, InvalidationPattern, PatternKind};
use crate::cache::manager::AdvancedCache;
use crate::error::Error;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Pattern invalidation request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidateRequest {
    /// Pattern source
    pub pattern: String,
    /// How `pattern` is interpreted: substring, exact, regex, glob
    #[serde(default)]
    pub kind: PatternKind,
    /// Tier names to search (None = all tiers)
    #[serde(default)]
    pub cache_types: Option<Vec<String>>,
}

/// Number of entries removed by an admin action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedResponse {
    pub removed: usize,
}

/// Smart invalidation response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub event: String,
    /// Whether a rule exists for the event
    pub known: bool,
    pub removed: usize,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
}

impl From<Error> for ApiErrorResponse {
    fn from(err: Error) -> Self {
        let error = match &err {
            Error::UnknownTier { .. } => "unknown_tier",
            Error::InvalidPattern(_) => "invalid_pattern",
            Error::Configuration(_) => "invalid_request",
            _ => "internal_error",
        };
        Self {
            error: error.into(),
            message: err.to_string(),
        }
    }
}

fn error_response(err: Error) -> Response {
    let status = if err.is_caller_bug() {
        StatusCode::BAD_REQUEST
    } else {
        warn!(error = %err, "Cache admin request failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(ApiErrorResponse::from(err))).into_response()
}

// =============================================================================
// REST Router
// =============================================================================

/// Admin router builder
pub struct CacheAdminRouter {
    cache: Arc<AdvancedCache>,
}

impl CacheAdminRouter {
    pub fn new(cache: Arc<AdvancedCache>) -> Self {
        Self { cache }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState { cache: self.cache };

        Router::new()
            .route("/cache/stats", get(get_stats))
            .route("/cache/health", get(get_health))
            .route("/cache/export", get(export_cache))
            .route("/cache/invalidate", post(invalidate))
            .route("/cache/events/:event", post(fire_event))
            .route("/cache/tiers/:tier/compact", post(compact_tier))
            .route("/cache", delete(clear_cache))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    cache: Arc<AdvancedCache>,
}

// =============================================================================
// Handlers
// =============================================================================

async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.cache.stats()))
}

/// 200 when every tier passes, 503 otherwise
async fn get_health(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.cache.health_check().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

async fn export_cache(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.cache.export().await))
}

async fn invalidate(
    State(state): State<AppState>,
    Json(request): Json<InvalidateRequest>,
) -> Response {
    let pattern = match InvalidationPattern::parse(request.kind, &request.pattern) {
        Ok(pattern) => pattern,
        Err(e) => return error_response(e),
    };
    let options = InvalidationOptions {
        cache_types: request.cache_types,
    };

    match state.cache.invalidate(pattern, &options) {
        Ok(removed) => {
            info!(pattern = %request.pattern, removed, "Invalidated via API");
            (StatusCode::OK, Json(RemovedResponse { removed })).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn fire_event(
    State(state): State<AppState>,
    Path(event): Path<String>,
    payload: Option<Json<Value>>,
) -> Response {
    let payload = payload.map(|Json(v)| v).unwrap_or(Value::Null);
    let known = state.cache.invalidation_events().contains(&event.as_str());

    match state.cache.smart_invalidate(&event, &payload) {
        Ok(removed) => (
            StatusCode::OK,
            Json(EventResponse {
                event,
                known,
                removed,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn compact_tier(State(state): State<AppState>, Path(tier): Path<String>) -> Response {
    match state.cache.compact_tier(&tier) {
        Ok(removed) => (StatusCode::OK, Json(RemovedResponse { removed })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn clear_cache(State(state): State<AppState>) -> impl IntoResponse {
    let removed = state.cache.clear_all();
    (StatusCode::OK, Json(RemovedResponse { removed }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use serde_json::json;
    use tower::ServiceExt;

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn seeded() -> (Arc<AdvancedCache>, Router) {
        let cache = Arc::new(AdvancedCache::new().unwrap());
        cache.set("standard", "posts:list", &json!([1]), None).await.unwrap();
        cache.set("standard", "post:42", &json!({"id": 42}), None).await.unwrap();
        cache.set("frequent", "user:7", &json!({"id": 7}), None).await.unwrap();
        let app = CacheAdminRouter::new(cache.clone()).build();
        (cache, app)
    }

    #[tokio::test]
    async fn test_stats_and_health() {
        let (_, app) = seeded().await;

        let (status, stats) = call(&app, Method::GET, "/cache/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["totalKeys"], 3);
        assert_eq!(stats["hitRate"], "0%");

        let (status, health) = call(&app, Method::GET, "/cache/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "healthy");
    }

    #[tokio::test]
    async fn test_invalidate_endpoint() {
        let (cache, app) = seeded().await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/cache/invalidate",
            Some(json!({"pattern": "post*", "kind": "glob", "cacheTypes": ["standard"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], 2);
        assert_eq!(cache.stats().total_keys, 1);

        let (status, body) = call(
            &app,
            Method::POST,
            "/cache/invalidate",
            Some(json!({"pattern": "x", "cacheTypes": ["hot"]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "unknown_tier");

        let (status, body) = call(
            &app,
            Method::POST,
            "/cache/invalidate",
            Some(json!({"pattern": "(", "kind": "regex"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_pattern");
    }

    #[tokio::test]
    async fn test_event_endpoint() {
        let (cache, app) = seeded().await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/cache/events/post_updated",
            Some(json!({"postId": 42})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["known"], true);
        assert_eq!(body["removed"], 2);
        assert!(cache.get("frequent", "user:7").await.unwrap().is_some());

        let (status, body) = call(&app, Method::POST, "/cache/events/something_new", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["known"], false);
        assert_eq!(body["removed"], 0);
    }

    #[tokio::test]
    async fn test_compact_export_and_clear() {
        let (_, app) = seeded().await;

        let (status, body) = call(&app, Method::POST, "/cache/tiers/standard/compact", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], 0);

        let (status, _) = call(&app, Method::POST, "/cache/tiers/hot/compact", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, export) = call(&app, Method::GET, "/cache/export", None).await;
        assert_eq!(export["tiers"]["standard"]["post:42"]["id"], 42);

        let (status, body) = call(&app, Method::DELETE, "/cache", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], 3);
    }
}
