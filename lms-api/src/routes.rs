//! HTTP routes.

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use lms_core::{CacheEvent, CacheKind};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::poll::{close_handler, poll_handler};
use crate::state::AppState;
use crate::ws::ws_handler;

/// Header carrying the id of the admin who triggered an invalidation.
pub const ADMIN_HEADER: &str = "x-admin-id";
pub const DEFAULT_ADMIN: &str = "system";

pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        .route("/health", get(health))
        .route("/realtime/ws", get(ws_handler))
        .route("/realtime/poll", get(poll_handler).delete(close_handler))
        .route("/api/cache/clear", post(clear_cache))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub subscribers: usize,
    pub poll_sessions: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        subscribers: state.hub.subscriber_count(),
        poll_sessions: state.sessions.len(),
    })
}

#[derive(Debug, Deserialize)]
pub struct ClearCacheRequest {
    #[serde(rename = "type")]
    pub kind: CacheKind,
    #[serde(default)]
    pub types: Option<Vec<String>>,
}

/// Announce a cache invalidation to every connected client.
async fn clear_cache(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ClearCacheRequest>,
) -> ApiResult<(StatusCode, Json<CacheEvent>)> {
    let admin = headers
        .get(ADMIN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_ADMIN);

    let mut event = CacheEvent::stamped(request.kind, admin, Utc::now());
    if let Some(types) = request.types {
        event = event.with_types(types);
    }
    event
        .validate()
        .map_err(|e| ApiError::invalid_input(e.to_string()))?;

    let receivers = state.hub.publish_cache_cleared(&event)?;
    info!(
        kind = %event.kind,
        admin = %event.admin,
        receivers,
        "Cache cleared"
    );
    Ok((StatusCode::ACCEPTED, Json(event)))
}
