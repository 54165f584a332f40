use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the credential/session store is reachable.
    pub db_healthy: bool,
    /// Whether the session cache answers; the service still works without it.
    pub cache_healthy: bool,
    /// `redis` or `memory`.
    pub cache_backend: &'static str,
}

/// GET /health -- store and cache health.
///
/// 503 when the store is down; a cache outage only degrades the status.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let db_healthy = state.auth.users().health_check().await.is_ok();
    let cache = state.auth.sessions().cache();
    let cache_healthy = cache.is_healthy().await;

    let (code, status) = match (db_healthy, cache_healthy) {
        (true, true) => (StatusCode::OK, "ok"),
        (true, false) => (StatusCode::OK, "degraded"),
        (false, _) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            db_healthy,
            cache_healthy,
            cache_backend: cache.backend_name(),
        }),
    )
}

/// Mount health check routes at the root level.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
