//! Service routes next to the REST tree: liveness, database readiness, build.

use crate::error::AppError;
use crate::response::json_response;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::Response, routing::get, Router};
use serde_json::json;

async fn health() -> Result<Response, AppError> {
    json_response(StatusCode::OK, &json!({ "status": "ok" }))
}

/// 200 once the executor answers a ping, 503 while it does not. The body
/// also reports the REST prefix and how many change subscribers are attached.
async fn ready(State(state): State<AppState>) -> Result<Response, AppError> {
    let (status, database) = match state.executor.ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::warn!(error = %e, "database not reachable");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };
    let body = json!({
        "status": if status == StatusCode::OK { "ok" } else { "degraded" },
        "database": database,
        "prefix": state.prefix,
        "subscribers": state.events.receiver_count(),
    });
    json_response(status, &body)
}

async fn version() -> Result<Response, AppError> {
    json_response(
        StatusCode::OK,
        &json!({ "name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION") }),
    )
}

/// GET /health, GET /version.
pub fn common_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
}

/// [`common_routes`] plus GET /ready.
pub fn common_routes_with_ready(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version))
        .with_state(state)
}
