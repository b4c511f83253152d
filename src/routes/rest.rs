//! REST routes: every method on every path below the prefix goes to one handler.

use crate::handlers::handle;
use crate::path::normalize_prefix;
use crate::state::AppState;
use axum::{routing::any, Router};
use tower_http::limit::RequestBodyLimitLayer;

/// Largest accepted request body, in bytes.
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

pub fn rest_routes(state: AppState) -> Router {
    let prefix = normalize_prefix(&state.prefix);
    let root = if prefix.is_empty() { "/".to_string() } else { prefix.clone() };
    Router::new()
        .route(&root, any(handle))
        .route(&format!("{}/*path", prefix), any(handle))
        .layer(RequestBodyLimitLayer::new(DEFAULT_BODY_LIMIT))
        .with_state(state)
}
