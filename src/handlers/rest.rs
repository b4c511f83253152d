//! The single REST handler behind every path under the prefix.

use crate::dispatch::Dispatcher;
use crate::error::AppError;
use crate::extractors::Fields;
use crate::path;
use crate::response::json_response;
use crate::state::AppState;
use axum::{
    extract::{OriginalUri, Query, State},
    http::Method,
    response::Response,
};

pub async fn handle(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<Vec<(String, String)>>,
    Fields(fields): Fields,
) -> Result<Response, AppError> {
    let resource = path::resolve(&state.prefix, uri.path())?;
    tracing::debug!(%method, database = %resource.database, table = %resource.table, "dispatch");
    let reply = Dispatcher::new(&state).dispatch(&method, &resource, &query, &fields).await?;
    json_response(reply.status, &reply.body)
}
