//! Example server: connection settings from `.env`, the environment or `orm.conf`;
//! mounts common routes and the REST routes under `ORM_PREFIX` (default `/orm`).

use orm_rest::{
    common_routes_with_ready, follow_changes, rest_routes, AppState, MySqlStore, Redactor, ServerSettings, Settings,
};
use axum::Router;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("orm_rest=info".parse()?))
        .init();

    let settings = Settings::load()?;
    let server = ServerSettings::from_env();
    let store = MySqlStore::connect_lazy(&settings)?;
    let state = AppState::from_store(store, server.prefix.clone())
        .with_redactor(Redactor::new(&server.sensitive_columns));

    tokio::spawn(follow_changes(state.subscribe(), |event| {
        tracing::debug!(database = %event.database, table = %event.table, kind = ?event.kind, "change")
    }));

    let app = Router::new()
        .merge(common_routes_with_ready(state.clone()))
        .merge(rest_routes(state));

    let listener = TcpListener::bind(&server.listen).await?;
    tracing::info!("listening on {}{}", listener.local_addr()?, server.prefix);
    axum::serve(listener, app).await?;
    Ok(())
}
