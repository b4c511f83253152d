//! Request dispatcher: picks the operation from path depth and method, runs it
//! against the injected catalog and executor, and shapes the reply.
//!
//! | depth    | method | operation                       |
//! |----------|--------|---------------------------------|
//! | database | GET    | list tables                     |
//! | table    | GET    | collection read (`q`, filters)  |
//! | table    | POST   | upsert from body                |
//! | row      | GET    | point read by primary key       |
//! | row      | POST   | upsert from body and URL key    |
//! | row      | DELETE | delete by primary key           |
//!
//! Anything else is `405` and never touches the database.

use crate::binder::{bind_request_values, RequestFields, RowProjection};
use crate::error::AppError;
use crate::path::{Depth, ResourceDescriptor};
use crate::response::{deleted_body, rows_body, saved_body};
use crate::sql::{self, Filter, ListOptions, OrderBy, Predicate, TableSchema};
use crate::state::AppState;
use crate::store::{ExecOutcome, Row};
use axum::http::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;

/// Query parameters with a fixed meaning on collection reads. Any other
/// parameter named after a column is an exact-match filter.
const RESERVED_PARAMS: &[&str] = &["q", "order", "limit", "offset"];

/// Status and JSON body of a successful request.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
}

impl Reply {
    fn ok(body: Value) -> Self {
        Reply {
            status: StatusCode::OK,
            body,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Saved,
    Deleted,
}

/// Published after every successful save or delete.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub database: String,
    pub table: String,
    pub kind: ChangeKind,
    /// The written projection (redacted), with a `type` field naming the table.
    pub object: Row,
}

pub struct Dispatcher<'a> {
    state: &'a AppState,
}

impl<'a> Dispatcher<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Dispatcher { state }
    }

    pub async fn dispatch(
        &self,
        method: &Method,
        resource: &ResourceDescriptor,
        query: &[(String, String)],
        fields: &RequestFields,
    ) -> Result<Reply, AppError> {
        match (resource.depth(), method) {
            (Depth::Database, &Method::GET) => self.list_tables(resource).await,
            (Depth::Table, &Method::GET) => self.read_collection(resource, query).await,
            (Depth::Table, &Method::POST) => self.save(resource, fields).await,
            (Depth::Row, &Method::GET) => self.read_one(resource).await,
            (Depth::Row, &Method::POST) => self.save(resource, fields).await,
            (Depth::Row, &Method::DELETE) => self.delete(resource).await,
            _ => Err(AppError::MethodNotAllowed),
        }
    }

    async fn list_tables(&self, resource: &ResourceDescriptor) -> Result<Reply, AppError> {
        let tables = self.state.catalog.list_tables(&resource.database).await?;
        if tables.is_empty() {
            return Err(AppError::SchemaNotFound(resource.database.clone()));
        }
        Ok(Reply::ok(Value::from(tables)))
    }

    async fn schema(&self, resource: &ResourceDescriptor) -> Result<TableSchema, AppError> {
        let columns = self.state.catalog.columns(&resource.database, &resource.table).await?;
        TableSchema::new(&resource.database, &resource.table, columns)
    }

    async fn read_collection(
        &self,
        resource: &ResourceDescriptor,
        query: &[(String, String)],
    ) -> Result<Reply, AppError> {
        let schema = self.schema(resource).await?;
        // Redacted columns are not readable, so they are not filterable either.
        let visible = schema.without_columns(|name| self.state.redactor.is_sensitive(name));
        let mut predicate = Predicate::empty();
        let mut options = ListOptions::default();
        for (name, value) in query {
            match name.as_str() {
                "q" if !value.trim().is_empty() => {
                    let filter = Filter::parse(value, &visible)?;
                    predicate = predicate.and(filter.to_predicate(&visible));
                }
                "order" if !value.is_empty() => options.order_by = Some(OrderBy::parse(value, &visible)?),
                "limit" => options.limit = Some(parse_count("limit", value)?),
                "offset" => options.offset = Some(parse_count("offset", value)?),
                n if RESERVED_PARAMS.contains(&n) => {}
                n => match visible.columns.iter().find(|c| c.name == n) {
                    Some(column) => predicate = predicate.and(Predicate::equals(column, value)),
                    None if schema.columns.iter().any(|c| c.name == n) => {
                        return Err(AppError::ColumnNotFound(n.to_string()))
                    }
                    None => tracing::debug!(param = %n, "ignoring query parameter"),
                },
            }
        }
        let statement = sql::select(&schema, predicate, &options);
        let mut rows = self.state.executor.fetch_all(&statement).await?;
        self.state.redactor.redact_rows(&mut rows);
        Ok(Reply::ok(rows_body(rows)))
    }

    async fn read_one(&self, resource: &ResourceDescriptor) -> Result<Reply, AppError> {
        let schema = self.schema(resource).await?;
        let mut projection = schema.projection();
        projection.apply_key_parts(&resource.key_parts)?;
        let statement = sql::select_by_key(&schema, &projection)?;
        let mut rows = self.state.executor.fetch_all(&statement).await?;
        if rows.is_empty() {
            return Err(AppError::NotFound(format!(
                "{}.{} {:?}",
                resource.database, resource.table, resource.key_parts
            )));
        }
        self.state.redactor.redact_rows(&mut rows);
        Ok(Reply::ok(rows_body(rows)))
    }

    /// Table-level and row-level POST. Row-level key parts override body
    /// values for the primary-key columns.
    async fn save(&self, resource: &ResourceDescriptor, fields: &RequestFields) -> Result<Reply, AppError> {
        let columns = self.state.catalog.columns(&resource.database, &resource.table).await?;
        if columns.is_empty() {
            return Err(AppError::NotFound(format!("{}.{}", resource.database, resource.table)));
        }
        let schema = TableSchema::new(&resource.database, &resource.table, columns)?;
        let mut projection = bind_request_values(&schema.columns, fields);
        projection.apply_key_parts(&resource.key_parts)?;
        let statement = sql::upsert(&schema, &projection)?;
        let outcome = self
            .state
            .executor
            .execute(&statement)
            .await
            .map_err(|e| write_failure(e, AppError::SaveFailure))?;
        if outcome.rows_affected == 1 && outcome.id() > -1 {
            projection.set_generated_id(outcome.id());
        }
        tracing::info!(
            database = %resource.database,
            table = %resource.table,
            rows = outcome.rows_affected,
            id = outcome.id(),
            "saved"
        );
        self.announce(resource, ChangeKind::Saved, &projection);
        Ok(Reply::ok(saved_body(outcome.rows_affected, outcome.id())))
    }

    async fn delete(&self, resource: &ResourceDescriptor) -> Result<Reply, AppError> {
        let columns = self.state.catalog.columns(&resource.database, &resource.table).await?;
        if columns.is_empty() {
            return Err(AppError::NotFound(format!("{}.{}", resource.database, resource.table)));
        }
        let schema = TableSchema::new(&resource.database, &resource.table, columns)?;
        let mut projection = schema.projection();
        projection.apply_key_parts(&resource.key_parts)?;
        let statement = sql::delete(&schema, &projection)?;
        let ExecOutcome { rows_affected, .. } = self
            .state
            .executor
            .execute(&statement)
            .await
            .map_err(|e| write_failure(e, AppError::DeleteFailure))?;
        if rows_affected == 0 {
            return Err(AppError::NoRowsAffected);
        }
        tracing::info!(database = %resource.database, table = %resource.table, rows = rows_affected, "deleted");
        self.announce(resource, ChangeKind::Deleted, &projection);
        Ok(Reply::ok(deleted_body(rows_affected)))
    }

    fn announce(&self, resource: &ResourceDescriptor, kind: ChangeKind, projection: &RowProjection) {
        let mut object = projection.to_json_object();
        self.state.redactor.redact_row(&mut object);
        object.insert("type".into(), Value::String(resource.table.clone()));
        self.state.publish(ChangeEvent {
            database: resource.database.clone(),
            table: resource.table.clone(),
            kind,
            object,
        });
    }
}

/// Lost connections keep their own classification; anything else the
/// database rejected becomes the operation's failure.
fn write_failure(err: AppError, wrap: fn(String) -> AppError) -> AppError {
    match err {
        AppError::ConnectionFailure(_) => err,
        other => wrap(other.to_string()),
    }
}

fn parse_count(name: &str, value: &str) -> Result<u32, AppError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| AppError::BadRequest(format!("{} must be a non-negative integer, got {:?}", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_failures_keep_their_kind() {
        let e = write_failure(AppError::ConnectionFailure("gone".into()), AppError::SaveFailure);
        assert!(matches!(e, AppError::ConnectionFailure(_)));
        let e = write_failure(AppError::QueryFailure("dup".into()), AppError::DeleteFailure);
        assert!(matches!(e, AppError::DeleteFailure(_)));
    }

    #[test]
    fn counts_must_be_unsigned() {
        assert_eq!(parse_count("limit", " 25 ").unwrap(), 25);
        assert!(matches!(parse_count("offset", "-1"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn change_event_serializes_kind_lowercase() {
        let event = ChangeEvent {
            database: "shop".into(),
            table: "products".into(),
            kind: ChangeKind::Deleted,
            object: Row::new(),
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["kind"], "deleted");
    }
}
