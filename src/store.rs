//! Statement execution and live-schema introspection against MySQL.

use crate::catalog::{is_system_database, Catalog, ColumnDescriptor, KeyRole};
use crate::error::AppError;
use crate::settings::Settings;
use crate::sql::params::bind_all;
use crate::sql::Statement;
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use std::time::Duration;

/// One result row, keyed by column name in select order.
pub type Row = Map<String, Value>;

/// Result of a write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// `None` when no auto-increment value was generated.
    pub last_insert_id: Option<i64>,
}

impl ExecOutcome {
    /// Last insert id on the wire: `-1` when unavailable.
    pub fn id(&self) -> i64 {
        self.last_insert_id.unwrap_or(-1)
    }
}

/// Runs statements. Each call is one autonomous statement; no transaction
/// spans calls.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<Row>, AppError>;

    async fn execute(&self, statement: &Statement) -> Result<ExecOutcome, AppError>;

    /// Cheap liveness check for readiness probes.
    async fn ping(&self) -> Result<(), AppError>;
}

/// Pool-backed store. Connections are taken from the pool per statement.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlStore { pool }
    }

    /// Lazily connecting pool: up to 50 connections, none kept idle, one
    /// second lifetime.
    pub fn connect_lazy(settings: &Settings) -> Result<Self, AppError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(50)
            .min_connections(0)
            .idle_timeout(Some(Duration::from_secs(1)))
            .max_lifetime(Some(Duration::from_secs(1)))
            .connect_lazy(&settings.database_url())?;
        Ok(MySqlStore { pool })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

#[async_trait]
impl Executor for MySqlStore {
    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<Row>, AppError> {
        tracing::debug!(sql = %statement.sql, params = ?statement.params, "query");
        let rows = bind_all(sqlx::query(&statement.sql), &statement.params)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn execute(&self, statement: &Statement) -> Result<ExecOutcome, AppError> {
        tracing::debug!(sql = %statement.sql, params = ?statement.params, "execute");
        let result = bind_all(sqlx::query(&statement.sql), &statement.params)
            .execute(&self.pool)
            .await?;
        let id = result.last_insert_id();
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: if id == 0 { None } else { i64::try_from(id).ok() },
        })
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Catalog for MySqlStore {
    async fn list_databases(&self) -> Result<Vec<String>, AppError> {
        let names: Vec<(String,)> = sqlx::query_as(
            "SELECT CAST(SCHEMA_NAME AS CHAR) FROM information_schema.SCHEMATA ORDER BY SCHEMA_NAME",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names
            .into_iter()
            .map(|(n,)| n)
            .filter(|n| !is_system_database(n))
            .collect())
    }

    async fn list_tables(&self, database: &str) -> Result<Vec<String>, AppError> {
        let names: Vec<(String,)> = sqlx::query_as(
            "SELECT CAST(TABLE_NAME AS CHAR) FROM information_schema.TABLES WHERE TABLE_SCHEMA = ? ORDER BY TABLE_NAME",
        )
        .bind(database)
        .fetch_all(&self.pool)
        .await?;
        Ok(names.into_iter().map(|(n,)| n).collect())
    }

    async fn columns(&self, database: &str, table: &str) -> Result<Vec<ColumnDescriptor>, AppError> {
        let rows: Vec<(String, String, String, String, Option<String>, String)> = sqlx::query_as(
            r#"
            SELECT CAST(COLUMN_NAME AS CHAR),
                   CAST(COLUMN_TYPE AS CHAR),
                   CAST(IS_NULLABLE AS CHAR),
                   CAST(COLUMN_KEY AS CHAR),
                   CAST(COLUMN_DEFAULT AS CHAR),
                   CAST(EXTRA AS CHAR)
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
            "#,
        )
        .bind(database)
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(name, declared_type, nullable, key, default_value, extra)| ColumnDescriptor {
                name,
                declared_type,
                nullable: nullable.eq_ignore_ascii_case("YES"),
                key_role: KeyRole::from_column_key(&key),
                default_value,
                extra,
            })
            .collect())
    }
}

fn row_to_json(row: &MySqlRow) -> Row {
    use sqlx::Column;
    use sqlx::Row as _;
    let mut map = Map::new();
    for (idx, col) in row.columns().iter().enumerate() {
        map.insert(col.name().to_string(), cell_to_value(row, idx));
    }
    map
}

fn cell_to_value(row: &MySqlRow, idx: usize) -> Value {
    use sqlx::{Row as _, ValueRef};
    match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Err(_) => return Value::Null,
        Ok(_) => {}
    }
    if let Ok(n) = row.try_get::<i64, _>(idx) {
        return Value::Number(n.into());
    }
    if let Ok(n) = row.try_get::<u64, _>(idx) {
        return Value::Number(n.into());
    }
    if let Ok(n) = row.try_get::<f64, _>(idx) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(n) = row.try_get::<f32, _>(idx) {
        if let Some(n) = serde_json::Number::from_f64(f64::from(n)) {
            return Value::Number(n);
        }
    }
    if let Ok(d) = row.try_get::<chrono::NaiveDateTime, _>(idx) {
        return Value::String(d.format("%Y-%m-%d %H:%M:%S").to_string());
    }
    if let Ok(d) = row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx) {
        return Value::String(d.format("%Y-%m-%d %H:%M:%S").to_string());
    }
    if let Ok(d) = row.try_get::<chrono::NaiveDate, _>(idx) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(t) = row.try_get::<chrono::NaiveTime, _>(idx) {
        return Value::String(t.format("%H:%M:%S").to_string());
    }
    if let Ok(s) = row.try_get::<String, _>(idx) {
        return Value::String(s);
    }
    if let Ok(b) = row.try_get::<Vec<u8>, _>(idx) {
        return Value::String(String::from_utf8_lossy(&b).into_owned());
    }
    // DECIMAL and friends travel as text in the binary protocol.
    if let Ok(s) = row.try_get_unchecked::<String, _>(idx) {
        return Value::String(s);
    }
    tracing::debug!(column = idx, "undecodable cell, returning null");
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_insert_id_is_minus_one() {
        let none = ExecOutcome {
            rows_affected: 1,
            last_insert_id: None,
        };
        assert_eq!(none.id(), -1);
        let some = ExecOutcome {
            rows_affected: 1,
            last_insert_id: Some(12),
        };
        assert_eq!(some.id(), 12);
    }
}
