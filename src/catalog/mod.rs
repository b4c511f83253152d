//! Schema catalog: database/table/column introspection behind a trait so the
//! live MySQL store and an in-memory schema are interchangeable.

mod memory;

pub use memory::MemoryCatalog;

use crate::error::AppError;
use async_trait::async_trait;
use serde::Serialize;

/// Schemas never listed by [`Catalog::list_databases`].
pub const SYSTEM_DATABASES: &[&str] = &[
    "information_schema",
    "mysql",
    "performance_schema",
    "sys",
    "owncloud",
    "roundcubemail",
];

pub fn is_system_database(name: &str) -> bool {
    SYSTEM_DATABASES.iter().any(|s| s.eq_ignore_ascii_case(name))
}

/// Whether a column takes part in the primary key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum KeyRole {
    None,
    Primary,
}

impl KeyRole {
    /// Maps the `COLUMN_KEY` value reported by MySQL (`PRI`, `UNI`, `MUL`, empty).
    pub fn from_column_key(key: &str) -> Self {
        if key.eq_ignore_ascii_case("PRI") {
            KeyRole::Primary
        } else {
            KeyRole::None
        }
    }
}

/// Coarse type used for value coercion and code generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SemanticType {
    Int,
    String,
}

impl SemanticType {
    /// Lookup on the base of a declared type: `int(11) unsigned` -> `int`.
    /// Anything not in the table is a string.
    pub fn from_declared(declared: &str) -> Self {
        let base = declared
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        match base.as_str() {
            "tinyint" | "smallint" | "int" => SemanticType::Int,
            _ => SemanticType::String,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Full declared type, e.g. `varchar(255)` or `int(10) unsigned`.
    pub declared_type: String,
    pub nullable: bool,
    pub key_role: KeyRole,
    pub default_value: Option<String>,
    /// MySQL `EXTRA` flags such as `auto_increment`.
    pub extra: String,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        ColumnDescriptor {
            name: name.into(),
            declared_type: declared_type.into(),
            nullable: true,
            key_role: KeyRole::None,
            default_value: None,
            extra: String::new(),
        }
    }

    pub fn primary(mut self) -> Self {
        self.key_role = KeyRole::Primary;
        self.nullable = false;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.extra = "auto_increment".into();
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn semantic_type(&self) -> SemanticType {
        SemanticType::from_declared(&self.declared_type)
    }

    pub fn is_primary(&self) -> bool {
        self.key_role == KeyRole::Primary
    }

    pub fn is_auto_increment(&self) -> bool {
        self.extra.to_ascii_lowercase().contains("auto_increment")
    }
}

/// Read-only introspection of the live schema. A missing database or table
/// yields an empty list, never an error; errors mean the store itself failed.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Database names, excluding [`SYSTEM_DATABASES`].
    async fn list_databases(&self) -> Result<Vec<String>, AppError>;

    async fn list_tables(&self, database: &str) -> Result<Vec<String>, AppError>;

    /// Columns in catalog order.
    async fn columns(&self, database: &str, table: &str) -> Result<Vec<ColumnDescriptor>, AppError>;
}
