use super::{is_system_database, Catalog, ColumnDescriptor};
use crate::error::AppError;
use async_trait::async_trait;

#[derive(Clone, Debug)]
struct MemoryTable {
    database: String,
    name: String,
    columns: Vec<ColumnDescriptor>,
}

/// Fixed schema held in memory. Tables keep insertion order.
#[derive(Clone, Debug, Default)]
pub struct MemoryCatalog {
    tables: Vec<MemoryTable>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        MemoryCatalog::default()
    }

    /// Adds (or replaces) a table definition.
    pub fn with_table(mut self, database: &str, table: &str, columns: Vec<ColumnDescriptor>) -> Self {
        self.tables.retain(|t| !(t.database == database && t.name == table));
        self.tables.push(MemoryTable {
            database: database.to_string(),
            name: table.to_string(),
            columns,
        });
        self
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn list_databases(&self) -> Result<Vec<String>, AppError> {
        let mut out: Vec<String> = Vec::new();
        for t in &self.tables {
            if !is_system_database(&t.database) && !out.contains(&t.database) {
                out.push(t.database.clone());
            }
        }
        Ok(out)
    }

    async fn list_tables(&self, database: &str) -> Result<Vec<String>, AppError> {
        Ok(self
            .tables
            .iter()
            .filter(|t| t.database == database)
            .map(|t| t.name.clone())
            .collect())
    }

    async fn columns(&self, database: &str, table: &str) -> Result<Vec<ColumnDescriptor>, AppError> {
        Ok(self
            .tables
            .iter()
            .find(|t| t.database == database && t.name == table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }
}
