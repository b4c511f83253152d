//! Offline generator: one Rust module per table, written from the same
//! introspection the REST side uses.
//!
//! Each module carries `DATABASE`, `TABLE`, `COLUMNS` and `PRIMARY_KEY`
//! constants, the column list as `columns()`/`schema()`, and a struct with one
//! field per column (`int` columns as `i64`, everything else as `String`,
//! nullable columns wrapped in `Option`).
//!
//! The struct reads itself from a JSON row (`from_row`), turns itself back into
//! form fields (`to_fields`), exposes its columns by name (`get`/`set`) and
//! talks to any [`Executor`](crate::Executor) through the same statement
//! builders the REST side uses: `save` (upsert, generated id written back),
//! `delete` (by primary key) and `query` (a `q` filter plus an optional
//! order). Generated code depends on `orm_rest` and `serde_json`.

use crate::catalog::{Catalog, ColumnDescriptor, SemanticType};
use crate::error::AppError;
use heck::{ToSnakeCase, ToUpperCamelCase};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Matches every database or every table.
pub const WILDCARD: &str = "*";

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "box", "break", "const", "continue", "crate", "dyn", "else", "enum", "extern", "false",
    "final", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "priv", "pub", "ref",
    "return", "self", "static", "struct", "super", "trait", "true", "try", "type", "typeof", "unsafe", "use",
    "virtual", "where", "while", "yield",
];

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error(transparent)]
    Catalog(#[from] AppError),
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn field_name(column: &str, index: usize) -> String {
    let name = column.to_snake_case();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("column_{}{}", index, if name.is_empty() { String::new() } else { format!("_{}", name) })
    } else if KEYWORDS.contains(&name.as_str()) {
        format!("{}_", name)
    } else {
        name
    }
}

/// One identifier per column. A name already taken gets the column index
/// appended until it is unique.
fn field_names(columns: &[ColumnDescriptor]) -> Vec<String> {
    let mut seen = HashSet::new();
    columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let mut name = field_name(&c.name, i);
            while !seen.insert(name.clone()) {
                name = format!("{}_{}", name, i);
            }
            name
        })
        .collect()
}

fn type_name(table: &str) -> String {
    let name = table.to_upper_camel_case();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("Table{}", name)
    } else {
        name
    }
}

fn rust_type(column: &ColumnDescriptor) -> &'static str {
    match (column.semantic_type(), column.nullable) {
        (SemanticType::Int, false) => "i64",
        (SemanticType::Int, true) => "Option<i64>",
        (SemanticType::String, false) => "String",
        (SemanticType::String, true) => "Option<String>",
    }
}

/// `{out}/{database}/{table}.rs`, lowercased.
pub fn module_path(out: &Path, database: &str, table: &str) -> PathBuf {
    out.join(database.to_lowercase()).join(format!("{}.rs", table.to_lowercase()))
}

/// Source text for one table.
pub fn render(database: &str, table: &str, columns: &[ColumnDescriptor]) -> Result<String, AppError> {
    if columns.is_empty() {
        return Err(AppError::SchemaNotFound(format!("{}.{}", database, table)));
    }
    let ty = type_name(table);
    let fields = field_names(columns);
    let names: Vec<String> = columns.iter().map(|c| format!("{:?}", c.name)).collect();
    let keys: Vec<String> = columns
        .iter()
        .filter(|c| c.is_primary())
        .map(|c| format!("{:?}", c.name))
        .collect();

    // `write!` into a String cannot fail.
    let mut s = String::new();
    let _ = writeln!(s, "//! Generated by orm-gen from `{}`.`{}`. Do not edit.", database, table);
    let _ = writeln!(s);
    let _ = writeln!(s, "use orm_rest::sql::{{self, Filter, ListOptions, OrderBy, Predicate, TableSchema}};");
    let _ = writeln!(
        s,
        "use orm_rest::{{bind_request_values, AppError, ColumnDescriptor, ExecOutcome, Executor, FieldValue, RequestFields}};"
    );
    let _ = writeln!(s);
    let _ = writeln!(s, "pub const DATABASE: &str = {:?};", database);
    let _ = writeln!(s, "pub const TABLE: &str = {:?};", table);
    let _ = writeln!(s, "pub const COLUMNS: &[&str] = &[{}];", names.join(", "));
    let _ = writeln!(s, "pub const PRIMARY_KEY: &[&str] = &[{}];", keys.join(", "));
    let _ = writeln!(s);
    let _ = writeln!(s, "/// Column metadata as introspected when this module was generated.");
    let _ = writeln!(s, "pub fn columns() -> Vec<ColumnDescriptor> {{");
    let _ = writeln!(s, "    vec![");
    for column in columns {
        let mut ctor = format!("ColumnDescriptor::new({:?}, {:?})", column.name, column.declared_type);
        if column.is_primary() {
            ctor.push_str(".primary()");
        }
        if column.is_auto_increment() {
            ctor.push_str(".auto_increment()");
        }
        if !column.nullable && !column.is_primary() {
            ctor.push_str(".not_null()");
        }
        let _ = writeln!(s, "        {},", ctor);
    }
    let _ = writeln!(s, "    ]");
    let _ = writeln!(s, "}}");
    let _ = writeln!(s);
    let _ = writeln!(s, "pub fn schema() -> Result<TableSchema, AppError> {{");
    let _ = writeln!(s, "    TableSchema::new(DATABASE, TABLE, columns())");
    let _ = writeln!(s, "}}");
    let _ = writeln!(s);
    let _ = writeln!(s, "#[derive(Clone, Debug, Default, PartialEq)]");
    let _ = writeln!(s, "pub struct {} {{", ty);
    for (column, field) in columns.iter().zip(&fields) {
        let _ = writeln!(s, "    pub {}: {},", field, rust_type(column));
    }
    let _ = writeln!(s, "}}");
    let _ = writeln!(s);
    let _ = writeln!(s, "impl {} {{", ty);
    let _ = writeln!(s, "    pub fn from_row(row: &serde_json::Map<String, serde_json::Value>) -> Self {{");
    let _ = writeln!(s, "        {} {{", ty);
    for (column, field) in columns.iter().zip(&fields) {
        let read = match column.semantic_type() {
            SemanticType::Int => "int_value",
            SemanticType::String => "text_value",
        };
        let tail = if column.nullable { "" } else { ".unwrap_or_default()" };
        let _ = writeln!(s, "            {}: row.get({:?}).and_then({}){},", field, column.name, read, tail);
    }
    let _ = writeln!(s, "        }}");
    let _ = writeln!(s, "    }}");
    let _ = writeln!(s);
    let _ = writeln!(s, "    /// Form fields for a save. Unset nullable columns are left out.");
    let _ = writeln!(s, "    pub fn to_fields(&self) -> Vec<(&'static str, String)> {{");
    let _ = writeln!(s, "        let mut fields = Vec::new();");
    for (column, field) in columns.iter().zip(&fields) {
        let value = match (column.semantic_type(), column.is_auto_increment()) {
            (SemanticType::Int, true) => "if *v == 0 { String::new() } else { v.to_string() }",
            (SemanticType::Int, false) => "v.to_string()",
            (SemanticType::String, _) => "v.clone()",
        };
        if column.nullable {
            let _ = writeln!(s, "        if let Some(v) = &self.{} {{", field);
            let _ = writeln!(s, "            fields.push(({:?}, {}));", column.name, value);
            let _ = writeln!(s, "        }}");
        } else {
            let _ = writeln!(s, "        let v = &self.{};", field);
            let _ = writeln!(s, "        fields.push(({:?}, {}));", column.name, value);
        }
    }
    let _ = writeln!(s, "        fields");
    let _ = writeln!(s, "    }}");
    render_accessors(&mut s, columns, &fields);
    render_persistence(&mut s, columns, &fields);
    let _ = writeln!(s, "}}");
    let _ = writeln!(s);
    let _ = writeln!(s, "#[allow(dead_code)]");
    let _ = writeln!(s, "fn int_value(v: &serde_json::Value) -> Option<i64> {{");
    let _ = writeln!(s, "    v.as_i64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))");
    let _ = writeln!(s, "}}");
    let _ = writeln!(s);
    let _ = writeln!(s, "#[allow(dead_code)]");
    let _ = writeln!(s, "fn text_value(v: &serde_json::Value) -> Option<String> {{");
    let _ = writeln!(s, "    match v {{");
    let _ = writeln!(s, "        serde_json::Value::Null => None,");
    let _ = writeln!(s, "        serde_json::Value::String(s) => Some(s.clone()),");
    let _ = writeln!(s, "        other => Some(other.to_string()),");
    let _ = writeln!(s, "    }}");
    let _ = writeln!(s, "}}");
    let _ = writeln!(s);
    let _ = writeln!(s, "#[allow(dead_code)]");
    let _ = writeln!(s, "fn parse_int(column: &str, text: &str) -> Result<i64, AppError> {{");
    let _ = writeln!(s, "    text.trim()");
    let _ = writeln!(s, "        .parse()");
    let _ = writeln!(
        s,
        "        .map_err(|_| AppError::BadRequest(format!(\"{{}} expects an integer, got {{:?}}\", column, text)))"
    );
    let _ = writeln!(s, "}}");
    let _ = writeln!(s);
    let _ = writeln!(s, "#[allow(dead_code)]");
    let _ = writeln!(s, "fn required<'a>(column: &str, value: Option<&'a str>) -> Result<&'a str, AppError> {{");
    let _ = writeln!(
        s,
        "    value.ok_or_else(|| AppError::BadRequest(format!(\"{{}} cannot be null\", column)))"
    );
    let _ = writeln!(s, "}}");
    Ok(s)
}

/// `get`/`set` by column name, values as wire text.
fn render_accessors(s: &mut String, columns: &[ColumnDescriptor], fields: &[String]) {
    let _ = writeln!(s);
    let _ = writeln!(s, "    /// Column value as text; `None` for NULL or an unknown column.");
    let _ = writeln!(s, "    pub fn get(&self, column: &str) -> Option<String> {{");
    let _ = writeln!(s, "        match column {{");
    for (column, field) in columns.iter().zip(fields) {
        let read = match (column.semantic_type(), column.nullable) {
            (SemanticType::Int, false) => format!("Some(self.{}.to_string())", field),
            (SemanticType::Int, true) => format!("self.{}.map(|v| v.to_string())", field),
            (SemanticType::String, false) => format!("Some(self.{}.clone())", field),
            (SemanticType::String, true) => format!("self.{}.clone()", field),
        };
        let _ = writeln!(s, "            {:?} => {},", column.name, read);
    }
    let _ = writeln!(s, "            _ => None,");
    let _ = writeln!(s, "        }}");
    let _ = writeln!(s, "    }}");
    let _ = writeln!(s);
    let _ = writeln!(s, "    /// Sets a column from text; `None` is NULL.");
    let _ = writeln!(s, "    pub fn set(&mut self, column: &str, value: Option<&str>) -> Result<(), AppError> {{");
    let _ = writeln!(s, "        match column {{");
    for (column, field) in columns.iter().zip(fields) {
        let write = match (column.semantic_type(), column.nullable) {
            (SemanticType::Int, false) => "parse_int(column, required(column, value)?)?",
            (SemanticType::Int, true) => "value.map(|v| parse_int(column, v)).transpose()?",
            (SemanticType::String, false) => "required(column, value)?.to_string()",
            (SemanticType::String, true) => "value.map(str::to_string)",
        };
        let _ = writeln!(s, "            {:?} => self.{} = {},", column.name, field, write);
    }
    let _ = writeln!(s, "            _ => return Err(AppError::ColumnNotFound(column.to_string())),");
    let _ = writeln!(s, "        }}");
    let _ = writeln!(s, "        Ok(())");
    let _ = writeln!(s, "    }}");
}

/// `save`, `delete` and `query` over an executor.
fn render_persistence(s: &mut String, columns: &[ColumnDescriptor], fields: &[String]) {
    let _ = writeln!(s);
    let _ = writeln!(s, "    /// Inserts or updates this row. An id generated by the database is");
    let _ = writeln!(s, "    /// written back into the int primary-key fields.");
    let _ = writeln!(s, "    pub async fn save(&mut self, db: &dyn Executor) -> Result<ExecOutcome, AppError> {{");
    let _ = writeln!(s, "        let schema = schema()?;");
    let _ = writeln!(s, "        let fields: RequestFields = self");
    let _ = writeln!(s, "            .to_fields()");
    let _ = writeln!(s, "            .into_iter()");
    let _ = writeln!(s, "            .map(|(name, value)| (name.to_string(), FieldValue::Text(value)))");
    let _ = writeln!(s, "            .collect();");
    let _ = writeln!(s, "        let projection = bind_request_values(&schema.columns, &fields);");
    let _ = writeln!(s, "        let outcome = db.execute(&sql::upsert(&schema, &projection)?).await?;");
    let generated: Vec<(&ColumnDescriptor, &String)> = columns
        .iter()
        .zip(fields)
        .filter(|(c, _)| c.is_primary() && c.semantic_type() == SemanticType::Int)
        .collect();
    if !generated.is_empty() {
        let _ = writeln!(s, "        if outcome.rows_affected == 1 && outcome.id() > -1 {{");
        for (column, field) in generated {
            let value = if column.nullable { "Some(outcome.id())" } else { "outcome.id()" };
            let _ = writeln!(s, "            self.{} = {};", field, value);
        }
        let _ = writeln!(s, "        }}");
    }
    let _ = writeln!(s, "        Ok(outcome)");
    let _ = writeln!(s, "    }}");
    let _ = writeln!(s);
    let _ = writeln!(s, "    /// Deletes this row by primary key. Deleting nothing is `NoRowsAffected`.");
    let _ = writeln!(s, "    pub async fn delete(&self, db: &dyn Executor) -> Result<u64, AppError> {{");
    let _ = writeln!(s, "        let schema = schema()?;");
    let _ = writeln!(s, "        let mut projection = schema.projection();");
    let _ = writeln!(
        s,
        "        let key: Vec<String> = PRIMARY_KEY.iter().map(|c| self.get(c).unwrap_or_default()).collect();"
    );
    let _ = writeln!(s, "        projection.apply_key_parts(&key)?;");
    let _ = writeln!(s, "        let outcome = db.execute(&sql::delete(&schema, &projection)?).await?;");
    let _ = writeln!(s, "        if outcome.rows_affected == 0 {{");
    let _ = writeln!(s, "            return Err(AppError::NoRowsAffected);");
    let _ = writeln!(s, "        }}");
    let _ = writeln!(s, "        Ok(outcome.rows_affected)");
    let _ = writeln!(s, "    }}");
    let _ = writeln!(s);
    let _ = writeln!(s, "    /// Rows matching `filter` (`q` syntax, empty for all), ordered by `order`");
    let _ = writeln!(s, "    /// (`name` or `-name`, empty for none).");
    let _ = writeln!(
        s,
        "    pub async fn query(db: &dyn Executor, filter: &str, order: &str) -> Result<Vec<Self>, AppError> {{"
    );
    let _ = writeln!(s, "        let schema = schema()?;");
    let _ = writeln!(s, "        let predicate = if filter.trim().is_empty() {{");
    let _ = writeln!(s, "            Predicate::empty()");
    let _ = writeln!(s, "        }} else {{");
    let _ = writeln!(s, "            Filter::parse(filter, &schema)?.to_predicate(&schema)");
    let _ = writeln!(s, "        }};");
    let _ = writeln!(s, "        let options = ListOptions {{");
    let _ = writeln!(
        s,
        "            order_by: if order.is_empty() {{ None }} else {{ Some(OrderBy::parse(order, &schema)?) }},"
    );
    let _ = writeln!(s, "            ..ListOptions::default()");
    let _ = writeln!(s, "        }};");
    let _ = writeln!(s, "        let rows = db.fetch_all(&sql::select(&schema, predicate, &options)).await?;");
    let _ = writeln!(s, "        Ok(rows.iter().map(Self::from_row).collect())");
    let _ = writeln!(s, "    }}");
}

async fn expand(catalog: &dyn Catalog, database: &str, table: &str) -> Result<Vec<(String, String)>, AppError> {
    let databases = if database == WILDCARD {
        catalog.list_databases().await?
    } else {
        vec![database.to_string()]
    };
    let mut out = Vec::new();
    for db in databases {
        if table == WILDCARD {
            for t in catalog.list_tables(&db).await? {
                out.push((db.clone(), t));
            }
        } else {
            out.push((db, table.to_string()));
        }
    }
    Ok(out)
}

/// Writes one module per matching table under `out`. `database` and `table`
/// may be [`WILDCARD`]. Returns the files written, in catalog order.
pub async fn generate(
    catalog: &dyn Catalog,
    database: &str,
    table: &str,
    out: &Path,
) -> Result<Vec<PathBuf>, GenerateError> {
    let mut written = Vec::new();
    for (db, t) in expand(catalog, database, table).await? {
        let columns = catalog.columns(&db, &t).await?;
        let source = match render(&db, &t, &columns) {
            Ok(s) => s,
            Err(AppError::SchemaNotFound(name)) if table == WILDCARD => {
                tracing::warn!(table = %name, "no columns, skipping");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let path = module_path(out, &db, &t);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| GenerateError::Io {
                path: dir.display().to_string(),
                source,
            })?;
        }
        std::fs::write(&path, source).map_err(|source| GenerateError::Io {
            path: path.display().to_string(),
            source,
        })?;
        tracing::info!(path = %path.display(), "generated");
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;

    fn products() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::new("id", "int(11)").primary().auto_increment().not_null(),
            ColumnDescriptor::new("ProductName", "varchar(40)").not_null(),
            ColumnDescriptor::new("stock", "smallint(6)"),
            ColumnDescriptor::new("type", "varchar(10)"),
        ]
    }

    #[test]
    fn renders_struct_and_constants() {
        let src = render("Shop", "order_lines", &products()).unwrap();
        assert!(src.contains("pub const DATABASE: &str = \"Shop\";"));
        assert!(src.contains("pub const COLUMNS: &[&str] = &[\"id\", \"ProductName\", \"stock\", \"type\"];"));
        assert!(src.contains("pub const PRIMARY_KEY: &[&str] = &[\"id\"];"));
        assert!(src.contains("pub struct OrderLines {"));
        assert!(src.contains("    pub id: i64,"));
        assert!(src.contains("    pub product_name: String,"));
        assert!(src.contains("    pub stock: Option<i64>,"));
        assert!(src.contains("    pub type_: Option<String>,"));
    }

    #[test]
    fn auto_increment_zero_is_sent_empty() {
        let src = render("shop", "products", &products()).unwrap();
        assert!(src.contains("fields.push((\"id\", if *v == 0 { String::new() } else { v.to_string() }));"));
        assert!(src.contains("if let Some(v) = &self.stock {"));
    }

    #[test]
    fn columns_and_schema_are_rebuilt() {
        let src = render("shop", "products", &products()).unwrap();
        assert!(src.contains("use orm_rest::sql::{self, Filter, ListOptions, OrderBy, Predicate, TableSchema};"));
        assert!(src.contains("        ColumnDescriptor::new(\"id\", \"int(11)\").primary().auto_increment(),"));
        assert!(src.contains("        ColumnDescriptor::new(\"ProductName\", \"varchar(40)\").not_null(),"));
        assert!(src.contains("        ColumnDescriptor::new(\"stock\", \"smallint(6)\"),"));
        assert!(src.contains("    TableSchema::new(DATABASE, TABLE, columns())"));
    }

    #[test]
    fn accessors_follow_column_types() {
        let src = render("shop", "products", &products()).unwrap();
        assert!(src.contains("            \"id\" => Some(self.id.to_string()),"));
        assert!(src.contains("            \"stock\" => self.stock.map(|v| v.to_string()),"));
        assert!(src.contains("            \"type\" => self.type_.clone(),"));
        assert!(src.contains("            \"id\" => self.id = parse_int(column, required(column, value)?)?,"));
        assert!(src.contains("            \"ProductName\" => self.product_name = required(column, value)?.to_string(),"));
        assert!(src.contains("            \"stock\" => self.stock = value.map(|v| parse_int(column, v)).transpose()?,"));
        assert!(src.contains("            _ => return Err(AppError::ColumnNotFound(column.to_string())),"));
    }

    #[test]
    fn persistence_goes_through_the_statement_builders() {
        let src = render("shop", "products", &products()).unwrap();
        assert!(src.contains("pub async fn save(&mut self, db: &dyn Executor) -> Result<ExecOutcome, AppError> {"));
        assert!(src.contains("let outcome = db.execute(&sql::upsert(&schema, &projection)?).await?;"));
        assert!(src.contains("            self.id = outcome.id();"));
        assert!(src.contains("pub async fn delete(&self, db: &dyn Executor) -> Result<u64, AppError> {"));
        assert!(src.contains("let outcome = db.execute(&sql::delete(&schema, &projection)?).await?;"));
        assert!(src.contains("return Err(AppError::NoRowsAffected);"));
        assert!(src.contains("pub async fn query(db: &dyn Executor, filter: &str, order: &str)"));
        assert!(src.contains("let rows = db.fetch_all(&sql::select(&schema, predicate, &options)).await?;"));
    }

    #[test]
    fn string_keys_get_no_id_write_back() {
        let cols = vec![
            ColumnDescriptor::new("path", "varchar(255)").primary(),
            ColumnDescriptor::new("size", "int(11)"),
        ];
        let src = render("docs", "files", &cols).unwrap();
        assert!(src.contains("pub async fn save("));
        assert!(!src.contains("outcome.id() > -1"));
    }

    #[test]
    fn colliding_field_names_are_suffixed() {
        let cols = vec![
            ColumnDescriptor::new("ProductName", "varchar(40)"),
            ColumnDescriptor::new("product_name", "varchar(40)"),
            ColumnDescriptor::new("product-name", "varchar(40)"),
        ];
        assert_eq!(field_names(&cols), vec!["product_name", "product_name_1", "product_name_2"]);
        let src = render("shop", "labels", &cols).unwrap();
        assert!(src.contains("    pub product_name_1: Option<String>,"));
        assert!(src.contains("            \"product_name\" => self.product_name_1.clone(),"));
    }

    #[test]
    fn odd_names_still_make_identifiers() {
        assert_eq!(field_name("2nd", 3), "column_3_2nd");
        assert_eq!(field_name("%%", 0), "column_0");
        assert_eq!(type_name("2024_sales"), "Table2024Sales");
    }

    #[test]
    fn empty_table_does_not_render() {
        assert!(matches!(render("shop", "nope", &[]), Err(AppError::SchemaNotFound(_))));
    }

    #[test]
    fn paths_are_lowercased() {
        let p = module_path(Path::new("gen"), "Shop", "Products");
        assert_eq!(p, Path::new("gen").join("shop").join("products.rs"));
    }

    #[tokio::test]
    async fn wildcard_writes_every_table() {
        let catalog = MemoryCatalog::new()
            .with_table("shop", "products", products())
            .with_table("shop", "empty", vec![])
            .with_table("crm", "people", vec![ColumnDescriptor::new("id", "int").primary()]);
        let out = std::env::temp_dir().join(format!("orm-gen-test-{}", std::process::id()));
        let written = generate(&catalog, WILDCARD, WILDCARD, &out).await.unwrap();
        assert_eq!(written.len(), 2);
        assert!(written.contains(&out.join("shop").join("products.rs")));
        assert!(written.contains(&out.join("crm").join("people.rs")));
        let text = std::fs::read_to_string(out.join("crm").join("people.rs")).unwrap();
        assert!(text.contains("pub struct People {"));
        let _ = std::fs::remove_dir_all(&out);
    }
}
