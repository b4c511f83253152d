//! Builds parameterized SELECT, upsert and DELETE statements from a table's
//! introspected columns and a row projection.

use crate::binder::{BoundValue, RowProjection};
use crate::catalog::{ColumnDescriptor, SemanticType};
use crate::error::AppError;
use crate::sanitize::{allow, qualified, quote_ident};

/// Upper bound for `limit` on collection reads.
pub const MAX_LIMIT: u32 = 1000;

/// The only unit ever executed: SQL text with `?` placeholders and the
/// values bound to them, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<BoundValue>,
}

/// A table whose name and columns came back from the catalog, so its
/// identifiers are safe to interpolate.
#[derive(Clone, Debug)]
pub struct TableSchema {
    pub database: String,
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    /// Fails with `SchemaNotFound` when introspection found no columns.
    pub fn new(database: &str, table: &str, columns: Vec<ColumnDescriptor>) -> Result<Self, AppError> {
        if columns.is_empty() {
            return Err(AppError::SchemaNotFound(format!("{}.{}", database, table)));
        }
        Ok(TableSchema {
            database: database.to_string(),
            table: table.to_string(),
            columns,
        })
    }

    pub fn qualified(&self) -> String {
        qualified(&self.database, &self.table)
    }

    /// Column by name, or `ColumnNotFound`.
    pub fn column(&self, name: &str) -> Result<&ColumnDescriptor, AppError> {
        allow(name, self.columns.iter().map(|c| c.name.as_str()))?;
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| AppError::ColumnNotFound(name.to_string()))
    }

    pub fn projection(&self) -> RowProjection {
        RowProjection::new(&self.columns)
    }

    /// The same table without the columns `hidden` matches. Filters and
    /// ordering resolved against it cannot name those columns.
    pub fn without_columns<F>(&self, hidden: F) -> TableSchema
    where
        F: Fn(&str) -> bool,
    {
        TableSchema {
            database: self.database.clone(),
            table: self.table.clone(),
            columns: self.columns.iter().filter(|c| !hidden(&c.name)).cloned().collect(),
        }
    }
}

/// A `WHERE` body with its bound values. Empty means "no predicate".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Predicate {
    pub sql: String,
    pub params: Vec<BoundValue>,
    compound: bool,
}

impl Predicate {
    pub fn empty() -> Self {
        Predicate::default()
    }

    pub(crate) fn from_parts(sql: String, params: Vec<BoundValue>, compound: bool) -> Self {
        Predicate { sql, params, compound }
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// `column = ?`, with the value typed for the column.
    pub fn equals(column: &ColumnDescriptor, raw: &str) -> Self {
        Predicate {
            sql: format!("{} = ?", quote_ident(&column.name)),
            params: vec![typed_value(column, raw)],
            compound: false,
        }
    }

    pub fn and(self, other: Predicate) -> Predicate {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        let sql = format!("{} AND {}", self.grouped(), other.grouped());
        let mut params = self.params;
        params.extend(other.params);
        Predicate { sql, params, compound: true }
    }

    fn grouped(&self) -> String {
        if self.compound {
            format!("({})", self.sql)
        } else {
            self.sql.clone()
        }
    }
}

/// Integer for int columns when the text parses, text otherwise.
pub(crate) fn typed_value(column: &ColumnDescriptor, raw: &str) -> BoundValue {
    if column.semantic_type() == SemanticType::Int {
        if let Ok(n) = raw.trim().parse::<i64>() {
            return BoundValue::Integer(n);
        }
    }
    BoundValue::Text(raw.to_string())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

impl OrderBy {
    /// `name` ascending, `-name` descending. The column must exist.
    pub fn parse(spec: &str, schema: &TableSchema) -> Result<Self, AppError> {
        let (name, descending) = match spec.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (spec, false),
        };
        let column = schema.column(name)?;
        Ok(OrderBy {
            column: column.name.clone(),
            descending,
        })
    }
}

/// Ordering and paging for collection reads.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub order_by: Option<OrderBy>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// `SELECT * FROM db.table [WHERE ...] [ORDER BY ...] [LIMIT ...] [OFFSET ...]`.
pub fn select(schema: &TableSchema, predicate: Predicate, options: &ListOptions) -> Statement {
    let mut sql = format!("SELECT * FROM {}", schema.qualified());
    if !predicate.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&predicate.sql);
    }
    if let Some(order) = &options.order_by {
        sql.push_str(&format!(
            " ORDER BY {}{}",
            quote_ident(&order.column),
            if order.descending { " DESC" } else { "" }
        ));
    }
    match (options.limit, options.offset) {
        (Some(limit), offset) => {
            sql.push_str(&format!(" LIMIT {}", limit.min(MAX_LIMIT)));
            if let Some(offset) = offset {
                sql.push_str(&format!(" OFFSET {}", offset));
            }
        }
        // MySQL has no OFFSET without LIMIT.
        (None, Some(offset)) => sql.push_str(&format!(" LIMIT 18446744073709551615 OFFSET {}", offset)),
        (None, None) => {}
    }
    Statement {
        sql,
        params: predicate.params,
    }
}

/// `pk1 = ? AND pk2 = ?` over every primary-key column, in column order.
/// Empty when the table has no primary key. Fails when a primary column has
/// no usable value.
pub fn primary_key_predicate(projection: &RowProjection) -> Result<Predicate, AppError> {
    let mut parts = Vec::new();
    let mut params = Vec::new();
    for (column, value) in projection.primary() {
        match value {
            BoundValue::Absent | BoundValue::Null => {
                return Err(AppError::BuildFailure(format!("no value for primary key column {}", column.name)));
            }
            v if v.is_empty_text() => {
                return Err(AppError::BuildFailure(format!("no value for primary key column {}", column.name)));
            }
            v => {
                parts.push(format!("{} = ?", quote_ident(&column.name)));
                params.push(v.clone());
            }
        }
    }
    let compound = parts.len() > 1;
    Ok(Predicate::from_parts(parts.join(" AND "), params, compound))
}

fn bounded_key_predicate(projection: &RowProjection) -> Result<Predicate, AppError> {
    let predicate = primary_key_predicate(projection)?;
    if predicate.is_empty() {
        return Err(AppError::BuildFailure("table has no primary key".into()));
    }
    Ok(predicate)
}

/// Point read by primary key.
pub fn select_by_key(schema: &TableSchema, projection: &RowProjection) -> Result<Statement, AppError> {
    let predicate = bounded_key_predicate(projection)?;
    Ok(select(schema, predicate, &ListOptions::default()))
}

/// `INSERT ... ON DUPLICATE KEY UPDATE ...` over every present column. An int
/// column submitted as empty text is left out of both lists so
/// auto-increment can assign it. Update values are bound again rather than
/// referenced by position.
pub fn upsert(schema: &TableSchema, projection: &RowProjection) -> Result<Statement, AppError> {
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    let mut assignments = Vec::new();
    let mut insert_params = Vec::new();
    for (column, value) in projection.iter() {
        if value.is_absent() {
            continue;
        }
        if column.semantic_type() == SemanticType::Int && value.is_empty_text() {
            continue;
        }
        let q = quote_ident(&column.name);
        assignments.push(format!("{} = ?", q));
        cols.push(q);
        placeholders.push("?");
        insert_params.push(value.clone());
    }
    if cols.is_empty() {
        return Err(AppError::BuildFailure(format!("nothing to save in {}", schema.table)));
    }
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON DUPLICATE KEY UPDATE {}",
        schema.qualified(),
        cols.join(", "),
        placeholders.join(", "),
        assignments.join(", ")
    );
    let mut params = insert_params.clone();
    params.extend(insert_params);
    Ok(Statement { sql, params })
}

/// DELETE by primary key.
pub fn delete(schema: &TableSchema, projection: &RowProjection) -> Result<Statement, AppError> {
    let predicate = bounded_key_predicate(projection)?;
    Ok(Statement {
        sql: format!("DELETE FROM {} WHERE {}", schema.qualified(), predicate.sql),
        params: predicate.params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::{bind_request_values, FieldValue, RequestFields};

    fn products() -> TableSchema {
        TableSchema::new(
            "shop",
            "products",
            vec![
                ColumnDescriptor::new("id", "int(11)").primary().auto_increment(),
                ColumnDescriptor::new("name", "varchar(40)"),
                ColumnDescriptor::new("price", "decimal(10,2)"),
            ],
        )
        .unwrap()
    }

    fn order_items() -> TableSchema {
        TableSchema::new(
            "shop",
            "order_items",
            vec![
                ColumnDescriptor::new("order_id", "int(11)").primary(),
                ColumnDescriptor::new("item_id", "int(11)").primary(),
                ColumnDescriptor::new("qty", "int(11)"),
            ],
        )
        .unwrap()
    }

    fn log_table() -> TableSchema {
        TableSchema::new("shop", "log", vec![ColumnDescriptor::new("line", "text")]).unwrap()
    }

    fn fields(pairs: &[(&str, &str)]) -> RequestFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::Text(v.to_string())))
            .collect()
    }

    #[test]
    fn empty_columns_mean_schema_not_found() {
        assert!(matches!(TableSchema::new("shop", "nope", vec![]), Err(AppError::SchemaNotFound(_))));
    }

    #[test]
    fn collection_select_without_filter() {
        let s = select(&products(), Predicate::empty(), &ListOptions::default());
        assert_eq!(s.sql, "SELECT * FROM `shop`.`products`");
        assert!(s.params.is_empty());
    }

    #[test]
    fn collection_select_with_order_and_paging() {
        let schema = products();
        let options = ListOptions {
            order_by: Some(OrderBy::parse("-price", &schema).unwrap()),
            limit: Some(5000),
            offset: Some(10),
        };
        let name = schema.column("name").unwrap().clone();
        let s = select(&schema, Predicate::equals(&name, "Widget"), &options);
        assert_eq!(
            s.sql,
            "SELECT * FROM `shop`.`products` WHERE `name` = ? ORDER BY `price` DESC LIMIT 1000 OFFSET 10"
        );
        assert_eq!(s.params, vec![BoundValue::Text("Widget".into())]);
    }

    #[test]
    fn order_by_unknown_column_is_rejected() {
        assert!(matches!(OrderBy::parse("secret", &products()), Err(AppError::ColumnNotFound(_))));
    }

    #[test]
    fn composite_key_predicate_binds_every_part() {
        let schema = order_items();
        let mut p = schema.projection();
        p.apply_key_parts(&["5".into(), "3".into()]).unwrap();
        let s = select_by_key(&schema, &p).unwrap();
        assert_eq!(s.sql, "SELECT * FROM `shop`.`order_items` WHERE `order_id` = ? AND `item_id` = ?");
        assert_eq!(s.params, vec![BoundValue::Integer(5), BoundValue::Integer(3)]);
    }

    #[test]
    fn table_without_primary_key_has_empty_predicate_and_rejects_point_ops() {
        let schema = log_table();
        let p = schema.projection();
        assert!(primary_key_predicate(&p).unwrap().is_empty());
        assert!(matches!(select_by_key(&schema, &p), Err(AppError::BuildFailure(_))));
        assert!(matches!(delete(&schema, &p), Err(AppError::BuildFailure(_))));
    }

    #[test]
    fn missing_key_value_fails_to_build() {
        let schema = order_items();
        let mut p = schema.projection();
        p.apply_key_parts(&["5".into()]).unwrap();
        assert!(matches!(primary_key_predicate(&p), Err(AppError::BuildFailure(_))));
    }

    #[test]
    fn upsert_skips_empty_auto_increment_column() {
        let schema = products();
        let p = bind_request_values(&schema.columns, &fields(&[("id", ""), ("name", "Widget"), ("price", "9.99")]));
        let s = upsert(&schema, &p).unwrap();
        assert_eq!(
            s.sql,
            "INSERT INTO `shop`.`products` (`name`, `price`) VALUES (?, ?) ON DUPLICATE KEY UPDATE `name` = ?, `price` = ?"
        );
        assert!(!s.sql.contains("`id`"));
        let widget = BoundValue::Text("Widget".into());
        let price = BoundValue::Text("9.99".into());
        assert_eq!(s.params, vec![widget.clone(), price.clone(), widget, price]);
    }

    #[test]
    fn upsert_omits_absent_columns_and_keeps_explicit_null() {
        let schema = products();
        let mut f = fields(&[("id", "7")]);
        f.insert("price".into(), FieldValue::Null);
        let p = bind_request_values(&schema.columns, &f);
        let s = upsert(&schema, &p).unwrap();
        assert_eq!(
            s.sql,
            "INSERT INTO `shop`.`products` (`id`, `price`) VALUES (?, ?) ON DUPLICATE KEY UPDATE `id` = ?, `price` = ?"
        );
        assert_eq!(
            s.params,
            vec![BoundValue::Integer(7), BoundValue::Null, BoundValue::Integer(7), BoundValue::Null]
        );
    }

    #[test]
    fn upsert_with_nothing_to_write_fails() {
        let schema = products();
        assert!(matches!(upsert(&schema, &schema.projection()), Err(AppError::BuildFailure(_))));
    }

    #[test]
    fn delete_by_key() {
        let schema = products();
        let mut p = schema.projection();
        p.apply_key_parts(&["7".into()]).unwrap();
        let s = delete(&schema, &p).unwrap();
        assert_eq!(s.sql, "DELETE FROM `shop`.`products` WHERE `id` = ?");
        assert_eq!(s.params, vec![BoundValue::Integer(7)]);
    }

    #[test]
    fn and_groups_compound_predicates() {
        let schema = order_items();
        let qty = schema.column("qty").unwrap().clone();
        let mut p = schema.projection();
        p.apply_key_parts(&["1".into(), "2".into()]).unwrap();
        let combined = primary_key_predicate(&p).unwrap().and(Predicate::equals(&qty, "4"));
        assert_eq!(combined.sql, "(`order_id` = ? AND `item_id` = ?) AND `qty` = ?");
        assert_eq!(combined.params.len(), 3);
        assert_eq!(combined.params[2], BoundValue::Integer(4));
    }

    #[test]
    fn hidden_columns_cannot_be_ordered_on() {
        let schema = products().without_columns(|name| name == "price");
        assert_eq!(schema.qualified(), "`shop`.`products`");
        assert!(matches!(OrderBy::parse("-price", &schema), Err(AppError::ColumnNotFound(_))));
        assert!(OrderBy::parse("name", &schema).is_ok());
    }
}
