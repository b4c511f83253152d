//! Value binder: overlays submitted request fields onto a table's columns.

use crate::catalog::{ColumnDescriptor, SemanticType};
use crate::error::AppError;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A value as it arrived on the wire, before column typing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Null,
}

/// Submitted field name -> value.
pub type RequestFields = HashMap<String, FieldValue>;

/// One column's value inside a [`RowProjection`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoundValue {
    /// Not submitted; omitted from writes, never defaulted.
    Absent,
    Null,
    Text(String),
    Integer(i64),
}

impl BoundValue {
    /// Types a wire value for `column`. An empty string on an int column stays
    /// `Text("")`: it means "let auto-increment assign it".
    pub fn coerce(column: &ColumnDescriptor, raw: &FieldValue) -> Result<Self, AppError> {
        let text = match raw {
            FieldValue::Null => return Ok(BoundValue::Null),
            FieldValue::Text(t) => t,
        };
        match column.semantic_type() {
            SemanticType::String => Ok(BoundValue::Text(text.clone())),
            SemanticType::Int => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    Ok(BoundValue::Text(String::new()))
                } else if trimmed.eq_ignore_ascii_case("null") {
                    Ok(BoundValue::Null)
                } else {
                    trimmed.parse::<i64>().map(BoundValue::Integer).map_err(|_| {
                        AppError::BadRequest(format!("{} expects an integer, got {:?}", column.name, text))
                    })
                }
            }
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, BoundValue::Absent)
    }

    /// Empty text, the auto-increment marker on int columns.
    pub fn is_empty_text(&self) -> bool {
        matches!(self, BoundValue::Text(t) if t.is_empty())
    }

    pub fn to_json(&self) -> Option<Value> {
        match self {
            BoundValue::Absent => None,
            BoundValue::Null => Some(Value::Null),
            BoundValue::Text(t) => Some(Value::String(t.clone())),
            BoundValue::Integer(n) => Some(Value::Number((*n).into())),
        }
    }
}

/// Column-to-value mapping for one row of one request, in catalog column order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowProjection {
    entries: Vec<(ColumnDescriptor, BoundValue)>,
}

impl RowProjection {
    /// Every column, every value absent.
    pub fn new(columns: &[ColumnDescriptor]) -> Self {
        RowProjection {
            entries: columns.iter().map(|c| (c.clone(), BoundValue::Absent)).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ColumnDescriptor, &BoundValue)> {
        self.entries.iter().map(|(c, v)| (c, v))
    }

    pub fn primary(&self) -> impl Iterator<Item = (&ColumnDescriptor, &BoundValue)> {
        self.iter().filter(|(c, _)| c.is_primary())
    }

    pub fn get(&self, name: &str) -> Option<&BoundValue> {
        self.entries.iter().find(|(c, _)| c.name == name).map(|(_, v)| v)
    }

    pub fn set(&mut self, name: &str, value: BoundValue) -> Result<(), AppError> {
        let slot = self
            .entries
            .iter_mut()
            .find(|(c, _)| c.name == name)
            .ok_or_else(|| AppError::ColumnNotFound(name.to_string()))?;
        slot.1 = value;
        Ok(())
    }

    /// Overwrites each primary-key column, in column order, with the next
    /// unused key part from the URL. Extra parts are ignored; primary columns
    /// beyond the supplied parts keep whatever the body gave them.
    pub fn apply_key_parts(&mut self, key_parts: &[String]) -> Result<(), AppError> {
        let mut parts = key_parts.iter();
        for (column, value) in self.entries.iter_mut().filter(|(c, _)| c.is_primary()) {
            let Some(part) = parts.next() else { break };
            let bound = BoundValue::coerce(column, &FieldValue::Text(part.clone()))
                .map_err(|_| AppError::InvalidPath(format!("bad key value for {}: {:?}", column.name, part)))?;
            *value = bound;
        }
        Ok(())
    }

    /// Writes an identifier assigned by the database back into the int-typed
    /// primary-key column(s).
    pub fn set_generated_id(&mut self, id: i64) {
        for (column, value) in self.entries.iter_mut() {
            if column.is_primary() && column.semantic_type() == SemanticType::Int {
                *value = BoundValue::Integer(id);
            }
        }
    }

    /// Present columns as a JSON object; absent columns are left out.
    pub fn to_json_object(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for (column, value) in &self.entries {
            if let Some(v) = value.to_json() {
                map.insert(column.name.clone(), v);
            }
        }
        map
    }
}

/// Sets each column named by a submitted field to that field's value. Fields
/// matching no column are ignored; a value that cannot be typed for its
/// column is skipped and the column stays absent.
pub fn bind_request_values(columns: &[ColumnDescriptor], fields: &RequestFields) -> RowProjection {
    let mut projection = RowProjection::new(columns);
    for (column, slot) in projection.entries.iter_mut() {
        let Some(raw) = fields.get(&column.name) else { continue };
        match BoundValue::coerce(column, raw) {
            Ok(v) => *slot = v,
            Err(e) => tracing::warn!(column = %column.name, error = %e, "skipping field"),
        }
    }
    for name in fields.keys() {
        if !columns.iter().any(|c| &c.name == name) {
            tracing::debug!(field = %name, "ignoring field with no matching column");
        }
    }
    projection
}
