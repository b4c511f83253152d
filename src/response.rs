//! Response shaping and the JSON body writer.

use crate::error::AppError;
use crate::store::Row;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;

pub const JSON_UTF8: &str = "application/json; charset=utf-8";

/// Exactly one row is returned as the bare object; any other count as an array.
pub fn rows_body(mut rows: Vec<Row>) -> Value {
    if rows.len() == 1 {
        Value::Object(rows.remove(0))
    } else {
        Value::Array(rows.into_iter().map(Value::Object).collect())
    }
}

/// `{"n":"<rows affected>","id":"<last insert id>"}`
pub fn saved_body(n: u64, id: i64) -> Value {
    serde_json::json!({ "n": n.to_string(), "id": id.to_string() })
}

/// `{"n":"<rows affected>"}`
pub fn deleted_body(n: u64) -> Value {
    serde_json::json!({ "n": n.to_string() })
}

/// Serializes `body` with a `application/json; charset=utf-8` content type.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<Response, AppError> {
    let bytes = serde_json::to_vec(body)?;
    let mut response = (status, bytes).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_UTF8));
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: i64) -> Row {
        json!({ "id": id }).as_object().cloned().unwrap()
    }

    #[test]
    fn one_row_collapses_to_object() {
        assert_eq!(rows_body(vec![row(1)]), json!({"id": 1}));
    }

    #[test]
    fn zero_or_many_rows_are_arrays() {
        assert_eq!(rows_body(vec![]), json!([]));
        assert_eq!(rows_body(vec![row(1), row(2)]), json!([{"id": 1}, {"id": 2}]));
    }

    #[test]
    fn write_bodies_use_strings() {
        assert_eq!(saved_body(1, 42), json!({"n": "1", "id": "42"}));
        assert_eq!(saved_body(2, -1), json!({"n": "2", "id": "-1"}));
        assert_eq!(deleted_body(1), json!({"n": "1"}));
    }

    #[test]
    fn content_type_carries_charset() {
        let r = json_response(StatusCode::OK, &json!([])).unwrap();
        assert_eq!(r.headers().get(header::CONTENT_TYPE).unwrap(), JSON_UTF8);
    }
}
