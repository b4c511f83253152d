//! Extract submitted row fields from a form or JSON request body.

use crate::binder::{FieldValue, RequestFields};
use crate::error::AppError;
use async_trait::async_trait;
use axum::{
    extract::{FromRequest, Request},
    http::{header, Method},
    Form, Json,
};
use serde_json::Value;

/// Submitted fields. Only `POST` carries a body worth reading; every other
/// method, and any other content type, yields no fields so an unsupported
/// method is answered with 405 whatever its body holds.
#[derive(Clone, Debug, Default)]
pub struct Fields(pub RequestFields);

#[async_trait]
impl<S> FromRequest<S> for Fields
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if req.method() != Method::POST {
            return Ok(Fields::default());
        }
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();
        if content_type.starts_with("application/json") {
            let Json(value) = Json::<Value>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            return from_json(value).map(Fields);
        }
        if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            return Ok(Fields(from_pairs(pairs)));
        }
        Ok(Fields::default())
    }
}

/// Form pairs; a key given more than once has its values concatenated.
pub fn from_pairs(pairs: Vec<(String, String)>) -> RequestFields {
    let mut fields = RequestFields::new();
    for (name, value) in pairs {
        match fields.get_mut(&name) {
            Some(FieldValue::Text(existing)) => existing.push_str(&value),
            _ => {
                fields.insert(name, FieldValue::Text(value));
            }
        }
    }
    fields
}

/// A JSON object body. `null` is an explicit NULL; booleans become `1`/`0`;
/// nested arrays and objects are stored as their JSON text.
pub fn from_json(body: Value) -> Result<RequestFields, AppError> {
    let Value::Object(map) = body else {
        return Err(AppError::BadRequest("body must be a JSON object".into()));
    };
    Ok(map
        .into_iter()
        .map(|(name, value)| {
            let field = match value {
                Value::Null => FieldValue::Null,
                Value::String(s) => FieldValue::Text(s),
                Value::Bool(b) => FieldValue::Text(if b { "1" } else { "0" }.into()),
                Value::Number(n) => FieldValue::Text(n.to_string()),
                nested => FieldValue::Text(nested.to_string()),
            };
            (name, field)
        })
        .collect())
}
