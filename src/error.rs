//! Typed errors and HTTP mapping.
//!
//! Client-facing bodies only ever carry a generic message per error kind; the
//! detail (query text, driver message) goes to the log.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("missing setting: {0}")]
    Missing(&'static str),
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("settings file {path}: {reason}")]
    File { path: String, reason: String },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("connection failure: {0}")]
    ConnectionFailure(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("schema not found: {0}")]
    SchemaNotFound(String),
    #[error("column not found: {0}")]
    ColumnNotFound(String),
    #[error("query failure: {0}")]
    QueryFailure(String),
    #[error("no rows affected")]
    NoRowsAffected,
    #[error("encoding failure: {0}")]
    EncodingFailure(String),
    #[error("could not build statement: {0}")]
    BuildFailure(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("save failed: {0}")]
    SaveFailure(String),
    #[error("delete failed: {0}")]
    DeleteFailure(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => AppError::ConnectionFailure(e.to_string()),
            sqlx::Error::Configuration(_) => AppError::ConnectionFailure(e.to_string()),
            other => AppError::QueryFailure(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::EncodingFailure(e.to_string())
    }
}

impl AppError {
    /// Status code, machine code and the generic message shown to clients.
    pub fn classify(&self) -> (StatusCode, &'static str, &'static str) {
        match self {
            AppError::ConnectionFailure(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "connection_error",
                "could not connect to database",
            ),
            AppError::InvalidPath(_) => (StatusCode::BAD_REQUEST, "invalid_path", "invalid path"),
            AppError::SchemaNotFound(_) => (StatusCode::NOT_FOUND, "not_found", "database or table doesn't exist"),
            AppError::ColumnNotFound(_) | AppError::QueryFailure(_) => {
                (StatusCode::NOT_FOUND, "not_found", "no results found")
            }
            AppError::NoRowsAffected => (StatusCode::INTERNAL_SERVER_ERROR, "no_rows_affected", "could not delete"),
            AppError::EncodingFailure(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "encoding_error",
                "could not encode json",
            ),
            AppError::BuildFailure(_) => (StatusCode::BAD_REQUEST, "build_failure", "could not build query"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", "object not found"),
            AppError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "method_not_allowed",
                "method not allowed",
            ),
            AppError::SaveFailure(_) => (StatusCode::INTERNAL_SERVER_ERROR, "save_error", "could not save"),
            AppError::DeleteFailure(_) => (StatusCode::INTERNAL_SERVER_ERROR, "delete_error", "could not delete"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request", "bad request"),
            AppError::Settings(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                "server misconfigured",
            ),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.classify();
        if status.is_server_error() {
            tracing::error!(error = %self, code, "request failed");
        } else {
            tracing::warn!(error = %self, code, "request rejected");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: message.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_a_connection_failure() {
        let err: AppError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, AppError::ConnectionFailure(_)));
        assert_eq!(err.classify().0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn row_not_found_is_a_query_failure() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AppError::QueryFailure(_)));
        assert_eq!(err.classify().0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn client_message_hides_detail() {
        let err = AppError::SaveFailure("Duplicate entry 'x' for key 'PRIMARY'".into());
        let (status, code, message) = err.classify();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, "save_error");
        assert!(!message.contains("Duplicate"));
    }

    #[test]
    fn zero_rows_deleted_is_server_error() {
        assert_eq!(AppError::NoRowsAffected.classify().0, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
