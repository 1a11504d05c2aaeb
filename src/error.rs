//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// SQLSTATE for `CREATE TABLE` on an existing relation.
const DUPLICATE_TABLE: &str = "42P07";
/// SQLSTATE for a unique constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("column: {0}")]
    Column(String),
    #[error("security: {0}")]
    Security(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("settings: {0}")]
    Settings(String),
}

impl AppError {
    /// Column referenced by the caller is not declared on the table.
    pub fn unknown_column(table: &str, column: &str) -> Self {
        AppError::Column(format!("unknown column '{}' for table '{}'", column, table))
    }

    /// Value could not be converted to the column's declared type.
    pub fn coercion(column: &str, type_name: &str, value: &serde_json::Value) -> Self {
        AppError::Validation(format!(
            "invalid value for column '{}' of type {}: {}",
            column, type_name, value
        ))
    }

    /// Turns a duplicate-table or unique-violation database error raised while
    /// creating or renaming `name` into `AlreadyExists`; other errors pass through.
    pub fn conflict_on(name: &str, err: sqlx::Error) -> Self {
        let code = err
            .as_database_error()
            .and_then(|e| e.code())
            .map(|c| c.into_owned());
        match code.as_deref() {
            Some(DUPLICATE_TABLE) | Some(UNIQUE_VIOLATION) => {
                AppError::AlreadyExists(format!("table '{}' already exists", name))
            }
            _ => AppError::Db(err),
        }
    }

    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::AlreadyExists(_) => (StatusCode::CONFLICT, "already_exists"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Column(_) => (StatusCode::BAD_REQUEST, "column_error"),
            AppError::Security(_) => (StatusCode::FORBIDDEN, "security_error"),
            AppError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
            AppError::Settings(_) => (StatusCode::INTERNAL_SERVER_ERROR, "settings_error"),
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
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(AppError::Validation("x".into()).status().0, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(AppError::AlreadyExists("x".into()).status().0, StatusCode::CONFLICT);
        assert_eq!(AppError::NotFound("x".into()).status().0, StatusCode::NOT_FOUND);
        assert_eq!(AppError::Column("x".into()).status().0, StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Security("x".into()).status().0, StatusCode::FORBIDDEN);
        assert_eq!(AppError::Db(sqlx::Error::RowNotFound).status().0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn non_database_errors_pass_through_conflict_mapping() {
        let err = AppError::conflict_on("t", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, AppError::Db(sqlx::Error::PoolTimedOut)));
    }

    #[test]
    fn coercion_message_names_column_type_and_value() {
        let err = AppError::coercion("age", "integer", &serde_json::json!("abc"));
        let msg = err.to_string();
        assert!(msg.contains("age"));
        assert!(msg.contains("integer"));
        assert!(msg.contains("abc"));
    }
}
