// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Application-wide error type. Every handler returns this on the error
/// path, and the `IntoResponse` impl below decides the HTTP shape.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (e.g., duplicate email, invalid attempt transition)
    Conflict(String),

    // 503 Service Unavailable, database cannot be reached
    DatabaseUnavailable,

    // 503 Service Unavailable, AI provider down or exhausted retries
    AiUnavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Maps each variant to a status code and JSON body. 503 variants carry a
/// machine-readable `code` field so clients can tell "database down" from
/// "AI down" without string matching.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, code) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                    None,
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            AppError::DatabaseUnavailable => {
                tracing::error!("Database unreachable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "The database is temporarily unreachable. Please try again shortly.".to_string(),
                    Some("DATABASE_UNREACHABLE"),
                )
            }
            AppError::AiUnavailable(msg) => {
                tracing::warn!("AI provider unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "The AI service is temporarily unavailable. Please try again shortly.".to_string(),
                    Some("AI_UNAVAILABLE"),
                )
            }
        };

        let body = match code {
            Some(code) => Json(json!({ "error": error_message, "code": code })),
            None => Json(json!({ "error": error_message })),
        };

        (status, body).into_response()
    }
}

/// `?` support for database calls. Connection-level failures map to 503;
/// everything the caller does not inspect first ends up as a 500.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => AppError::DatabaseUnavailable,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict("Resource already exists".to_string())
            }
            _ => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_maps_to_503() {
        let resp = AppError::DatabaseUnavailable.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let resp = AppError::AiUnavailable("timeout".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_pool_errors_become_unavailable() {
        let err: AppError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, AppError::DatabaseUnavailable));
    }
}
