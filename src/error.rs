// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Failures surfaced by the grading core and its storage boundary.
///
/// Malformed learner responses are not represented here: evaluators turn
/// them into zero-score verdicts.
#[derive(Debug, Error)]
pub enum GradingError {
    /// A lifecycle operation was called in the wrong submission state.
    #[error("submission {submission_id} is {actual}, expected {expected}")]
    InvalidState {
        submission_id: i64,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("no attempts left ({used} of {max} used)")]
    AttemptLimitExceeded { used: i32, max: i32 },

    #[error("test was due at {due_at}")]
    PastDue { due_at: chrono::DateTime<chrono::Utc> },

    #[error("test {test_id} is not assigned to student {student_id}")]
    NotAssigned { student_id: i64, test_id: i64 },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl GradingError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        GradingError::NotFound { entity, id }
    }
}

impl From<sqlx::Error> for GradingError {
    fn from(err: sqlx::Error) -> Self {
        GradingError::Storage(err.to_string())
    }
}

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 403 Forbidden (attempt limit, past due)
    Forbidden(String),

    // 404 Not Found (missing rows, missing assignment)
    NotFound(String),

    // 409 Conflict (wrong submission state, duplicate question order)
    Conflict(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Maps the core taxonomy onto HTTP semantics so handlers can use `?`.
impl From<GradingError> for AppError {
    fn from(err: GradingError) -> Self {
        let msg = err.to_string();
        match err {
            GradingError::NotFound { .. } | GradingError::NotAssigned { .. } => {
                AppError::NotFound(msg)
            }
            GradingError::InvalidState { .. } | GradingError::Conflict(_) => {
                AppError::Conflict(msg)
            }
            GradingError::AttemptLimitExceeded { .. } | GradingError::PastDue { .. } => {
                AppError::Forbidden(msg)
            }
            GradingError::Validation(_) => AppError::BadRequest(msg),
            GradingError::Storage(_) => AppError::InternalServerError(msg),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
