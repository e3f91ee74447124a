// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
///
/// Business-rule violations (wrong attempt state, missed deadline,
/// ineligibility, conflicting federated subject) are surfaced to the
/// caller as-is and never retried internally.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 403 Forbidden - account exists but admin has not verified it yet
    PendingVerification(String),

    // 403 Forbidden - certificate requirements not met
    NotEligible(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (e.g., duplicate username)
    Conflict(String),

    // 409 Conflict - an in_progress attempt already exists for (account, exam)
    AlreadyInProgress(String),

    // 409 Conflict - attempt is not in a state that allows the operation
    WrongState(String),

    // 409 Conflict - email matched an account already bound to another subject
    ConflictingSubject(String),

    // 410 Gone - attempt deadline passed; answers were discarded, no score
    Expired(String),

    // 422 Unprocessable - exam cannot be graded (zero total weight)
    InvalidExam(String),
}

impl AppError {
    /// Stable machine-readable tag included in every error body.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InternalServerError(_) => "internal",
            AppError::BadRequest(_) => "bad_request",
            AppError::AuthError(_) => "unauthorized",
            AppError::PendingVerification(_) => "pending_verification",
            AppError::NotEligible(_) => "not_eligible",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::AlreadyInProgress(_) => "already_in_progress",
            AppError::WrongState(_) => "wrong_state",
            AppError::ConflictingSubject(_) => "conflicting_subject",
            AppError::Expired(_) => "expired",
            AppError::InvalidExam(_) => "invalid_exam",
        }
    }
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
        let kind = self.kind();
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::PendingVerification(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotEligible(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::AlreadyInProgress(msg) => (StatusCode::CONFLICT, msg),
            AppError::WrongState(msg) => (StatusCode::CONFLICT, msg),
            AppError::ConflictingSubject(msg) => (StatusCode::CONFLICT, msg),
            AppError::Expired(msg) => (StatusCode::GONE, msg),
            AppError::InvalidExam(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
        };
        let body = Json(json!({
            "error": error_message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

/// Returns true if the error is a violation of a UNIQUE constraint,
/// so callers can translate insert races into domain outcomes.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}
