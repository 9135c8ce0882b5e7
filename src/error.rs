/// Unified error types for Gatehouse
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum GateError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Session cache errors (store unreachable, serialization failure)
    #[error("Cache error: {0}")]
    Cache(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authorization errors
    #[error("Access denied: {0}")]
    Authorization(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found / business-rule errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict errors (e.g., duplicate email)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Mail transport errors
    #[error("Mail error: {0}")]
    Mail(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error envelope, mirrored by the success envelope in `api::envelope`
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: String,
    pub message: String,
}

/// Convert GateError to an HTTP response
impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            GateError::Authentication(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            GateError::Authorization(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            GateError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            // Business-rule violations surface as 400, not 404
            GateError::NotFound(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            GateError::Conflict(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            GateError::Mail(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Mail delivery failed".to_string(),
            ),
            GateError::Database(_)
            | GateError::Cache(_)
            | GateError::Internal(_)
            | GateError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(ErrorBody {
            status: "error".to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type GateResult<T> = Result<T, GateError>;
