// ============================
// mafia-backend-lib/src/error.rs
// ============================
//! Central error type + Axum integration.
//!
//! REST handlers surface `AppError` as JSON responses. The socket layer
//! never does: persistence and lookup failures there are logged and
//! dropped, and the client simply never receives the refetch signal.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("authentication handshake timed out")]
    AuthTimeout,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthTimeout | AppError::InvalidToken(_) | AppError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            },
            AppError::UserNotFound(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::AuthTimeout => "AUTH_001",
            AppError::InvalidToken(_) => "AUTH_002",
            AppError::InvalidCredentials => "AUTH_003",
            AppError::UserNotFound(_) => "NF_001",
            AppError::NotFound(_) => "NF_002",
            AppError::Persistence(_) => "PERSIST_001",
            AppError::Json(_) => "JSON_001",
            AppError::Internal(_) => "INT_001",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
