//! Error types for the e-signature service.
//!
//! All errors implement `ResponseError` for Actix-web integration,
//! converting domain errors into the appropriate HTTP status codes (§7).

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use thiserror::Error;

/// Service error type with structured error responses.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("not found")]
    NotFound,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("otp expired")]
    OtpExpired,

    #[error("otp incorrect")]
    OtpWrong,

    #[error("document is already in a terminal state")]
    AlreadyTerminal,

    #[error("plan limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body. Spec §7: "All error responses are JSON
/// `{message}`."
#[derive(Serialize)]
struct ErrorResponse {
    message: String,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::OtpExpired | Self::OtpWrong | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyTerminal => StatusCode::CONFLICT,
            Self::LimitExceeded(_) => StatusCode::FORBIDDEN,
            Self::Integrity(_) | Self::Storage(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if matches!(self, Self::Integrity(_)) {
            tracing::error!(error = %self, "integrity invariant violated");
        }
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            message: self.to_string(),
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::Error> for AppError {
    fn from(err: redb::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::DatabaseError> for AppError {
    fn from(err: redb::DatabaseError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::TableError> for AppError {
    fn from(err: redb::TableError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::TransactionError> for AppError {
    fn from(err: redb::TransactionError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::CommitError> for AppError {
    fn from(err: redb::CommitError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::StorageError> for AppError {
    fn from(err: redb::StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        Self::Internal(format!("bcrypt: {err}"))
    }
}

impl From<lopdf::Error> for AppError {
    fn from(err: lopdf::Error) -> Self {
        Self::Internal(format!("pdf: {err}"))
    }
}

/// Result type alias for service operations.
pub type AppResult<T> = Result<T, AppError>;
