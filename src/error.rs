//! Error handling
//!
//! Errors are raised as typed values at the point of detection and surface
//! unmodified at the HTTP boundary, where each variant maps to exactly one
//! status code and the `{statusCode, code, message, success}` body.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::Serialize;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Malformed or missing input (400)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    EmptyField(String),
    #[error("{0} is too long (maximum {1} characters)")]
    TooLong(String, usize),
    #[error("{0} has invalid format")]
    InvalidFormat(String),
    #[error("{0} contains suspicious content")]
    SuspiciousContent(String),
    #[error("username or email is required")]
    MissingIdentifier,
    #[error("{0} file is required")]
    MissingFile(String),
    #[error("{0} file could not be uploaded")]
    UploadFailed(String),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

/// Bad credentials and invalid, expired or reused tokens (401)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid user credentials")]
    InvalidCredentials,
    #[error("Invalid old password")]
    WrongPassword,
    #[error("unauthorized request")]
    MissingToken,
    /// Signature or expiry check failed; carries the verifier's message.
    #[error("{0}")]
    InvalidToken(String),
    #[error("Invalid refresh token")]
    UnknownSubject,
    /// The presented refresh token is not the one currently stored.
    #[error("Refresh token is expired or used")]
    TokenReused,
}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Internal error: {0}")]
    Internal(String),
}

const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                AppError::Conflict("User with email or username already exists".to_string())
            }
            _ => AppError::Internal(format!("Database error: {}", err)),
        }
    }
}

impl AppError {
    /// Stable machine-readable code for client-side handling
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Conflict(_) => "CONFLICT",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials | AuthError::WrongPassword => "INVALID_CREDENTIALS",
                AuthError::MissingToken => "UNAUTHORIZED",
                AuthError::InvalidToken(_) | AuthError::UnknownSubject => "TOKEN_INVALID",
                AuthError::TokenReused => "TOKEN_REUSED",
            },
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message shown to the caller. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => "Something went wrong".to_string(),
            other => other.to_string(),
        }
    }

    fn log(&self, request_id: &str) {
        match self {
            AppError::Internal(_) => {
                tracing::error!(request_id = request_id, error = %self, "Internal error");
            }
            AppError::Auth(AuthError::TokenReused) => {
                tracing::warn!(request_id = request_id, error = %self, "Refresh token reuse detected");
            }
            AppError::Auth(_) => {
                tracing::warn!(request_id = request_id, error = %self, "Authentication error");
            }
            _ => {
                tracing::info!(request_id = request_id, error = %self, "Request rejected");
            }
        }
    }
}

/// ============================================================================
/// 3. HTTP RESPONSE MAPPING
/// ============================================================================

/// Failure body returned to the transport layer
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status_code: u16,
    pub code: String,
    pub message: String,
    pub success: bool,
}

impl ErrorResponse {
    pub fn from_error(error: &AppError) -> Self {
        Self {
            status_code: error.status_code().as_u16(),
            code: error.code().to_string(),
            message: error.public_message(),
            success: false,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log(&request_id);

        HttpResponse::build(self.status_code()).json(ErrorResponse::from_error(self))
    }
}
