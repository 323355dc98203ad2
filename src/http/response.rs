//! Response envelopes and the error taxonomy.
//!
//! # Responsibilities
//! - Render `{ success: true, data }` for handler payloads
//! - Render `{ success: false, error: { code, message } }` for every failure
//! - Map each error kind to exactly one HTTP status
//!
//! # Design Decisions
//! - Internal faults are logged here, inside the request span, and replaced
//!   by a generic message before they reach the caller
//! - The correlation header is added by `RequestIdLayer`, not here, so error
//!   and success responses get it the same way

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Machine-readable error codes shared by the gateway and internal services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TokenRequired,
    InvalidToken,
    TokenExpired,
    InvalidCredentials,
    Forbidden,
    NotFound,
    Conflict,
    UpstreamUnavailable,
    ValidationError,
    InternalError,
}

impl ErrorKind {
    /// Wire code used in the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::TokenRequired => "TOKEN_REQUIRED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Default status for the kind. Upstream timeouts override this with 504.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::TokenRequired
            | Self::InvalidToken
            | Self::TokenExpired
            | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            Self::ValidationError => StatusCode::BAD_REQUEST,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Error returned by gateway and service handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    TokenRequired,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    TokenExpired,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream '{service}' unavailable: {reason}")]
    UpstreamUnavailable {
        service: String,
        reason: String,
        timed_out: bool,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TokenRequired => ErrorKind::TokenRequired,
            Self::InvalidToken(_) => ErrorKind::InvalidToken,
            Self::TokenExpired => ErrorKind::TokenExpired,
            Self::InvalidCredentials => ErrorKind::InvalidCredentials,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Internal(_) => ErrorKind::InternalError,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UpstreamUnavailable { timed_out: true, .. } => StatusCode::GATEWAY_TIMEOUT,
            other => other.kind().status(),
        }
    }

    /// Message shown to the caller. Internal details never leave the process.
    pub fn public_message(&self) -> String {
        match self {
            Self::TokenRequired => "Authentication token required".to_string(),
            Self::InvalidToken(_) => "Invalid authentication token".to_string(),
            Self::TokenExpired => "Authentication token has expired".to_string(),
            Self::UpstreamUnavailable { service, timed_out, .. } => {
                if *timed_out {
                    format!("Service '{}' did not respond in time", service)
                } else {
                    format!("Service '{}' is unavailable", service)
                }
            }
            Self::Internal(_) => "Internal server error".to_string(),
            Self::InvalidCredentials => self.to_string(),
            Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::Validation(msg) => msg.clone(),
        }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::NotFound(format!("{} '{}' not found", entity, id))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    success: bool,
    error: ErrorBody,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            tracing::error!(error = %detail, "Unhandled internal fault");
        }

        let body = ErrorEnvelope {
            success: false,
            error: ErrorBody {
                code: self.kind().code(),
                message: self.public_message(),
            },
        };

        (self.status_code(), Json(body)).into_response()
    }
}

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
