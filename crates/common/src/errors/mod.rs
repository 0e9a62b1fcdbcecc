//! Error types for the API gateway
//!
//! Provides the client-visible error taxonomy with:
//! - Distinct error types for each pipeline failure mode
//! - HTTP status code mapping
//! - Short plain-text bodies that never leak internal detail
//! - Error codes for log correlation

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::AuthError;
use crate::worker::PoolError;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication errors (2xxx)
    AuthMissing,
    AuthMalformed,
    AuthInvalidOrExpired,

    // Request errors (4xxx)
    BadRequest,

    // Rate limiting (6xxx)
    RateLimited,

    // Upstream errors (8xxx)
    UpstreamUnavailable,
    UpstreamTimeout,
    PoolClosed,

    // Internal errors (9xxx)
    ShutdownTimeout,
    ConfigurationError,
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::AuthMissing => 2001,
            ErrorCode::AuthMalformed => 2002,
            ErrorCode::AuthInvalidOrExpired => 2003,

            ErrorCode::BadRequest => 4001,

            ErrorCode::RateLimited => 6001,

            ErrorCode::UpstreamUnavailable => 8001,
            ErrorCode::UpstreamTimeout => 8002,
            ErrorCode::PoolClosed => 8003,

            ErrorCode::ShutdownTimeout => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::InternalError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Admission gate failures
    #[error("Missing token")]
    AuthMissing,

    #[error("Invalid token format")]
    AuthMalformed,

    #[error("Invalid or expired token")]
    AuthInvalidOrExpired,

    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Rate limit exceeded")]
    RateLimited,

    // Dispatch failures
    #[error("Upstream unavailable: {message}")]
    UpstreamUnavailable { message: String },

    #[error("Upstream timeout: {message}")]
    UpstreamTimeout { message: String },

    #[error("Worker pool is closed")]
    PoolClosed,

    // Lifecycle and internal errors
    #[error("Shutdown grace period of {grace_secs}s exceeded")]
    ShutdownTimeout { grace_secs: u64 },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::AuthMissing => ErrorCode::AuthMissing,
            AppError::AuthMalformed => ErrorCode::AuthMalformed,
            AppError::AuthInvalidOrExpired => ErrorCode::AuthInvalidOrExpired,
            AppError::BadRequest { .. } => ErrorCode::BadRequest,
            AppError::RateLimited => ErrorCode::RateLimited,
            AppError::UpstreamUnavailable { .. } => ErrorCode::UpstreamUnavailable,
            AppError::UpstreamTimeout { .. } => ErrorCode::UpstreamTimeout,
            AppError::PoolClosed => ErrorCode::PoolClosed,
            AppError::ShutdownTimeout { .. } => ErrorCode::ShutdownTimeout,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Internal { .. } => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 401 Unauthorized
            AppError::AuthMissing |
            AppError::AuthMalformed |
            AppError::AuthInvalidOrExpired => StatusCode::UNAUTHORIZED,

            // 400 Bad Request
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,

            // 429 Too Many Requests
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,

            // 502 Bad Gateway
            AppError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,

            // 504 Gateway Timeout
            AppError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,

            // 503 Service Unavailable
            AppError::PoolClosed => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            AppError::ShutdownTimeout { .. } |
            AppError::Configuration { .. } |
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short body returned to the client
    pub fn public_message(&self) -> &'static str {
        match self {
            AppError::AuthMissing => "Missing token\n",
            AppError::AuthMalformed => "Invalid token format\n",
            AppError::AuthInvalidOrExpired => "Invalid or expired token\n",
            AppError::BadRequest { .. } => "Bad request\n",
            AppError::RateLimited => "Rate limit exceeded\n",
            AppError::UpstreamUnavailable { .. } => "Bad gateway\n",
            AppError::UpstreamTimeout { .. } => "Upstream timeout\n",
            AppError::PoolClosed => "Service shutting down\n",
            AppError::ShutdownTimeout { .. } |
            AppError::Configuration { .. } |
            AppError::Internal { .. } => "Internal server error\n",
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %self,
                code = code.as_code(),
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %self,
                code = code.as_code(),
                status = status.as_u16(),
                "Client error"
            );
        }

        (status, self.public_message()).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingHeader => AppError::AuthMissing,
            AuthError::MalformedHeader => AppError::AuthMalformed,
            AuthError::InvalidToken(_) | AuthError::Expired => AppError::AuthInvalidOrExpired,
        }
    }
}

impl From<PoolError> for AppError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Closed => AppError::PoolClosed,
            PoolError::ResponseDropped { job_id } => AppError::Internal {
                message: format!("worker dropped response for job {}", job_id),
            },
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}
