//! Error types for DeepWiki.
//!
//! Uses thiserror for ergonomic error definitions that integrate
//! with axum's response system.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::services::FetchError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Validation errors
    #[error("Invalid repository URL: {0}")]
    InvalidUrl(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // Resource errors
    #[error("Resource not found: {0}")]
    NotFound(String),

    // External service errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Indexing failed: {0}")]
    Indexing(String),

    #[error("Wiki generation failed: {0}")]
    Generation(String),

    // Job errors
    #[error("Could not start job: {0}")]
    DispatchFailed(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400
            Self::InvalidUrl(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,

            // 404
            Self::NotFound(_) => StatusCode::NOT_FOUND,

            Self::Fetch(e) => match e {
                FetchError::NotFound(_) => StatusCode::NOT_FOUND,
                FetchError::Forbidden(_) => StatusCode::FORBIDDEN,
                FetchError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                FetchError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
                FetchError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                FetchError::Transport(_) | FetchError::Malformed(_) => StatusCode::BAD_GATEWAY,
            },

            // 500
            Self::Database(_)
            | Self::Indexing(_)
            | Self::Generation(_)
            | Self::DispatchFailed(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "INVALID_URL",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Fetch(e) => match e {
                FetchError::NotFound(_) => "GITHUB_NOT_FOUND",
                FetchError::Forbidden(_) => "GITHUB_FORBIDDEN",
                FetchError::Unauthorized(_) => "GITHUB_UNAUTHORIZED",
                FetchError::RateLimited(_) => "GITHUB_RATE_LIMITED",
                FetchError::Timeout(_) => "GITHUB_TIMEOUT",
                FetchError::Transport(_) => "GITHUB_UNAVAILABLE",
                FetchError::Malformed(_) => "GITHUB_MALFORMED_RESPONSE",
            },
            Self::Indexing(_) => "INDEXING_ERROR",
            Self::Generation(_) => "GENERATION_ERROR",
            Self::DispatchFailed(_) => "JOB_DISPATCH_FAILED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Short machine-readable class recorded in job failure payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(e) => e.kind(),
            Self::InvalidUrl(_) | Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Database(_) => "database",
            Self::Indexing(_) => "indexing",
            Self::Generation(_) => "generation",
            Self::DispatchFailed(_) => "dispatch",
            Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(code, %message, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

// Convenience conversions
impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {}", err))
    }
}
