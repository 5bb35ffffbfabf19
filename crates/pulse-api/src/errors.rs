//! Error types for the HTTP service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use pulse_core::{ParseError, QueueError, StoreError, ValidationError};
use tracing::{error, warn};

/// Seconds a client should wait before retrying after a queue failure
pub const QUEUE_RETRY_AFTER_SECONDS: u64 = 5;

/// Request handler errors with HTTP status code mapping
///
/// - `400 Bad Request`: the request itself is wrong; retrying will not help
/// - `500 Internal Server Error`: reporting or server-side failures
/// - `503 Service Unavailable`: the queue could not take the event; the
///   response carries a `Retry-After` header
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Content-Type must be application/json")]
    UnsupportedContentType,

    /// Body is not valid JSON or not a JSON object
    #[error("{0}")]
    InvalidBody(#[from] ParseError),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Missing required parameter: {name}")]
    MissingParameter { name: String },

    #[error("Invalid date format. Expected YYYY-MM-DD")]
    InvalidDate { value: String },

    /// The event could not be appended to the queue
    #[error("Failed to queue event: {0}")]
    QueueUnavailable(#[from] QueueError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnsupportedContentType
            | Self::InvalidBody(_)
            | Self::Validation(_)
            | Self::MissingParameter { .. }
            | Self::InvalidDate { .. } => StatusCode::BAD_REQUEST,
            Self::QueueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(_) | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (message, retry_after) = match self {
            Self::QueueUnavailable(ref e) => {
                error!(error = %e, path = %e.path(), "Queue rejected event");
                (self.to_string(), Some(QUEUE_RETRY_AFTER_SECONDS))
            }
            Self::Store(ref e) => {
                error!(error = %e, "Store query failed");
                (self.to_string(), None)
            }
            Self::Internal { ref message } => {
                error!(error = %message, "Internal server error occurred");
                (
                    "Internal server error occurred. Please try again later.".to_string(),
                    None,
                )
            }
            _ => {
                warn!(error = %self, "Rejected request");
                (self.to_string(), None)
            }
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let mut response = (status, Json(body)).into_response();

        if let Some(retry_seconds) = retry_after {
            if let Ok(header_value) = retry_seconds.to_string().parse() {
                response.headers_mut().insert("Retry-After", header_value);
            }
        }

        response
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Queue unavailable: {0}")]
    Queue(#[from] QueueError),

    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BindFailed { .. } => 1,
            Self::ServerFailed { .. } => 2,
            Self::Configuration(_) => 3,
            Self::Queue(_) => 4,
            Self::Store(_) => 5,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration loading failed: {0}")]
    Load(#[from] config::ConfigError),
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
