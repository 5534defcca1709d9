/// Unified error types for Credit Meter
use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum MeterError {
    /// No account or balance record for the identifier
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input, negative grant, illegal status transition
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Storage backend unavailable or statement failed
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A conditional update left the store in a state it should never reach
    #[error("Storage inconsistency: {0}")]
    StorageInconsistency(String),

    /// Duplicate record. Also reserved for multi-writer detection.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authorization errors
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MeterError {
    /// Whether the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MeterError::Storage(_)
                | MeterError::StorageInconsistency(_)
                | MeterError::RateLimitExceeded { .. }
        )
    }
}

/// Body rejections become `InvalidArgument` without echoing the decoder's message
impl From<JsonRejection> for MeterError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(_) => "Request body has missing or mistyped fields",
            JsonRejection::JsonSyntaxError(_) => "Request body is not valid JSON",
            JsonRejection::MissingJsonContentType(_) => {
                "Expected request with Content-Type: application/json"
            }
            _ => "Request body could not be read",
        };
        MeterError::InvalidArgument(message.to_string())
    }
}

/// JSON error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert MeterError to HTTP response
impl IntoResponse for MeterError {
    fn into_response(self) -> Response {
        let retryable = self.is_retryable();
        let (status, error_code, message) = match &self {
            MeterError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            MeterError::InvalidArgument(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidArgument",
                self.to_string(),
            ),
            MeterError::Conflict(_) => (StatusCode::CONFLICT, "Conflict", self.to_string()),
            MeterError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            MeterError::Authorization(_) => {
                (StatusCode::FORBIDDEN, "Forbidden", self.to_string())
            }
            MeterError::RateLimitExceeded { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RateLimitExceeded",
                format!("Rate limit exceeded, retry in {}s", retry_after.as_secs().max(1)),
            ),
            MeterError::Storage(_) | MeterError::StorageInconsistency(_) => {
                tracing::error!(error = %self, "storage failure");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "StorageUnavailable",
                    "Storage temporarily unavailable".to_string(), // Don't leak details
                )
            }
            MeterError::Config(_) | MeterError::Internal(_) | MeterError::Io(_) => {
                tracing::error!(error = %self, "internal failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalServerError",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        let mut response = (status, body).into_response();
        if retryable {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

/// Result type alias for service operations
pub type MeterResult<T> = Result<T, MeterError>;
