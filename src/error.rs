//! Error types for the MedChain oracle gateway.
//!
//! This module provides a unified error type [`OracleError`] for all gateway
//! operations, along with a convenient [`Result`] type alias.
//!
//! # Error Categories
//!
//! - **Validation**: client-fixable artifact problems (size, media type, truncation)
//! - **Admission**: capacity exhaustion and deadline expiry
//! - **Collaborators**: scoring backend, provenance anchoring and shortage forecasting failures
//! - **Configuration**: invalid settings or unreadable config files
//!
//! Every variant maps onto an HTTP status and a stable `error_kind` string, and
//! renders as a `{error_kind, message}` JSON body through [`IntoResponse`].
//!
//! # Example
//!
//! ```rust
//! use medchain_oracle::error::{OracleError, ValidationError};
//!
//! let err = OracleError::from(ValidationError::Empty);
//! assert_eq!(err.status_code().as_u16(), 400);
//! assert_eq!(err.error_kind(), "validation_error");
//! ```

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

/// Reasons an uploaded artifact is refused before scoring.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Artifact of {size} bytes exceeds the {max} byte ceiling")]
    Oversize { size: u64, max: u64 },

    #[error("Media type not allowed: {0}")]
    UnsupportedMediaType(String),

    #[error("Artifact stream truncated after {received} bytes (declared {declared:?})")]
    Truncated { received: u64, declared: Option<u64> },

    #[error("Artifact payload is empty")]
    Empty,

    #[error("No file field in multipart upload")]
    MissingFile,

    #[error("Malformed upload: {0}")]
    Malformed(String),

    #[error("Upload exceeds the request body limit: {0}")]
    BodyTooLarge(String),
}

/// Main error type for gateway operations.
#[derive(Error, Debug)]
pub enum OracleError {
    // Client errors
    #[error("Invalid artifact: {0}")]
    Validation(#[from] ValidationError),

    // Admission errors
    #[error("Capacity exceeded, retry after {}s", retry_after.as_secs())]
    CapacityExceeded { retry_after: Duration },

    #[error("Deadline exceeded after {}ms", .0.as_millis())]
    DeadlineExceeded(Duration),

    // Collaborator errors
    #[error("Scoring failed: {0}")]
    Scoring(String),

    #[error("Scoring backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Provenance anchoring failed: {0}")]
    Provenance(String),

    #[error("Shortage forecast unavailable: {0}")]
    Forecast(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // Infrastructure errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OracleError {
    /// HTTP status this error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            OracleError::Validation(v) => match v {
                ValidationError::Oversize { .. } | ValidationError::BodyTooLarge(_) => {
                    StatusCode::PAYLOAD_TOO_LARGE
                }
                ValidationError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                ValidationError::Truncated { .. }
                | ValidationError::Empty
                | ValidationError::MissingFile
                | ValidationError::Malformed(_) => StatusCode::BAD_REQUEST,
            },
            OracleError::CapacityExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            OracleError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
            OracleError::Scoring(_)
            | OracleError::BackendUnavailable(_)
            | OracleError::Provenance(_)
            | OracleError::Forecast(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable kind used in error bodies and metric labels.
    pub fn error_kind(&self) -> &'static str {
        match self {
            OracleError::Validation(_) => "validation_error",
            OracleError::CapacityExceeded { .. } => "capacity_exceeded",
            OracleError::DeadlineExceeded(_) => "deadline_exceeded",
            OracleError::Scoring(_) | OracleError::BackendUnavailable(_) => "scoring_error",
            OracleError::Provenance(_) => "provenance_error",
            OracleError::Forecast(_) => "forecast_error",
            OracleError::Config(_) | OracleError::InvalidConfig { .. } => "config_error",
            _ => "internal_error",
        }
    }

    /// Check if the caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OracleError::CapacityExceeded { .. }
                | OracleError::DeadlineExceeded(_)
                | OracleError::BackendUnavailable(_)
        )
    }
}

impl From<serde_json::Error> for OracleError {
    fn from(e: serde_json::Error) -> Self {
        OracleError::Serialization(e.to_string())
    }
}

/// JSON body returned for every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error_kind: &'static str,
    pub message: String,
}

impl IntoResponse for OracleError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.error_kind();

        if status.is_server_error() {
            match status {
                StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
                    warn!(error_kind = kind, error = %self, "Request failed upstream")
                }
                _ => error!(error_kind = kind, error = %self, "Request failed"),
            }
        }

        // Internal details stay in the log.
        let message = match &self {
            OracleError::Io(_) | OracleError::Serialization(_) | OracleError::Internal(_) => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let mut response = (status, Json(ErrorBody { error_kind: kind, message })).into_response();

        if let OracleError::CapacityExceeded { retry_after } = &self {
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, OracleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_status_codes() {
        let oversize = OracleError::from(ValidationError::Oversize { size: 6, max: 5 });
        assert_eq!(oversize.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let envelope =
            OracleError::from(ValidationError::BodyTooLarge("length limit exceeded".into()));
        assert_eq!(envelope.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(envelope.error_kind(), "validation_error");

        let media = OracleError::from(ValidationError::UnsupportedMediaType("text/plain".into()));
        assert_eq!(media.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let truncated = OracleError::from(ValidationError::Truncated {
            received: 3,
            declared: Some(10),
        });
        assert_eq!(truncated.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(truncated.error_kind(), "validation_error");
    }

    #[test]
    fn test_admission_status_codes() {
        let capacity = OracleError::CapacityExceeded {
            retry_after: Duration::from_secs(1),
        };
        assert_eq!(capacity.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert!(capacity.is_retryable());

        let deadline = OracleError::DeadlineExceeded(Duration::from_millis(250));
        assert_eq!(deadline.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(deadline.error_kind(), "deadline_exceeded");
    }

    #[test]
    fn test_collaborator_errors_are_bad_gateway() {
        for err in [
            OracleError::Scoring("bad json".into()),
            OracleError::BackendUnavailable("refused".into()),
            OracleError::Provenance("ledger down".into()),
            OracleError::Forecast("timeout".into()),
        ] {
            assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        }
    }

    #[test]
    fn test_capacity_response_has_retry_after() {
        let response = OracleError::CapacityExceeded {
            retry_after: Duration::from_secs(2),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "2");
    }

    #[test]
    fn test_internal_message_not_leaked() {
        let response = OracleError::Internal("mutex poisoned at 0xdeadbeef".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
