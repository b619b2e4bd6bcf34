//! # Error Handling
//!
//! Defines the error taxonomy for the relay pipeline and the single place where
//! errors are converted to HTTP responses.
//!
//! ## Propagation policy:
//! - **InvalidInput / Classification**: abort the request, surfaced to the HTTP caller
//! - **Publish / Sink**: logged by the ingestion service and swallowed; the
//!   classification itself succeeded, so the caller still gets a success response
//! - **Connection**: logged and retried opportunistically on the next publish or
//!   heartbeat tick; never terminates the process
//!
//! Every route returns `Result<HttpResponse, AppError>` and relies on the
//! `ResponseError` impl below, so the taxonomy-to-status mapping lives in exactly
//! one place instead of being duplicated per handler.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Error taxonomy for the audio relay.
///
/// ## Variants:
/// - **InvalidInput**: empty or malformed audio from the client (400)
/// - **Classification**: the external inference service call failed (500)
/// - **Publish**: bus unreachable or acknowledgment timed out (never surfaced to HTTP)
/// - **Sink**: append to the durable result store failed (never surfaced to HTTP)
/// - **Connection**: bus connect/reconnect attempt failed
/// - **Config**: configuration file or environment variable problems
/// - **Internal**: anything else server-side
#[derive(Debug)]
pub enum AppError {
    /// Empty or malformed audio data from the client
    InvalidInput(String),

    /// The external classifier call failed (timeout, bad response, model fault)
    Classification(String),

    /// Bus publish failed or the broker acknowledgment timed out
    Publish(String),

    /// Writing to the append-only result store failed
    Sink(String),

    /// Bus connect/reconnect attempt failed
    Connection(String),

    /// Configuration file or environment variable problems
    Config(String),

    /// Internal server errors
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AppError::Classification(msg) => write!(f, "Classification failed: {}", msg),
            AppError::Publish(msg) => write!(f, "Bus publish failed: {}", msg),
            AppError::Sink(msg) => write!(f, "Result sink write failed: {}", msg),
            AppError::Connection(msg) => write!(f, "Bus connection failed: {}", msg),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

/// Single taxonomy-to-HTTP-status mapping layer, applied uniformly across routes.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "classification_error",
///     "message": "inference service returned 503",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
///
/// Publish/Sink/Connection errors normally never reach a handler (the ingestion
/// service logs and swallows them), but if one does it maps to a 500 like any
/// other server-side fault.
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::InvalidInput(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "invalid_input",
                msg.clone(),
            ),
            AppError::Classification(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "classification_error",
                msg.clone(),
            ),
            AppError::Publish(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "publish_error",
                msg.clone(),
            ),
            AppError::Sink(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "sink_error",
                msg.clone(),
            ),
            AppError::Connection(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "connection_error",
                msg.clone(),
            ),
            AppError::Config(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Shorthand for `Result<T, AppError>` used throughout the pipeline.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_invalid_input_maps_to_bad_request() {
        let err = AppError::InvalidInput("empty audio buffer".to_string());
        assert_eq!(err.error_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_pipeline_errors_map_to_internal() {
        let errors = vec![
            AppError::Classification("model fault".to_string()),
            AppError::Publish("ack timeout".to_string()),
            AppError::Sink("disk full".to_string()),
            AppError::Connection("broker unreachable".to_string()),
        ];
        for err in errors {
            assert_eq!(
                err.error_response().status(),
                StatusCode::INTERNAL_SERVER_ERROR
            );
        }
    }

    #[test]
    fn test_display_includes_cause() {
        let err = AppError::Classification("inference service returned 503".to_string());
        assert!(err.to_string().contains("503"));
    }
}
