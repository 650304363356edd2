//! Error types for pipeprobe-client

use thiserror::Error;

/// Client and consumer construction errors.
///
/// Failures of individual calls never use this type; they are reported as
/// [`CallError`](pipeprobe_core::CallError) inside the returned `Response`.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[cfg(feature = "kafka")]
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}

impl ClientError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ClientError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type alias for client construction
pub type Result<T> = std::result::Result<T, ClientError>;
