//! Error types for pipeprobe-core

use thiserror::Error;

/// Construction and supply errors
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Empty segment in path: {0:?}")]
    InvalidPath(String),

    #[error("Path {0:?} is both a value and a parent of other values")]
    PathConflict(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid generator: {0}")]
    InvalidGenerator(String),

    #[error("Base document must be a JSON object, got {0}")]
    RootNotObject(&'static str),

    #[error("Generated document is not a valid message: {0}")]
    InvalidMessage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Per-call failure recorded in a [`Response`](crate::Response).
///
/// `Timeout` is kept apart from the transport kinds so that "the pipeline
/// rejected the request" and "the confirmation never showed up in time" can
/// be counted separately.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("Encoding request failed: {0}")]
    Encode(String),

    #[error("Transport failed: {0}")]
    Transport(String),

    #[error("Endpoint rejected request: {status} - {body}")]
    Rejected { status: u16, body: String },

    #[error("Timed out waiting for confirmation")]
    Timeout,
}

impl CallError {
    /// Stable label used for metrics and CSV output.
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::Encode(_) => "encode",
            CallError::Transport(_) => "transport",
            CallError::Rejected { .. } => "rejected",
            CallError::Timeout => "timeout",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CallError::Timeout)
    }
}
