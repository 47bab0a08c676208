use std::io;

use thiserror::Error;

/// A payload that does not match the command schema.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed command: {0}")]
    Json(#[from] serde_json::Error),
    #[error("command is missing an action")]
    MissingAction,
    #[error("frame exceeds {limit} bytes without a newline")]
    FrameTooLong { limit: usize },
}

/// Failure reported by an automation backend.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("unsupported operating system: {0}")]
    Unsupported(String),
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: &'static str,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Why a decoded command could not be carried out.
///
/// The `Display` text is what peers receive in `{"error": ...}` replies.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("no URL provided")]
    MissingArgument,
    #[error("{0}")]
    AutomationFailed(String),
}

impl From<PlatformError> for ExecutionError {
    fn from(err: PlatformError) -> Self {
        ExecutionError::AutomationFailed(err.to_string())
    }
}

/// Connection-level failures. Always end the affected connection only.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("websocket failure: {0}")]
    WebSocket(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl From<axum::Error> for TransportError {
    fn from(err: axum::Error) -> Self {
        TransportError::WebSocket(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::WebSocket(err.to_string())
    }
}
