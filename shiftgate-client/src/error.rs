//! Client error types.

use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] shiftgate_protocol::ProtocolError),

    #[error("connect timeout after {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[error("request timeout after {0:?}")]
    RequestTimeout(std::time::Duration),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
