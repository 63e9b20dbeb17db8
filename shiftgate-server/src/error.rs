//! Server error types.

use crate::downstream::DownstreamError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors that end a connection or stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] shiftgate_protocol::ProtocolError),

    #[error("data store error: {0}")]
    Store(#[from] StoreError),

    #[error("server shutting down")]
    ShuttingDown,
}

/// Errors a handler reports. Each becomes the `message` of a `fail`
/// response; none of them closes the connection.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Downstream(#[from] DownstreamError),

    #[error("invalid parameter: {0}")]
    InvalidField(&'static str),

    #[error("encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Rejected(String),
}
