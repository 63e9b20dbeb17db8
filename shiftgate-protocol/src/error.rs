//! Protocol error types.

use thiserror::Error;

/// Errors raised while framing or parsing messages.
///
/// The first three variants are transport failures: the peer sent a frame
/// that cannot be trusted, and the connection must be closed without a
/// response. Everything else is recoverable at the request level.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("incomplete header: got {received} of 8 bytes")]
    IncompleteHeader { received: usize },

    #[error("invalid frame size: total_size={total_size}, text_size={text_size} (max {max})")]
    InvalidSize {
        total_size: u32,
        text_size: u32,
        max: u32,
    },

    #[error("incomplete body: got {received} of {expected} bytes")]
    IncompleteBody { expected: usize, received: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

impl ProtocolError {
    /// Returns whether this error is fatal to the connection.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProtocolError::IncompleteHeader { .. }
                | ProtocolError::InvalidSize { .. }
                | ProtocolError::IncompleteBody { .. }
                | ProtocolError::Io(_)
        )
    }
}
