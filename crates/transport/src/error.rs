//! Transport error types

use thiserror::Error;

use sluice_protocol::ProtocolError;

/// Errors from sending or receiving frames
#[derive(Debug, Error)]
pub enum TransportError {
    /// Peer closed the stream
    #[error("transport closed by peer")]
    Closed,

    /// Frame-level failure; the connection must be torn down
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Underlying stream failure
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// True when the peer went away rather than spoke garbage.
    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::Closed)
    }
}
