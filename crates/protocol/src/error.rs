//! Protocol error types

use thiserror::Error;

/// Errors from frame encoding and decoding.
///
/// Any decode failure is fatal for the connection that produced it.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame type code outside the protocol table
    #[error("unknown frame type: {0}")]
    UnknownType(u8),

    /// Payload shape does not match the frame type's schema
    #[error("malformed {kind} payload: {detail}")]
    Schema {
        kind: &'static str,
        detail: String,
    },

    /// Peer speaks a protocol version newer than ours
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    /// Underlying MessagePack decode failure
    #[error("decode failed: {0}")]
    Decode(String),

    /// Underlying MessagePack encode failure
    #[error("encode failed: {0}")]
    Encode(String),
}

impl ProtocolError {
    pub(crate) fn schema(kind: &'static str, detail: impl Into<String>) -> Self {
        Self::Schema {
            kind,
            detail: detail.into(),
        }
    }
}
