//! Engine error types

use thiserror::Error;

use sluice_routing::RoutingError;
use sluice_transport::TransportError;

/// Errors from registration and lifecycle.
///
/// Configuration errors fail registration before anything starts; transport
/// failures during operation are handled by the supervisor, not surfaced
/// here.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No embedded factory and no external executable for this plugin name
    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),

    /// Output references a buffer policy that was never registered
    #[error("no such buffer defined: {0}")]
    UnknownBuffer(String),

    /// Filter or output registered without a match pattern
    #[error("plugin {0} requires a match pattern")]
    MissingMatch(String),

    /// Invalid match pattern
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// Handshake or control traffic failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Plugin answered the handshake with a version newer than ours
    #[error("plugin speaks unsupported protocol version {0}")]
    UnsupportedProtocol(u8),

    /// Plugin never answered the handshake
    #[error("plugin handshake timed out")]
    HandshakeTimeout,

    /// Unit options could not be serialised for the Configure frame
    #[error("unit configuration is not serialisable: {0}")]
    Config(#[from] serde_json::Error),
}
