//! Plugin SDK error types

use thiserror::Error;

use sluice_transport::TransportError;

/// Errors inside a plugin or its frame loop
#[derive(Debug, Error)]
pub enum PluginError {
    /// Bad unit configuration; the unit does not start
    #[error("invalid plugin configuration: {0}")]
    Config(String),

    /// Configuration failed to deserialise
    #[error("configuration decode failed: {0}")]
    ConfigDecode(#[from] serde_json::Error),

    /// Plugin-level I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Transport failure; ends the frame loop
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Anything else fatal to the plugin
    #[error("plugin failed: {0}")]
    Runtime(String),
}

impl PluginError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }
}
