//! Routing error types

use thiserror::Error;

/// Errors from route registration
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Pattern failed to compile; registration is rejected
    #[error("invalid route pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
