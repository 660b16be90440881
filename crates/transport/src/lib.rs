//! Sluice - Transport
//!
//! A [`Pipe`] is a bidirectional stream of self-describing frames between the
//! host and one plugin. Two constructions share identical framing, so
//! embedded and external plugins are indistinguishable upstream:
//!
//! - [`Pipe::in_process`] - a duplex byte channel pair for embedded plugins
//! - [`Pipe::new`] - any `AsyncRead`/`AsyncWrite` pair, conventionally a
//!   child process's stdout and stdin
//!
//! A decode error is fatal for the connection; the owner treats it like
//! plugin death and defers to the supervisor.

mod error;
mod pipe;

#[cfg(test)]
mod pipe_test;

pub use error::TransportError;
pub use pipe::{Pipe, PipeReader, PipeWriter};

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;
