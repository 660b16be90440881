//! Buffer error types

use std::fmt;

use thiserror::Error;

/// Errors surfaced to buffer producers
#[derive(Debug, Error)]
pub enum BufferError {
    /// Item larger than the chunk cap; the producer decides to drop or split
    #[error("item too large for buffer: {size} bytes, max {max}")]
    ItemTooLarge { size: u64, max: u64 },

    /// Push after close
    #[error("buffer is closed")]
    Closed,
}

/// A failed handler write, carrying how many leading items were committed
/// before the failure so the buffer can retry only the remainder.
#[derive(Debug)]
pub struct WriteError {
    /// Items successfully committed before the failure
    pub committed: usize,

    /// Human-readable failure description
    pub reason: String,
}

impl WriteError {
    pub fn new(committed: usize, reason: impl Into<String>) -> Self {
        Self {
            committed,
            reason: reason.into(),
        }
    }

    /// A failure with no partial progress.
    pub fn total(reason: impl Into<String>) -> Self {
        Self::new(0, reason)
    }
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "write failed after {} items: {}", self.committed, self.reason)
    }
}

impl std::error::Error for WriteError {}
