//! Sluice - Output buffering
//!
//! Every output exec unit owns one [`MemoryBuffer`]: a bounded queue of
//! size-capped chunks. Producers push byte-countable items into the head
//! chunk; a single flusher task per buffer hands retired chunks to a
//! [`WriteHandler`] on a wake signal or a periodic tick.
//!
//! # Guarantees
//!
//! - At most one in-flight write per buffer
//! - Chunks flush in FIFO order; items within a chunk in insertion order
//! - Data is lost only through the explicit overflow-eviction path, which is
//!   counted and logged
//!
//! # Non-guarantees
//!
//! - No ordering across different buffers
//! - No durability across process restarts

mod chunk;
mod error;
mod memory;
mod options;


pub use chunk::MemoryChunk;
pub use error::{BufferError, WriteError};
pub use memory::{BufferMetrics, BufferMetricsSnapshot, MemoryBuffer, WriteHandler};
pub use options::BufferOptions;

use bytes::Bytes;

/// Any byte-countable item an output plugin produces for its buffer.
pub trait Sizer {
    /// Size of the item in bytes, as accounted against the chunk cap.
    fn size(&self) -> u64;
}

/// An owned byte payload, the common currency between output plugins and
/// their buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytesItem(pub Bytes);

impl BytesItem {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl Sizer for BytesItem {
    fn size(&self) -> u64 {
        self.0.len() as u64
    }
}

impl From<Vec<u8>> for BytesItem {
    fn from(v: Vec<u8>) -> Self {
        Self(Bytes::from(v))
    }
}

impl From<&str> for BytesItem {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl Sizer for String {
    fn size(&self) -> u64 {
        self.len() as u64
    }
}

impl Sizer for Bytes {
    fn size(&self) -> u64 {
        self.len() as u64
    }
}

/// Result type for buffer operations
pub type Result<T> = std::result::Result<T, BufferError>;
