//! Buffer policy options
//!
//! A named policy shared by any number of outputs. All fields default, so a
//! config file only specifies what it changes.

use std::time::Duration;

use serde::Deserialize;

/// Default maximum chunk size (8 MiB)
pub const DEFAULT_MAX_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// Default maximum queue length in chunks
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 256;

/// Default flush interval
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Buffering policy for output exec units
///
/// # Example
///
/// ```toml
/// [[buffer]]
/// name = "fast"
/// max_chunk_size = 1048576
/// max_queue_size = 64
/// flush_interval = "5s"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BufferOptions {
    /// Policy name referenced by output configurations
    pub name: String,

    /// Upper bound on a single chunk's byte total
    pub max_chunk_size: u64,

    /// Upper bound on the number of queued chunks; the oldest chunk is
    /// evicted when exceeded
    pub max_queue_size: usize,

    /// How often the flusher ticks even without a retired chunk
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
}

impl Default for BufferOptions {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl BufferOptions {
    /// Create a policy with the given name and defaults for everything else
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}
