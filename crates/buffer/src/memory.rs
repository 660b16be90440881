//! In-memory chunk queue with a single flusher task
//!
//! The queue keeps the head chunk at the back (accepting pushes) and the tail
//! at the front (next to flush). One mutex guards both; the write to the
//! handler is performed with the lock held, which is what makes the
//! at-most-one-concurrent-write guarantee hold without further machinery.
//!
//! Producers never block on the flusher: retiring a head chunk stores a
//! wake permit in a [`tokio::sync::Notify`], which the flusher consumes
//! whenever it is ready.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::chunk::MemoryChunk;
use crate::error::{BufferError, WriteError};
use crate::options::BufferOptions;
use crate::{Result, Sizer};

/// Destination for retired chunks.
///
/// `write` receives the un-committed items of one chunk in insertion order.
/// On failure the returned [`WriteError`] reports how many leading items were
/// committed; the buffer retries the remainder on the next flush.
#[async_trait]
pub trait WriteHandler<T: Sizer>: Send + Sync {
    async fn write(&self, items: &[T]) -> std::result::Result<(), WriteError>;
}

/// Per-output bounded queue of size-capped chunks.
pub struct MemoryBuffer<T> {
    opts: BufferOptions,
    queue: Mutex<VecDeque<MemoryChunk<T>>>,
    wake: Notify,
    closed: AtomicBool,
    handler: Arc<dyn WriteHandler<T>>,
    metrics: Arc<BufferMetrics>,
}

impl<T: Sizer + Send + Sync + 'static> MemoryBuffer<T> {
    /// Create a buffer with the given policy and write handler.
    ///
    /// The flusher is not running yet; call [`MemoryBuffer::spawn_flusher`].
    pub fn new(mut opts: BufferOptions, handler: Arc<dyn WriteHandler<T>>) -> Arc<Self> {
        // A queue must be able to hold at least the head chunk.
        opts.max_queue_size = opts.max_queue_size.max(1);
        Arc::new(Self {
            opts,
            queue: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            closed: AtomicBool::new(false),
            handler,
            metrics: Arc::new(BufferMetrics::new()),
        })
    }

    /// Start the single flusher task for this buffer.
    pub fn spawn_flusher(self: &Arc<Self>) -> JoinHandle<()> {
        let buf = Arc::clone(self);
        tokio::spawn(async move {
            let period = buf.opts.flush_interval.max(std::time::Duration::from_millis(1));
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = buf.wake.notified() => {}
                    _ = tick.tick() => {}
                }
                if buf.closed.load(Ordering::Acquire) {
                    return;
                }
                buf.flush_tail().await;
            }
        })
    }

    /// Append an item to the head chunk.
    ///
    /// Retires the head (and wakes the flusher) when the item would not fit;
    /// evicts the oldest chunk when the queue would exceed its cap.
    pub async fn push(&self, item: T) -> Result<()> {
        let n = item.size();
        if n > self.opts.max_chunk_size {
            return Err(BufferError::ItemTooLarge {
                size: n,
                max: self.opts.max_chunk_size,
            });
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(BufferError::Closed);
        }

        let mut queue = self.queue.lock().await;
        let needs_new = match queue.back() {
            None => true,
            Some(head) => head.size() + n > self.opts.max_chunk_size,
        };
        if needs_new {
            if !queue.is_empty() {
                // Head retired: hand the flusher a permit, never block on it.
                self.wake.notify_one();
            }
            queue.push_back(MemoryChunk::new());
            if queue.len() > self.opts.max_queue_size {
                queue.pop_front();
                self.metrics.record_eviction();
                tracing::warn!(
                    buffer = %self.opts.name,
                    max_queue_size = self.opts.max_queue_size,
                    "queue full, evicted oldest chunk"
                );
            }
        }
        if let Some(head) = queue.back_mut() {
            head.push(item);
        }
        self.metrics.record_push(n);
        Ok(())
    }

    /// One flush attempt against the tail chunk.
    ///
    /// Returns true if a chunk was fully written and removed.
    pub async fn flush_tail(&self) -> bool {
        let mut queue = self.queue.lock().await;
        let Some(chunk) = queue.front() else {
            return false;
        };
        let pending = chunk.remaining().len();
        let result = self.handler.write(chunk.remaining()).await;
        match result {
            Ok(()) => {
                queue.pop_front();
                self.metrics.record_flush(pending as u64);
                true
            }
            Err(err) => {
                self.metrics.record_write_error();
                tracing::warn!(
                    buffer = %self.opts.name,
                    committed = err.committed,
                    pending,
                    error = %err,
                    "chunk write failed, retaining remainder"
                );
                let mut removed = false;
                if let Some(chunk) = queue.front_mut() {
                    chunk.advance(err.committed);
                    if chunk.is_drained() {
                        queue.pop_front();
                        removed = true;
                    }
                }
                removed
            }
        }
    }

    /// Mark closed and drain every remaining chunk, tail to head, handing
    /// each to the handler once. Errors are swallowed; this is best effort.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Let a waiting flusher observe the flag and exit promptly.
        self.wake.notify_one();

        let mut queue = self.queue.lock().await;
        while let Some(chunk) = queue.pop_front() {
            if chunk.is_drained() {
                continue;
            }
            let pending = chunk.remaining().len();
            match self.handler.write(chunk.remaining()).await {
                Ok(()) => self.metrics.record_flush(pending as u64),
                Err(err) => {
                    tracing::warn!(
                        buffer = %self.opts.name,
                        error = %err,
                        "drain write failed, chunk dropped"
                    );
                }
            }
        }
    }

    /// Number of queued chunks, including the head.
    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub fn options(&self) -> &BufferOptions {
        &self.opts
    }

    pub fn metrics(&self) -> Arc<BufferMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Counters for one buffer
#[derive(Debug, Default)]
pub struct BufferMetrics {
    items_pushed: AtomicU64,
    bytes_pushed: AtomicU64,
    evictions: AtomicU64,
    chunks_flushed: AtomicU64,
    items_flushed: AtomicU64,
    write_errors: AtomicU64,
}

impl BufferMetrics {
    pub const fn new() -> Self {
        Self {
            items_pushed: AtomicU64::new(0),
            bytes_pushed: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            chunks_flushed: AtomicU64::new(0),
            items_flushed: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
        }
    }

    #[inline]
    fn record_push(&self, bytes: u64) {
        self.items_pushed.fetch_add(1, Ordering::Relaxed);
        self.bytes_pushed.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_flush(&self, items: u64) {
        self.chunks_flushed.fetch_add(1, Ordering::Relaxed);
        self.items_flushed.fetch_add(items, Ordering::Relaxed);
    }

    #[inline]
    fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Chunks lost to queue overflow.
    #[inline]
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> BufferMetricsSnapshot {
        BufferMetricsSnapshot {
            items_pushed: self.items_pushed.load(Ordering::Relaxed),
            bytes_pushed: self.bytes_pushed.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            chunks_flushed: self.chunks_flushed.load(Ordering::Relaxed),
            items_flushed: self.items_flushed.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of buffer metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferMetricsSnapshot {
    pub items_pushed: u64,
    pub bytes_pushed: u64,
    pub evictions: u64,
    pub chunks_flushed: u64,
    pub items_flushed: u64,
    pub write_errors: u64,
}
