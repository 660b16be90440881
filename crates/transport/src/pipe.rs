//! Framed pipe over byte streams

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use sluice_protocol::{codec, Message};

use crate::error::TransportError;
use crate::Result;

/// Initial receive buffer capacity
const READ_BUFFER_CAPACITY: usize = 64 * 1024;

/// Byte capacity of one direction of an in-process pipe
const IN_PROCESS_CAPACITY: usize = 256 * 1024;

/// Receiving half of a pipe. Reads are single-task by design.
pub struct PipeReader {
    inner: Box<dyn AsyncRead + Send + Unpin>,
    buf: BytesMut,
}

/// Sending half of a pipe. The owner serialises writers with a mutex.
pub struct PipeWriter {
    inner: Box<dyn AsyncWrite + Send + Unpin>,
}

/// A bidirectional framed stream to one plugin.
pub struct Pipe {
    pub reader: PipeReader,
    pub writer: PipeWriter,
}

impl Pipe {
    /// Wrap a read/write pair, conventionally a child's stdout and stdin.
    pub fn new(
        read: impl AsyncRead + Send + Unpin + 'static,
        write: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            reader: PipeReader {
                inner: Box::new(read),
                buf: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            },
            writer: PipeWriter {
                inner: Box::new(write),
            },
        }
    }

    /// Create a connected in-process pipe pair with identical framing to the
    /// cross-process variant.
    pub fn in_process() -> (Pipe, Pipe) {
        let (host_side, plugin_side) = tokio::io::duplex(IN_PROCESS_CAPACITY);
        let (host_read, host_write) = tokio::io::split(host_side);
        let (plugin_read, plugin_write) = tokio::io::split(plugin_side);
        (
            Pipe::new(host_read, host_write),
            Pipe::new(plugin_read, plugin_write),
        )
    }

    pub fn split(self) -> (PipeReader, PipeWriter) {
        (self.reader, self.writer)
    }
}

impl PipeReader {
    /// Receive the next frame.
    ///
    /// Blocks until a complete frame is buffered. EOF maps to
    /// [`TransportError::Closed`]; a decode failure is fatal.
    pub async fn recv(&mut self) -> Result<Message> {
        loop {
            if let Some((msg, consumed)) = codec::decode(&self.buf)? {
                self.buf.advance(consumed);
                return Ok(msg);
            }
            let read = self.inner.read_buf(&mut self.buf).await?;
            if read == 0 {
                return Err(TransportError::Closed);
            }
        }
    }
}

impl PipeWriter {
    /// Encode and send one frame, flushing the underlying stream.
    pub async fn send(&mut self, msg: &Message) -> Result<()> {
        let mut frame = Vec::new();
        codec::encode(msg, &mut frame)?;
        self.inner.write_all(&frame).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Flush and shut down the write side, signalling EOF to the peer.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

impl std::fmt::Debug for Pipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipe")
            .field("buffered", &self.reader.buf.len())
            .finish()
    }
}
