//! Forward input - TCP listener for the forward wire format
//!
//! Each connection carries a stream of MessagePack values. Three shapes are
//! accepted:
//!
//! - `[tag, time, record]` - one flat event
//! - `[tag, [[time, record], ...]]` - an array of entries under one tag
//! - `[tag, <bytes>]` - a nested chain: the bytes decode to a stream of
//!   `[time, record]` values
//!
//! Times are epoch seconds as int, uint or float, or the EventTime extension
//! (type 0, 4-byte seconds + 4-byte nanoseconds, big-endian).
//!
//! A malformed value poisons its connection; the connection is dropped and
//! the peer may reconnect.

use std::io::Cursor;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sluice_plugin::{parse_config, Emitter, InputPlugin, PluginError, Result};
use sluice_protocol::{Event, Value};

#[cfg(test)]
#[path = "forward_test.rs"]
mod forward_test;

/// Read buffer size per connection
const CONN_BUFFER_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Listen address
    pub bind: String,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:24224".to_string(),
        }
    }
}

/// TCP input speaking the forward wire format.
#[derive(Default)]
pub struct ForwardInput {
    config: ForwardConfig,
    ctx: Option<Emitter>,
    cancel: CancellationToken,
    accept_task: Option<JoinHandle<()>>,
}

#[async_trait]
impl InputPlugin for ForwardInput {
    async fn init(&mut self, ctx: Emitter, config: &str) -> Result<()> {
        self.config = parse_config(config)?;
        self.ctx = Some(ctx);
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        let Some(ctx) = self.ctx.clone() else {
            return Err(PluginError::runtime("forward input started before init"));
        };
        let listener = TcpListener::bind(&self.config.bind).await?;
        tracing::info!(bind = %self.config.bind, "forward input listening");

        let cancel = self.cancel.clone();
        self.accept_task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            tracing::debug!(%peer, "forward connection accepted");
                            let ctx = ctx.clone();
                            let cancel = cancel.clone();
                            tokio::spawn(async move {
                                run_connection(stream, ctx, cancel).await;
                            });
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                        }
                    },
                    _ = cancel.cancelled() => return,
                }
            }
        }));
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.cancel.cancel();
        if let Some(task) = self.accept_task.take() {
            let _ = task.await;
        }
        Ok(())
    }
}

async fn run_connection(mut stream: TcpStream, ctx: Emitter, cancel: CancellationToken) {
    let mut buf = BytesMut::with_capacity(CONN_BUFFER_CAPACITY);
    loop {
        // Drain every complete value already buffered.
        loop {
            let mut cur = Cursor::new(&buf[..]);
            let value = match rmpv::decode::read_value(&mut cur) {
                Ok(value) => value,
                Err(ref e) if is_truncated(e) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "malformed forward stream, dropping connection");
                    return;
                }
            };
            let consumed = cur.position() as usize;
            buf.advance(consumed);

            match entries_from_value(value) {
                Ok(events) => {
                    let batch = events.len();
                    if batch == 1 {
                        if let Some(event) = events.into_iter().next() {
                            if ctx.emit(event).await.is_err() {
                                return;
                            }
                        }
                    } else if batch > 1 {
                        if ctx.emit_chain(events).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "bad forward entry, dropping connection");
                    return;
                }
            }
        }

        tokio::select! {
            read = stream.read_buf(&mut buf) => match read {
                Ok(0) => return,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "forward connection read failed");
                    return;
                }
            },
            _ = cancel.cancelled() => return,
        }
    }
}

fn is_truncated(e: &rmpv::decode::Error) -> bool {
    use rmpv::decode::Error;
    match e {
        Error::InvalidMarkerRead(io) | Error::InvalidDataRead(io) => {
            io.kind() == std::io::ErrorKind::UnexpectedEof
        }
        _ => false,
    }
}

/// Expand one wire value into its events.
fn entries_from_value(value: rmpv::Value) -> Result<Vec<Event>> {
    let rmpv::Value::Array(items) = value else {
        return Err(PluginError::runtime("forward value must be an array"));
    };
    match items.len() {
        2 => {
            let mut items = items.into_iter();
            let tag = tag_from(items.next())?;
            match items.next() {
                Some(rmpv::Value::Binary(bytes)) => nested_entries(&tag, &bytes),
                Some(rmpv::Value::String(s)) => nested_entries(&tag, s.as_bytes()),
                Some(rmpv::Value::Array(entries)) => {
                    entries
                        .into_iter()
                        .map(|entry| entry_event(&tag, entry))
                        .collect()
                }
                _ => Err(PluginError::runtime("forward payload must be bytes or entries")),
            }
        }
        3 => {
            let mut items = items.into_iter();
            let tag = tag_from(items.next())?;
            let time = items
                .next()
                .ok_or_else(|| PluginError::runtime("missing time"))
                .and_then(|v| parse_time(&v))?;
            let record = record_from(items.next())?;
            Ok(vec![Event::with_time(tag, time, record)])
        }
        n => Err(PluginError::runtime(format!(
            "forward array must have 2 or 3 elements, got {n}"
        ))),
    }
}

/// Decode the `[time, record]` stream inside a nested chain.
fn nested_entries(tag: &str, bytes: &[u8]) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    let mut cur = Cursor::new(bytes);
    while (cur.position() as usize) < bytes.len() {
        let value = rmpv::decode::read_value(&mut cur)
            .map_err(|e| PluginError::runtime(format!("bad nested chain: {e}")))?;
        events.push(entry_event(tag, value)?);
    }
    Ok(events)
}

fn entry_event(tag: &str, entry: rmpv::Value) -> Result<Event> {
    let rmpv::Value::Array(pair) = entry else {
        return Err(PluginError::runtime("entry must be [time, record]"));
    };
    if pair.len() != 2 {
        return Err(PluginError::runtime("entry must be [time, record]"));
    }
    let mut pair = pair.into_iter();
    let time = pair
        .next()
        .ok_or_else(|| PluginError::runtime("missing time"))
        .and_then(|v| parse_time(&v))?;
    let record = record_from(pair.next())?;
    Ok(Event::with_time(tag, time, record))
}

fn tag_from(value: Option<rmpv::Value>) -> Result<String> {
    match value {
        Some(rmpv::Value::String(s)) => s
            .into_str()
            .ok_or_else(|| PluginError::runtime("tag must be UTF-8")),
        Some(rmpv::Value::Binary(b)) => String::from_utf8(b)
            .map_err(|_| PluginError::runtime("tag must be UTF-8")),
        _ => Err(PluginError::runtime("tag must be a string")),
    }
}

fn record_from(value: Option<rmpv::Value>) -> Result<sluice_protocol::Record> {
    match value.map(Value::from_wire) {
        Some(Value::Map(record)) => Ok(record),
        _ => Err(PluginError::runtime("record must be a map")),
    }
}

/// Compatible time parsing: epoch seconds as int/uint/float, or the
/// EventTime extension.
fn parse_time(value: &rmpv::Value) -> Result<DateTime<Utc>> {
    let time = match value {
        rmpv::Value::Integer(i) => {
            let secs = i
                .as_i64()
                .or_else(|| i.as_u64().and_then(|u| i64::try_from(u).ok()))
                .ok_or_else(|| PluginError::runtime("time out of range"))?;
            DateTime::from_timestamp(secs, 0)
        }
        rmpv::Value::F32(f) => from_float(f64::from(*f)),
        rmpv::Value::F64(f) => from_float(*f),
        rmpv::Value::Ext(0, data) if data.len() == 8 => {
            let secs = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
            let nanos = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
            DateTime::from_timestamp(i64::from(secs), nanos)
        }
        _ => return Err(PluginError::runtime("unsupported time encoding")),
    };
    time.ok_or_else(|| PluginError::runtime("time out of range"))
}

fn from_float(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}
