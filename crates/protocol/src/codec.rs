//! Frame codec
//!
//! Encodes a [`Message`] as three consecutive MessagePack values and decodes
//! incrementally from a byte buffer. [`decode`] returns `Ok(None)` when the
//! buffer ends inside a frame, so callers can read more bytes and retry; any
//! other failure is a hard protocol error.

use std::io::Cursor;
use std::time::Duration;

use chrono::DateTime;
use rmpv::Value as Wire;
use sluice_buffer::BufferOptions;

use crate::error::ProtocolError;
use crate::event::Event;
use crate::message::{Message, MessageType, Payload, PluginInfo};
use crate::value::Value;
use crate::Result;

/// Encode a message, appending its frame to `buf`.
pub fn encode(msg: &Message, buf: &mut Vec<u8>) -> Result<()> {
    write_wire(buf, &Wire::Integer(u64::from(msg.kind as u8).into()))?;
    write_wire(buf, &Wire::Integer(i64::from(msg.unit_id).into()))?;
    let payload = match &msg.payload {
        Payload::Empty => Wire::Nil,
        Payload::Info(info) => Wire::Map(vec![(
            Wire::String("proto_ver".into()),
            Wire::Integer(u64::from(info.proto_ver).into()),
        )]),
        Payload::Options(opts) => options_to_wire(opts),
        Payload::Config(s) | Payload::Line(s) => Wire::String(s.clone().into()),
        Payload::Event(ev) => event_to_wire(ev),
        Payload::Events(evs) => Wire::Array(evs.iter().map(event_to_wire).collect()),
    };
    write_wire(buf, &payload)
}

/// Decode one frame from the front of `buf`.
///
/// Returns the message and the number of bytes consumed, or `None` if the
/// buffer holds only a partial frame.
pub fn decode(buf: &[u8]) -> Result<Option<(Message, usize)>> {
    let mut cur = Cursor::new(buf);

    let Some(kind_wire) = read_wire(&mut cur)? else {
        return Ok(None);
    };
    let Some(unit_wire) = read_wire(&mut cur)? else {
        return Ok(None);
    };
    let Some(payload_wire) = read_wire(&mut cur)? else {
        return Ok(None);
    };

    let code = kind_wire
        .as_u64()
        .and_then(|c| u8::try_from(c).ok())
        .ok_or_else(|| ProtocolError::schema("frame", "type must be a small integer"))?;
    let kind = MessageType::try_from(code)?;

    let unit_id = unit_wire
        .as_i64()
        .and_then(|u| i32::try_from(u).ok())
        .ok_or_else(|| ProtocolError::schema("frame", "unit id must be a 32-bit integer"))?;

    let payload = match kind {
        MessageType::InfoRequest
        | MessageType::Start
        | MessageType::Stop
        | MessageType::Terminated => Payload::Empty,
        MessageType::InfoResponse => Payload::Info(info_from_wire(payload_wire)?),
        MessageType::BufferOption => Payload::Options(options_from_wire(payload_wire)?),
        MessageType::Configure => Payload::Config(wire_str(payload_wire).ok_or_else(|| {
            ProtocolError::schema("configure", "payload must be a string")
        })?),
        MessageType::Stdout => Payload::Line(
            wire_str(payload_wire)
                .ok_or_else(|| ProtocolError::schema("stdout", "payload must be a string"))?,
        ),
        MessageType::Event => Payload::Event(event_from_wire(payload_wire)?),
        MessageType::EventChain => {
            let Wire::Array(items) = payload_wire else {
                return Err(ProtocolError::schema("event chain", "payload must be an array"));
            };
            Payload::Events(
                items
                    .into_iter()
                    .map(event_from_wire)
                    .collect::<Result<Vec<_>>>()?,
            )
        }
    };

    let consumed = cur.position() as usize;
    Ok(Some((Message { kind, unit_id, payload }, consumed)))
}

fn write_wire(buf: &mut Vec<u8>, value: &Wire) -> Result<()> {
    rmpv::encode::write_value(buf, value).map_err(|e| ProtocolError::Encode(e.to_string()))
}

fn read_wire(cur: &mut Cursor<&[u8]>) -> Result<Option<Wire>> {
    match rmpv::decode::read_value(cur) {
        Ok(value) => Ok(Some(value)),
        Err(ref e) if is_truncated(e) => Ok(None),
        Err(e) => Err(ProtocolError::Decode(e.to_string())),
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

/// String extraction honouring the bytes-as-UTF-8 contract.
fn wire_str(value: Wire) -> Option<String> {
    match value {
        Wire::String(s) => s.into_str(),
        Wire::Binary(b) => String::from_utf8(b).ok(),
        _ => None,
    }
}

fn event_to_wire(ev: &Event) -> Wire {
    Wire::Array(vec![
        Wire::String(ev.tag.clone().into()),
        Wire::Integer(ev.time.timestamp().into()),
        Wire::Integer(u64::from(ev.time.timestamp_subsec_nanos()).into()),
        Value::Map(ev.record.clone()).to_wire(),
    ])
}

fn event_from_wire(value: Wire) -> Result<Event> {
    let Wire::Array(items) = value else {
        return Err(ProtocolError::schema("event", "payload must be an array"));
    };
    if items.len() != 4 {
        return Err(ProtocolError::schema(
            "event",
            format!("expected [tag, secs, nanos, record], got {} elements", items.len()),
        ));
    }
    let mut items = items.into_iter();

    // Lengths checked above; the iterator yields exactly four values.
    let tag = items
        .next()
        .and_then(wire_str)
        .ok_or_else(|| ProtocolError::schema("event", "tag must be a string"))?;
    let secs = items
        .next()
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ProtocolError::schema("event", "seconds must be an integer"))?;
    let nanos = items
        .next()
        .and_then(|v| v.as_u64())
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| ProtocolError::schema("event", "nanoseconds must be a u32"))?;
    let record = match items.next().map(Value::from_wire) {
        Some(Value::Map(map)) => map,
        _ => return Err(ProtocolError::schema("event", "record must be a map")),
    };

    let time = DateTime::from_timestamp(secs, nanos).unwrap_or(DateTime::UNIX_EPOCH);
    Ok(Event::with_time(tag, time, record))
}

fn info_from_wire(value: Wire) -> Result<PluginInfo> {
    let Wire::Map(pairs) = value else {
        return Err(ProtocolError::schema("info", "payload must be a map"));
    };
    for (k, v) in pairs {
        if wire_str(k).as_deref() == Some("proto_ver") {
            let ver = v
                .as_u64()
                .and_then(|n| u8::try_from(n).ok())
                .ok_or_else(|| ProtocolError::schema("info", "proto_ver must be a u8"))?;
            return Ok(PluginInfo { proto_ver: ver });
        }
    }
    Err(ProtocolError::schema("info", "missing proto_ver"))
}

fn options_to_wire(opts: &BufferOptions) -> Wire {
    Wire::Map(vec![
        (
            Wire::String("name".into()),
            Wire::String(opts.name.clone().into()),
        ),
        (
            Wire::String("max_chunk_size".into()),
            Wire::Integer(opts.max_chunk_size.into()),
        ),
        (
            Wire::String("max_queue_size".into()),
            Wire::Integer((opts.max_queue_size as u64).into()),
        ),
        (
            Wire::String("flush_interval_ms".into()),
            Wire::Integer((opts.flush_interval.as_millis() as u64).into()),
        ),
    ])
}

fn options_from_wire(value: Wire) -> Result<BufferOptions> {
    let Wire::Map(pairs) = value else {
        return Err(ProtocolError::schema("buffer options", "payload must be a map"));
    };
    let mut opts = BufferOptions::default();
    for (k, v) in pairs {
        let Some(key) = wire_str(k) else { continue };
        match key.as_str() {
            "name" => {
                opts.name = wire_str(v).ok_or_else(|| {
                    ProtocolError::schema("buffer options", "name must be a string")
                })?;
            }
            "max_chunk_size" => {
                opts.max_chunk_size = v.as_u64().ok_or_else(|| {
                    ProtocolError::schema("buffer options", "max_chunk_size must be a u64")
                })?;
            }
            "max_queue_size" => {
                opts.max_queue_size = v
                    .as_u64()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| {
                        ProtocolError::schema("buffer options", "max_queue_size must be a u64")
                    })?;
            }
            "flush_interval_ms" => {
                let ms = v.as_u64().ok_or_else(|| {
                    ProtocolError::schema("buffer options", "flush_interval_ms must be a u64")
                })?;
                opts.flush_interval = Duration::from_millis(ms);
            }
            _ => {}
        }
    }
    Ok(opts)
}
