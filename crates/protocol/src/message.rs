//! Host-plugin message frames

use sluice_buffer::BufferOptions;

use crate::error::ProtocolError;
use crate::event::Event;

/// Frame type codes of the host-plugin wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Host asks the plugin for its protocol version
    InfoRequest = 0,
    /// Plugin answers with [`PluginInfo`]
    InfoResponse = 1,
    /// Host pushes buffer options to an output unit
    BufferOption = 2,
    /// Host pushes a unit's serialised configuration
    Configure = 3,
    /// Host starts a unit
    Start = 4,
    /// Host stops a unit
    Stop = 5,
    /// Unit acknowledges stop
    Terminated = 6,
    /// One event
    Event = 7,
    /// An atomic batch of events
    EventChain = 8,
    /// Plugin log line, re-logged by the host
    Stdout = 9,
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::InfoRequest,
            1 => Self::InfoResponse,
            2 => Self::BufferOption,
            3 => Self::Configure,
            4 => Self::Start,
            5 => Self::Stop,
            6 => Self::Terminated,
            7 => Self::Event,
            8 => Self::EventChain,
            9 => Self::Stdout,
            other => return Err(ProtocolError::UnknownType(other)),
        })
    }
}

/// Version handshake payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginInfo {
    pub proto_ver: u8,
}

/// Type-dependent frame payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    Info(PluginInfo),
    Options(BufferOptions),
    Config(String),
    Event(Event),
    Events(Vec<Event>),
    Line(String),
}

/// One frame of the host-plugin transport.
///
/// `unit_id == 0` addresses the plugin itself rather than a configured unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: MessageType,
    pub unit_id: i32,
    pub payload: Payload,
}

impl Message {
    pub fn info_request() -> Self {
        Self {
            kind: MessageType::InfoRequest,
            unit_id: 0,
            payload: Payload::Empty,
        }
    }

    pub fn info_response(proto_ver: u8) -> Self {
        Self {
            kind: MessageType::InfoResponse,
            unit_id: 0,
            payload: Payload::Info(PluginInfo { proto_ver }),
        }
    }

    pub fn buffer_option(unit_id: i32, opts: BufferOptions) -> Self {
        Self {
            kind: MessageType::BufferOption,
            unit_id,
            payload: Payload::Options(opts),
        }
    }

    pub fn configure(unit_id: i32, config: impl Into<String>) -> Self {
        Self {
            kind: MessageType::Configure,
            unit_id,
            payload: Payload::Config(config.into()),
        }
    }

    pub fn start(unit_id: i32) -> Self {
        Self {
            kind: MessageType::Start,
            unit_id,
            payload: Payload::Empty,
        }
    }

    pub fn stop(unit_id: i32) -> Self {
        Self {
            kind: MessageType::Stop,
            unit_id,
            payload: Payload::Empty,
        }
    }

    pub fn terminated(unit_id: i32) -> Self {
        Self {
            kind: MessageType::Terminated,
            unit_id,
            payload: Payload::Empty,
        }
    }

    pub fn event(unit_id: i32, event: Event) -> Self {
        Self {
            kind: MessageType::Event,
            unit_id,
            payload: Payload::Event(event),
        }
    }

    pub fn event_chain(unit_id: i32, events: Vec<Event>) -> Self {
        Self {
            kind: MessageType::EventChain,
            unit_id,
            payload: Payload::Events(events),
        }
    }

    pub fn stdout_line(line: impl Into<String>) -> Self {
        Self {
            kind: MessageType::Stdout,
            unit_id: 0,
            payload: Payload::Line(line.into()),
        }
    }
}
