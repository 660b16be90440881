//! Sluice - Protocol
//!
//! The types that flow through the pipeline and between host and plugins:
//! - [`Value`] / [`Record`] - the dynamic record value model
//! - [`Event`] - tag + time + record, the unit of data flow
//! - [`Message`] - typed frames of the host-plugin wire protocol
//! - [`codec`] - MessagePack frame encoding and incremental decoding
//!
//! # Wire format
//!
//! A frame is three consecutive MessagePack values: the frame type (u8), the
//! unit id (i32), and a type-dependent payload. Frames are self-describing;
//! there is no length prefix. Strings and byte strings are distinguished on
//! the wire, but readers that require a string accept UTF-8 byte strings.

pub mod codec;
mod error;
mod event;
mod message;
mod value;


pub use error::ProtocolError;
pub use event::Event;
pub use message::{Message, MessageType, Payload, PluginInfo};
pub use value::{Record, Value};

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Current host-plugin protocol version
pub const PROTO_VERSION: u8 = 1;
