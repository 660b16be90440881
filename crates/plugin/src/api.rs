//! The plugin contract

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use sluice_buffer::{BytesItem, WriteError};
use sluice_protocol::{Event, Message};
use sluice_transport::PipeWriter;

use crate::{PluginError, Result};

/// Which role a plugin plays in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginKind {
    Input,
    Filter,
    Output,
}

impl PluginKind {
    /// The plugin-name prefix for this kind (`in-`, `filter-`, `out-`).
    pub fn prefix(self) -> &'static str {
        match self {
            PluginKind::Input => "in-",
            PluginKind::Filter => "filter-",
            PluginKind::Output => "out-",
        }
    }

    /// Derive the kind from a full plugin name such as `in-forward`.
    pub fn from_name(name: &str) -> Option<Self> {
        if name.starts_with("in-") {
            Some(PluginKind::Input)
        } else if name.starts_with("filter-") {
            Some(PluginKind::Filter)
        } else if name.starts_with("out-") {
            Some(PluginKind::Output)
        } else {
            None
        }
    }
}

impl std::fmt::Display for PluginKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PluginKind::Input => "input",
            PluginKind::Filter => "filter",
            PluginKind::Output => "output",
        })
    }
}

/// Handle an input unit uses to push events to the host.
///
/// Cheap to clone; every emission is stamped with the unit's id and
/// serialised through the plugin's single transport writer.
#[derive(Clone)]
pub struct Emitter {
    unit_id: i32,
    writer: Arc<Mutex<PipeWriter>>,
}

impl Emitter {
    pub(crate) fn new(unit_id: i32, writer: Arc<Mutex<PipeWriter>>) -> Self {
        Self { unit_id, writer }
    }

    /// Emit one event. Valid any time after the unit's `start`.
    pub async fn emit(&self, event: Event) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.send(&Message::event(self.unit_id, event)).await?;
        Ok(())
    }

    /// Emit an atomic batch of events.
    pub async fn emit_chain(&self, events: Vec<Event>) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer
            .send(&Message::event_chain(self.unit_id, events))
            .await?;
        Ok(())
    }

    /// Send a log line to the host, which re-logs it under the plugin name.
    pub async fn log(&self, line: impl Into<String>) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.send(&Message::stdout_line(line)).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter").field("unit_id", &self.unit_id).finish()
    }
}

/// An event producer.
///
/// `init` receives the unit's [`Emitter`]; `start` begins production, which
/// usually means spawning the plugin's own tasks. After `stop` returns the
/// plugin must not emit again.
#[async_trait]
pub trait InputPlugin: Send {
    async fn init(&mut self, ctx: Emitter, config: &str) -> Result<()>;
    async fn start(&mut self) -> Result<()>;
    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}

/// An event transformer.
///
/// `filter` consumes an event and returns the events to re-emit in its
/// place; an empty vec drops the event. Re-emissions are observed by later
/// filters and outputs only.
#[async_trait]
pub trait FilterPlugin: Send {
    async fn init(&mut self, config: &str) -> Result<()>;
    async fn filter(&mut self, event: Event) -> Result<Vec<Event>>;
    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}

/// An event sink.
///
/// `encode` turns an event into a byte-countable buffer item; `write`
/// delivers a chunk of items, reporting partial progress through
/// [`WriteError::committed`] so only the remainder is retried.
#[async_trait]
pub trait OutputPlugin: Send {
    async fn init(&mut self, config: &str) -> Result<()>;
    async fn start(&mut self) -> Result<()> {
        Ok(())
    }
    fn encode(&mut self, event: &Event) -> Result<BytesItem>;
    async fn write(&mut self, items: &[BytesItem]) -> std::result::Result<(), WriteError>;
    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Decode a unit configuration string into a plugin's own config struct.
///
/// The host serialises unit options as a JSON map; an empty string means an
/// empty map, so plugins with all-default configs need no special casing.
pub fn parse_config<T: DeserializeOwned>(config: &str) -> Result<T> {
    let raw = if config.trim().is_empty() { "{}" } else { config };
    serde_json::from_str(raw).map_err(PluginError::ConfigDecode)
}
