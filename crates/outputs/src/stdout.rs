//! Stdout output - human-readable debug sink
//!
//! One line per event: dimmed timestamp, tag, compact JSON record. Meant for
//! development and `sluice` runs without a config file, not for production
//! throughput. Only useful embedded: an external plugin's stdout is its
//! transport.

use async_trait::async_trait;
use owo_colors::{OwoColorize, Style};
use serde::Deserialize;

use sluice_buffer::{BytesItem, WriteError};
use sluice_plugin::{parse_config, OutputPlugin, Result};
use sluice_protocol::{Event, Value};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StdoutConfig {
    /// Colorise output
    pub color: bool,
}

impl Default for StdoutConfig {
    fn default() -> Self {
        Self { color: true }
    }
}

/// Debug sink printing events to the process's stdout.
#[derive(Default)]
pub struct StdoutOutput {
    config: StdoutConfig,
}

#[async_trait]
impl OutputPlugin for StdoutOutput {
    async fn init(&mut self, config: &str) -> Result<()> {
        self.config = parse_config(config)?;
        Ok(())
    }

    fn encode(&mut self, event: &Event) -> Result<BytesItem> {
        let (time_style, tag_style) = if self.config.color {
            (Style::new().dimmed(), Style::new().cyan())
        } else {
            (Style::new(), Style::new())
        };
        let time = event.time.format("%H:%M:%S%.3f").to_string();
        let record = serde_json::to_string(&Value::Map(event.record.clone()))?;
        let line = format!(
            "{} {} {}\n",
            time.style(time_style),
            event.tag.style(tag_style),
            record
        );
        Ok(BytesItem::from(line.into_bytes()))
    }

    async fn write(&mut self, items: &[BytesItem]) -> std::result::Result<(), WriteError> {
        for item in items {
            print!("{}", String::from_utf8_lossy(item.as_slice()));
        }
        Ok(())
    }
}
