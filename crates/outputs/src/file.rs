//! File output - JSON lines appended to a single file

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use sluice_buffer::{BytesItem, WriteError};
use sluice_plugin::{parse_config, OutputPlugin, PluginError, Result};
use sluice_protocol::{Event, Value};

#[cfg(test)]
#[path = "file_test.rs"]
mod file_test;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Destination path, opened in append mode
    pub path: String,
}

/// JSON-lines file sink.
#[derive(Default)]
pub struct FileOutput {
    config: FileConfig,
    file: Option<tokio::fs::File>,
}

#[async_trait]
impl OutputPlugin for FileOutput {
    async fn init(&mut self, config: &str) -> Result<()> {
        self.config = parse_config(config)?;
        if self.config.path.is_empty() {
            return Err(PluginError::config("file output requires a path"));
        }
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        if let Some(parent) = std::path::Path::new(&self.config.path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.path)
            .await?;
        self.file = Some(file);
        Ok(())
    }

    fn encode(&mut self, event: &Event) -> Result<BytesItem> {
        let line = serde_json::json!({
            "tag": event.tag,
            "time": event.time.to_rfc3339_opts(SecondsFormat::Millis, true),
            "record": Value::Map(event.record.clone()),
        });
        let mut bytes = serde_json::to_vec(&line)?;
        bytes.push(b'\n');
        Ok(BytesItem::from(bytes))
    }

    async fn write(&mut self, items: &[BytesItem]) -> std::result::Result<(), WriteError> {
        let Some(file) = self.file.as_mut() else {
            return Err(WriteError::total("file output is not started"));
        };
        for (committed, item) in items.iter().enumerate() {
            if let Err(e) = file.write_all(item.as_slice()).await {
                return Err(WriteError::new(committed, e.to_string()));
            }
        }
        if let Err(e) = file.flush().await {
            // All bytes were handed to the file; a flush failure retries the
            // chunk, which at-least-once delivery permits.
            return Err(WriteError::total(e.to_string()));
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }
}
