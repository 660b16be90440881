//! Tail input - follows a file, surviving rotations and restarts
//!
//! Polls the tailed path on an interval, emitting one event per complete
//! line. Rotation is detected by inode change; truncation by a shrinking
//! file. When a position file is configured, offsets are persisted after
//! every scan so a restart neither double-reads nor skips.

use std::io::SeekFrom;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sluice_plugin::{parse_config, Emitter, InputPlugin, PluginError, Result};
use sluice_protocol::{Event, Record, Value};

use crate::position::{PositionEntry, PositionFile};

#[cfg(test)]
#[path = "tail_test.rs"]
mod tail_test;

/// Line parsing mode
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LineFormat {
    /// The whole line becomes the `message` field
    #[default]
    Raw,
    /// The line is a JSON object; non-object lines fall back to raw
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TailConfig {
    /// Tag on emitted events
    pub tag: String,

    /// File to follow
    pub path: String,

    /// Position file for restart-safe offsets
    pub pos_file: Option<String>,

    /// Line parsing mode
    pub format: LineFormat,

    /// Read pre-existing content on first sight instead of starting at the
    /// end
    pub read_from_head: bool,

    /// How often to poll for new data
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            tag: "tail".to_string(),
            path: String::new(),
            pos_file: None,
            format: LineFormat::Raw,
            read_from_head: false,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// File tailer plugin.
#[derive(Default)]
pub struct TailInput {
    config: TailConfig,
    ctx: Option<Emitter>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl InputPlugin for TailInput {
    async fn init(&mut self, ctx: Emitter, config: &str) -> Result<()> {
        self.config = parse_config(config)?;
        if self.config.path.is_empty() {
            return Err(PluginError::config("tail input requires a path"));
        }
        self.ctx = Some(ctx);
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        let Some(ctx) = self.ctx.clone() else {
            return Err(PluginError::runtime("tail input started before init"));
        };
        let mut tailer = Tailer::new(self.config.clone())?;
        let interval = self.config.poll_interval;
        let cancel = self.cancel.clone();

        self.task = Some(tokio::spawn(async move {
            loop {
                match tailer.scan().await {
                    Ok(events) => {
                        for event in events {
                            if ctx.emit(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(path = %tailer.config.path, error = %e, "tail scan failed");
                    }
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = cancel.cancelled() => return,
                }
            }
        }));
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        Ok(())
    }
}

/// The scan state machine, separated from the plugin for testability.
struct Tailer {
    config: TailConfig,
    positions: Option<PositionFile>,
    entry: PositionEntry,
    initialized: bool,
}

impl Tailer {
    fn new(config: TailConfig) -> Result<Self> {
        let positions = config
            .pos_file
            .as_ref()
            .map(PositionFile::load)
            .transpose()?;
        let entry = positions
            .as_ref()
            .and_then(|p| p.get(&config.path))
            .unwrap_or(PositionEntry { inode: 0, offset: 0 });
        Ok(Self {
            config,
            positions,
            entry,
            initialized: false,
        })
    }

    /// One poll: pick up rotation/truncation, read complete new lines.
    async fn scan(&mut self) -> std::io::Result<Vec<Event>> {
        let meta = match tokio::fs::metadata(&self.config.path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let inode = inode_of(&meta);

        if !self.initialized {
            self.initialized = true;
            if self.entry.inode != inode {
                // No usable saved position for this file generation.
                let offset = if self.config.read_from_head { 0 } else { meta.len() };
                self.entry = PositionEntry { inode, offset };
            }
        } else if self.entry.inode != inode {
            tracing::info!(path = %self.config.path, "rotation detected");
            self.entry = PositionEntry { inode, offset: 0 };
        }

        if meta.len() < self.entry.offset {
            tracing::info!(path = %self.config.path, "truncation detected");
            self.entry.offset = 0;
        }

        let mut events = Vec::new();
        if meta.len() > self.entry.offset {
            let mut file = tokio::fs::File::open(&self.config.path).await?;
            file.seek(SeekFrom::Start(self.entry.offset)).await?;
            let mut reader = BufReader::new(file);
            let mut line = String::new();
            loop {
                line.clear();
                let n = reader.read_line(&mut line).await?;
                if n == 0 {
                    break;
                }
                if !line.ends_with('\n') {
                    // Partial line; leave it for the next poll.
                    break;
                }
                self.entry.offset += n as u64;
                let text = line.trim_end_matches(['\n', '\r']);
                if text.is_empty() {
                    continue;
                }
                events.push(Event::new(
                    &self.config.tag,
                    parse_record(self.config.format, text),
                ));
            }
        }

        if let Some(positions) = self.positions.as_mut() {
            positions.set(self.config.path.clone(), self.entry);
            positions.save()?;
        }
        Ok(events)
    }
}

fn parse_record(format: LineFormat, text: &str) -> Record {
    if format == LineFormat::Json {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(text) {
            if let Value::Map(record) = Value::from(json) {
                return record;
            }
        }
    }
    let mut record = Record::new();
    record.insert("message".to_string(), Value::Str(text.to_string()));
    record
}

#[cfg(unix)]
fn inode_of(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn inode_of(_meta: &std::fs::Metadata) -> u64 {
    0
}
