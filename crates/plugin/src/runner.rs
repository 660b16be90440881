//! Plugin-side frame loop
//!
//! One runner per plugin process (or embedded task). It owns the plugin's
//! end of the transport, answers the handshake, keeps one plugin value per
//! configured unit, and wires each output unit to its own memory buffer.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use sluice_buffer::{BufferOptions, BytesItem, MemoryBuffer, WriteError, WriteHandler};
use sluice_protocol::{Message, MessageType, Payload, PROTO_VERSION};
use sluice_transport::{Pipe, PipeWriter};

use crate::api::{Emitter, FilterPlugin, InputPlugin, OutputPlugin};
use crate::registry::PluginFactory;
use crate::Result;

type SharedWriter = Arc<Mutex<PipeWriter>>;
type SharedOutput = Arc<Mutex<Box<dyn OutputPlugin>>>;

/// Runs one plugin over one transport.
pub struct PluginRunner {
    name: String,
    factory: Arc<PluginFactory>,
}

/// Run an out-of-tree plugin binary over its own stdin/stdout.
///
/// This is the whole `main` of an external plugin.
pub async fn run_stdio(name: impl Into<String>, factory: PluginFactory) -> Result<()> {
    let pipe = Pipe::new(tokio::io::stdin(), tokio::io::stdout());
    PluginRunner::new(name, Arc::new(factory)).run(pipe).await
}

enum UnitState {
    Input(Box<dyn InputPlugin>),
    Filter(Box<dyn FilterPlugin>),
    Output(OutputUnit),
}

struct OutputUnit {
    plugin: SharedOutput,
    opts: BufferOptions,
    buffer: Option<Arc<MemoryBuffer<BytesItem>>>,
    flusher: Option<JoinHandle<()>>,
}

/// Bridges a unit's buffer to its output plugin.
struct OutputHandler {
    plugin: SharedOutput,
}

#[async_trait]
impl WriteHandler<BytesItem> for OutputHandler {
    async fn write(&self, items: &[BytesItem]) -> std::result::Result<(), WriteError> {
        self.plugin.lock().await.write(items).await
    }
}

impl PluginRunner {
    pub fn new(name: impl Into<String>, factory: Arc<PluginFactory>) -> Self {
        Self {
            name: name.into(),
            factory,
        }
    }

    /// Read frames until the host closes the transport.
    pub async fn run(self, pipe: Pipe) -> Result<()> {
        let (mut reader, writer) = pipe.split();
        let writer: SharedWriter = Arc::new(Mutex::new(writer));
        let mut units: HashMap<i32, UnitState> = HashMap::new();
        let mut pending_opts: HashMap<i32, BufferOptions> = HashMap::new();

        loop {
            let msg = match reader.recv().await {
                Ok(msg) => msg,
                Err(e) if e.is_closed() => break,
                Err(e) => return Err(e.into()),
            };

            match msg.kind {
                MessageType::InfoRequest => {
                    let mut w = writer.lock().await;
                    w.send(&Message::info_response(PROTO_VERSION)).await?;
                }
                MessageType::BufferOption => {
                    if let Payload::Options(opts) = msg.payload {
                        pending_opts.insert(msg.unit_id, opts);
                    }
                }
                MessageType::Configure => {
                    if let Payload::Config(config) = msg.payload {
                        match self
                            .configure_unit(msg.unit_id, &config, &writer, &mut pending_opts)
                            .await
                        {
                            Ok(state) => {
                                units.insert(msg.unit_id, state);
                            }
                            Err(e) => {
                                tracing::error!(
                                    plugin = %self.name,
                                    unit_id = msg.unit_id,
                                    error = %e,
                                    "unit configuration failed"
                                );
                            }
                        }
                    }
                }
                MessageType::Start => {
                    if let Some(state) = units.get_mut(&msg.unit_id) {
                        self.start_unit(msg.unit_id, state).await;
                    } else {
                        tracing::warn!(
                            plugin = %self.name,
                            unit_id = msg.unit_id,
                            "start for unconfigured unit"
                        );
                    }
                }
                MessageType::Event => {
                    if let Payload::Event(event) = msg.payload {
                        self.deliver(msg.unit_id, &mut units, &writer, vec![event]).await;
                    }
                }
                MessageType::EventChain => {
                    if let Payload::Events(events) = msg.payload {
                        self.deliver(msg.unit_id, &mut units, &writer, events).await;
                    }
                }
                MessageType::Stop => {
                    if let Some(state) = units.remove(&msg.unit_id) {
                        self.stop_unit(msg.unit_id, state).await;
                    }
                    let mut w = writer.lock().await;
                    w.send(&Message::terminated(msg.unit_id)).await?;
                }
                other => {
                    tracing::warn!(
                        plugin = %self.name,
                        kind = ?other,
                        "unexpected frame from host"
                    );
                }
            }
        }
        Ok(())
    }

    async fn configure_unit(
        &self,
        unit_id: i32,
        config: &str,
        writer: &SharedWriter,
        pending_opts: &mut HashMap<i32, BufferOptions>,
    ) -> Result<UnitState> {
        match &*self.factory {
            PluginFactory::Input(make) => {
                let mut plugin = make();
                plugin
                    .init(Emitter::new(unit_id, Arc::clone(writer)), config)
                    .await?;
                Ok(UnitState::Input(plugin))
            }
            PluginFactory::Filter(make) => {
                let mut plugin = make();
                plugin.init(config).await?;
                Ok(UnitState::Filter(plugin))
            }
            PluginFactory::Output(make) => {
                let mut plugin = make();
                plugin.init(config).await?;
                Ok(UnitState::Output(OutputUnit {
                    plugin: Arc::new(Mutex::new(plugin)),
                    opts: pending_opts.remove(&unit_id).unwrap_or_default(),
                    buffer: None,
                    flusher: None,
                }))
            }
        }
    }

    async fn start_unit(&self, unit_id: i32, state: &mut UnitState) {
        let result = match state {
            UnitState::Input(plugin) => plugin.start().await,
            UnitState::Filter(_) => Ok(()),
            UnitState::Output(unit) => {
                let started = unit.plugin.lock().await.start().await;
                if started.is_ok() {
                    let handler = Arc::new(OutputHandler {
                        plugin: Arc::clone(&unit.plugin),
                    });
                    let buffer = MemoryBuffer::new(unit.opts.clone(), handler);
                    unit.flusher = Some(buffer.spawn_flusher());
                    unit.buffer = Some(buffer);
                }
                started
            }
        };
        if let Err(e) = result {
            tracing::error!(
                plugin = %self.name,
                unit_id,
                error = %e,
                "unit start failed"
            );
        }
    }

    async fn deliver(
        &self,
        unit_id: i32,
        units: &mut HashMap<i32, UnitState>,
        writer: &SharedWriter,
        events: Vec<sluice_protocol::Event>,
    ) {
        let Some(state) = units.get_mut(&unit_id) else {
            tracing::warn!(plugin = %self.name, unit_id, "event for unknown unit, dropped");
            return;
        };
        for event in events {
            match state {
                UnitState::Filter(plugin) => match plugin.filter(event).await {
                    Ok(emitted) => {
                        for out in emitted {
                            let mut w = writer.lock().await;
                            if let Err(e) = w.send(&Message::event(unit_id, out)).await {
                                tracing::error!(
                                    plugin = %self.name,
                                    unit_id,
                                    error = %e,
                                    "re-emit failed"
                                );
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            plugin = %self.name,
                            unit_id,
                            error = %e,
                            "filter failed, event dropped"
                        );
                    }
                },
                UnitState::Output(unit) => {
                    let encoded = unit.plugin.lock().await.encode(&event);
                    match (encoded, unit.buffer.as_ref()) {
                        (Ok(item), Some(buffer)) => {
                            if let Err(e) = buffer.push(item).await {
                                // Oversize or closed; this plugin drops.
                                tracing::warn!(
                                    plugin = %self.name,
                                    unit_id,
                                    error = %e,
                                    "buffer rejected item, event dropped"
                                );
                            }
                        }
                        (Ok(_), None) => {
                            tracing::warn!(
                                plugin = %self.name,
                                unit_id,
                                "event before start, dropped"
                            );
                        }
                        (Err(e), _) => {
                            tracing::warn!(
                                plugin = %self.name,
                                unit_id,
                                error = %e,
                                "encode failed, event dropped"
                            );
                        }
                    }
                }
                UnitState::Input(_) => {
                    tracing::warn!(
                        plugin = %self.name,
                        unit_id,
                        "event addressed to an input unit, dropped"
                    );
                }
            }
        }
    }

    async fn stop_unit(&self, unit_id: i32, state: UnitState) {
        let result = match state {
            UnitState::Input(mut plugin) => plugin.stop().await,
            UnitState::Filter(mut plugin) => plugin.stop().await,
            UnitState::Output(unit) => {
                if let Some(buffer) = unit.buffer {
                    buffer.close().await;
                }
                if let Some(flusher) = unit.flusher {
                    flusher.abort();
                }
                unit.plugin.lock().await.stop().await
            }
        };
        if let Err(e) = result {
            tracing::warn!(
                plugin = %self.name,
                unit_id,
                error = %e,
                "unit stop reported an error"
            );
        }
    }
}
