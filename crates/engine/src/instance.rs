//! Plugin instance - one transport, many exec units

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use sluice_plugin::PluginKind;
use sluice_protocol::{Event, Message, MessageType, Payload, PROTO_VERSION};
use sluice_routing::UnitId;
use sluice_transport::{Pipe, PipeReader, PipeWriter};

use crate::dispatch::Dispatcher;
use crate::unit::ExecUnit;
use crate::{EngineError, Result};

/// How long to wait for the InfoResponse after InfoRequest
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// A running plugin (embedded task or supervised child) hosting N units.
///
/// Created lazily on first reference and registered for the life of the
/// engine. Exactly one transport at a time; the supervisor re-attaches a
/// fresh one after a restart and the whole start sequence is replayed.
pub struct Instance {
    name: String,
    kind: PluginKind,
    dispatcher: Arc<Dispatcher>,
    writer: tokio::sync::Mutex<Option<PipeWriter>>,
    units: RwLock<Vec<Arc<ExecUnit>>>,
    terminated: Mutex<HashSet<i32>>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl Instance {
    pub(crate) fn new(name: impl Into<String>, kind: PluginKind, dispatcher: Arc<Dispatcher>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            kind,
            dispatcher,
            writer: tokio::sync::Mutex::new(None),
            units: RwLock::new(Vec::new()),
            terminated: Mutex::new(HashSet::new()),
            recv_task: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PluginKind {
        self.kind
    }

    pub(crate) fn add_unit(&self, unit: Arc<ExecUnit>) {
        self.units.write().push(unit);
    }

    pub fn unit_count(&self) -> usize {
        self.units.read().len()
    }

    /// Bring a fresh transport up: handshake, per-unit configuration, then
    /// the receive loop. Called at engine start and again after restarts.
    pub(crate) async fn attach(self: &Arc<Self>, pipe: Pipe) -> Result<()> {
        let (mut reader, mut writer) = pipe.split();

        writer.send(&Message::info_request()).await?;
        timeout(HANDSHAKE_TIMEOUT, self.await_handshake(&mut reader))
            .await
            .map_err(|_| EngineError::HandshakeTimeout)??;

        let units: Vec<Arc<ExecUnit>> = self.units.read().clone();
        for unit in &units {
            let id = unit.id().as_i32();
            if let Some(opts) = unit.buffer_options() {
                writer.send(&Message::buffer_option(id, opts.clone())).await?;
            }
            writer.send(&Message::configure(id, unit.config())).await?;
            writer.send(&Message::start(id)).await?;
        }

        *self.writer.lock().await = Some(writer);
        self.terminated.lock().clear();

        let me = Arc::clone(self);
        let task = tokio::spawn(async move { me.recv_loop(reader).await });
        if let Some(old) = self.recv_task.lock().replace(task) {
            old.abort();
        }

        tracing::info!(plugin = %self.name, units = units.len(), "plugin attached");
        Ok(())
    }

    /// Wait for the InfoResponse, passing through early log lines.
    async fn await_handshake(&self, reader: &mut PipeReader) -> Result<()> {
        loop {
            let msg = reader.recv().await?;
            match msg.kind {
                MessageType::InfoResponse => {
                    if let Payload::Info(info) = msg.payload {
                        if info.proto_ver > PROTO_VERSION {
                            return Err(EngineError::UnsupportedProtocol(info.proto_ver));
                        }
                    }
                    return Ok(());
                }
                MessageType::Stdout => {
                    if let Payload::Line(line) = msg.payload {
                        tracing::info!(plugin = %self.name, "{line}");
                    }
                }
                other => {
                    tracing::debug!(plugin = %self.name, kind = ?other, "frame before handshake, ignored");
                }
            }
        }
    }

    async fn recv_loop(self: Arc<Self>, mut reader: PipeReader) {
        loop {
            match reader.recv().await {
                Ok(msg) => self.handle_frame(msg).await,
                Err(e) if e.is_closed() => {
                    tracing::info!(plugin = %self.name, "plugin transport closed");
                    return;
                }
                Err(e) => {
                    // Fatal for this connection; the supervisor owns restarts.
                    tracing::error!(plugin = %self.name, error = %e, "plugin transport failed");
                    return;
                }
            }
        }
    }

    async fn handle_frame(&self, msg: Message) {
        match msg.kind {
            MessageType::Event => {
                if let Payload::Event(event) = msg.payload {
                    self.dispatcher
                        .dispatch_from(UnitId::new(msg.unit_id), vec![event])
                        .await;
                }
            }
            MessageType::EventChain => {
                if let Payload::Events(events) = msg.payload {
                    self.dispatcher
                        .dispatch_from(UnitId::new(msg.unit_id), events)
                        .await;
                }
            }
            MessageType::Terminated => {
                self.terminated.lock().insert(msg.unit_id);
            }
            MessageType::Stdout => {
                if let Payload::Line(line) = msg.payload {
                    tracing::info!(plugin = %self.name, "{line}");
                }
            }
            other => {
                tracing::debug!(plugin = %self.name, kind = ?other, "unexpected frame, ignored");
            }
        }
    }

    /// Send an event frame to one of this instance's units.
    pub(crate) async fn emit(&self, unit_id: UnitId, event: &Event) {
        let mut guard = self.writer.lock().await;
        match guard.as_mut() {
            Some(writer) => {
                if let Err(e) = writer
                    .send(&Message::event(unit_id.as_i32(), event.clone()))
                    .await
                {
                    tracing::warn!(
                        plugin = %self.name,
                        unit = %unit_id,
                        error = %e,
                        "emit failed, event lost"
                    );
                }
            }
            None => {
                tracing::warn!(
                    plugin = %self.name,
                    unit = %unit_id,
                    "no transport attached, event lost"
                );
            }
        }
    }

    /// Stop every unit, wait for the Terminated acks, and close the
    /// transport. After this returns the plugin emits nothing further.
    pub(crate) async fn stop(&self, deadline: Duration) {
        let ids: Vec<i32> = self.units.read().iter().map(|u| u.id().as_i32()).collect();

        {
            let mut guard = self.writer.lock().await;
            let Some(writer) = guard.as_mut() else {
                return;
            };
            for id in &ids {
                if let Err(e) = writer.send(&Message::stop(*id)).await {
                    tracing::warn!(plugin = %self.name, error = %e, "stop frame failed");
                    break;
                }
            }
        }

        let all_terminated = async {
            loop {
                if ids.iter().all(|id| self.terminated.lock().contains(id)) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        if timeout(deadline, all_terminated).await.is_err() {
            tracing::warn!(plugin = %self.name, "units did not acknowledge stop in time");
        }

        // Dropping the writer is EOF for the plugin's reader.
        *self.writer.lock().await = None;
        if let Some(task) = self.recv_task.lock().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("units", &self.unit_count())
            .finish()
    }
}
