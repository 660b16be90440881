//! Engine - registration, lifecycle, signals

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use sluice_buffer::BufferOptions;
use sluice_plugin::{PluginKind, PluginRegistry, PluginRunner, ResolvedPlugin};
use sluice_protocol::Event;
use sluice_routing::UnitId;
use sluice_supervisor::{ChildHandler, ChildSpec, Supervisor};
use sluice_transport::Pipe;

use crate::dispatch::{Dispatcher, EngineMetricsSnapshot};
use crate::instance::Instance;
use crate::unit::ExecUnit;
use crate::{EngineError, Result};

/// Hard deadline on the supervisor during phased shutdown
const STOP_BACKSTOP: Duration = Duration::from_secs(10);

/// Per-instance wait for Terminated acks
const UNIT_STOP_DEADLINE: Duration = Duration::from_secs(5);

/// Registration-time description of one exec unit.
#[derive(Debug, Clone)]
pub struct UnitConfig {
    /// Plugin type without its kind prefix (`forward`, `file`, ...)
    pub plugin: String,

    /// Tag pattern; required for filters and outputs
    pub matcher: Option<String>,

    /// Buffer policy name; outputs only, defaults to `default`
    pub buffer: Option<String>,

    /// Plugin-specific options, serialised into the Configure frame
    pub options: serde_json::Value,
}

impl UnitConfig {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            matcher: None,
            buffer: None,
            options: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_match(mut self, pattern: impl Into<String>) -> Self {
        self.matcher = Some(pattern.into());
        self
    }

    pub fn with_buffer(mut self, name: impl Into<String>) -> Self {
        self.buffer = Some(name.into());
        self
    }

    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }

    fn options_json(&self) -> Result<String> {
        if self.options.is_null() {
            return Ok("{}".to_string());
        }
        Ok(serde_json::to_string(&self.options)?)
    }
}

struct Core {
    registry: PluginRegistry,
    supervisor: Arc<Supervisor>,
    dispatcher: Arc<Dispatcher>,
    plugins: RwLock<HashMap<String, Arc<Instance>>>,
    embeds: RwLock<Vec<Arc<Instance>>>,
    filters: RwLock<Vec<Arc<ExecUnit>>>,
    buffers: RwLock<HashMap<String, BufferOptions>>,
    unit_seq: AtomicI32,
    stopping: AtomicBool,
    stopped: watch::Sender<bool>,
}

/// The host's root object. Cheap to clone; all clones share one engine.
#[derive(Clone)]
pub struct Engine {
    core: Arc<Core>,
}

impl Engine {
    pub fn new(registry: PluginRegistry) -> Self {
        let mut buffers = HashMap::new();
        buffers.insert("default".to_string(), BufferOptions::default());
        let (stopped, _) = watch::channel(false);
        Self {
            core: Arc::new(Core {
                registry,
                supervisor: Arc::new(Supervisor::new()),
                dispatcher: Dispatcher::new(),
                plugins: RwLock::new(HashMap::new()),
                embeds: RwLock::new(Vec::new()),
                filters: RwLock::new(Vec::new()),
                buffers: RwLock::new(buffers),
                unit_seq: AtomicI32::new(1),
                stopping: AtomicBool::new(false),
                stopped,
            }),
        }
    }

    /// Store a named buffer policy for outputs to reference.
    pub fn register_buffer(&self, opts: BufferOptions) {
        self.core.buffers.write().insert(opts.name.clone(), opts);
    }

    /// Register one configured input unit.
    pub fn register_input(&self, conf: UnitConfig) -> Result<UnitId> {
        let instance = self.instance(&format!("in-{}", conf.plugin))?;
        let unit = self.create_unit(&instance, &conf, None)?;
        self.attach_unit(&instance, &unit);
        Ok(unit.id())
    }

    /// Register one configured filter unit and wire it into the chain.
    ///
    /// The new filter joins the global filter router and the outbound router
    /// of every previously registered filter; its own router starts empty, so
    /// re-emissions only ever reach later filters.
    pub fn register_filter(&self, conf: UnitConfig) -> Result<UnitId> {
        let pattern = conf
            .matcher
            .clone()
            .ok_or_else(|| EngineError::MissingMatch(format!("filter-{}", conf.plugin)))?;

        let instance = self.instance(&format!("filter-{}", conf.plugin))?;
        let unit = self.create_unit(&instance, &conf, None)?;

        self.core
            .dispatcher
            .add_filter_route(&pattern, Arc::clone(&unit))?;
        for earlier in self.core.filters.read().iter() {
            earlier.add_onward_route(&pattern, Arc::clone(&unit))?;
        }
        self.core.filters.write().push(Arc::clone(&unit));

        self.attach_unit(&instance, &unit);
        Ok(unit.id())
    }

    /// Register one configured output unit in the named router.
    ///
    /// Named routers form parallel output trees with independent routing
    /// tables; an event reaches at most one unit per tree.
    pub fn register_output(&self, router_name: &str, conf: UnitConfig) -> Result<UnitId> {
        let pattern = conf
            .matcher
            .clone()
            .ok_or_else(|| EngineError::MissingMatch(format!("out-{}", conf.plugin)))?;

        let buffer_name = conf.buffer.clone().unwrap_or_else(|| "default".to_string());
        let buffer = self
            .core
            .buffers
            .read()
            .get(&buffer_name)
            .cloned()
            .ok_or(EngineError::UnknownBuffer(buffer_name))?;

        let instance = self.instance(&format!("out-{}", conf.plugin))?;
        let unit = self.create_unit(&instance, &conf, Some(buffer))?;

        let router = self.core.dispatcher.output_router(router_name);
        router.write().add(&pattern, Arc::clone(&unit))?;

        self.attach_unit(&instance, &unit);
        Ok(unit.id())
    }

    /// Offer an event to the pipeline as if an input had produced it.
    pub async fn emit(&self, event: Event) {
        self.core.dispatcher.filter(event).await;
    }

    /// Launch embedded plugins first (their pipes must be ready before
    /// anything emits), then the supervisor for external ones.
    pub async fn start(&self) -> Result<()> {
        let embeds: Vec<Arc<Instance>> = self.core.embeds.read().clone();
        for instance in embeds {
            let name = instance.name().to_string();
            let Some(ResolvedPlugin::Embedded(factory)) = self.core.registry.resolve(&name) else {
                return Err(EngineError::UnknownPlugin(name));
            };
            let (host_end, plugin_end) = Pipe::in_process();
            let runner = PluginRunner::new(name.clone(), factory);
            tokio::spawn(async move {
                if let Err(e) = runner.run(plugin_end).await {
                    tracing::error!(plugin = %name, error = %e, "embedded plugin failed");
                }
            });
            instance.attach(host_end).await?;
        }

        self.core.supervisor.start();
        tracing::info!(
            plugins = self.core.plugins.read().len(),
            filters = self.core.filters.read().len(),
            "engine started"
        );
        Ok(())
    }

    /// Phased shutdown: inputs, then filters, then outputs, then the
    /// supervisor, with a hard backstop so a stuck plugin cannot wedge the
    /// process. Safe to call more than once.
    pub async fn stop(&self) {
        if self.core.stopping.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("engine stopping");

        let supervisor = Arc::clone(&self.core.supervisor);
        tokio::spawn(async move {
            tokio::time::sleep(STOP_BACKSTOP).await;
            supervisor.stop().await;
        });

        self.stop_tier("in-").await;
        self.stop_tier("filter-").await;
        self.stop_tier("out-").await;
        self.core.supervisor.stop().await;

        let snapshot = self.metrics_snapshot();
        tracing::info!(
            events_received = snapshot.events_received,
            events_routed = snapshot.events_routed,
            events_dropped = snapshot.events_dropped,
            "engine stopped"
        );
        let _ = self.core.stopped.send(true);
    }

    /// Block until [`Engine::stop`] has completed.
    pub async fn wait(&self) {
        let mut rx = self.core.stopped.subscribe();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Trap SIGINT and SIGTERM; either triggers [`Engine::stop`] once.
    pub fn trap_signals(&self) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let ctrl_c = async {
                let _ = tokio::signal::ctrl_c().await;
            };

            #[cfg(unix)]
            let terminate = async {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut sig) => {
                        sig.recv().await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to install SIGTERM handler");
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => {},
                _ = terminate => {},
            }
            tracing::info!("termination signal received");
            engine.stop().await;
        })
    }

    /// True if shutdown had to SIGKILL a plugin; the process should exit
    /// non-zero.
    pub fn forced_kill(&self) -> bool {
        self.core.supervisor.forced_kill()
    }

    pub fn metrics_snapshot(&self) -> EngineMetricsSnapshot {
        self.core.dispatcher.metrics().snapshot()
    }

    /// Resolve or lazily create the plugin instance for a full name.
    fn instance(&self, name: &str) -> Result<Arc<Instance>> {
        if let Some(instance) = self.core.plugins.read().get(name) {
            return Ok(Arc::clone(instance));
        }

        let kind = PluginKind::from_name(name)
            .ok_or_else(|| EngineError::UnknownPlugin(name.to_string()))?;
        let instance = Instance::new(name, kind, Arc::clone(&self.core.dispatcher));

        match self.core.registry.resolve(name) {
            Some(ResolvedPlugin::Embedded(_)) => {
                self.core.embeds.write().push(Arc::clone(&instance));
            }
            Some(ResolvedPlugin::External(path)) => {
                let handler = Arc::new(InstanceHandler(Arc::clone(&instance)));
                self.core.supervisor.add(ChildSpec::new(
                    name,
                    move || Command::new(&path),
                    handler,
                ));
            }
            None => return Err(EngineError::UnknownPlugin(name.to_string())),
        }

        self.core
            .plugins
            .write()
            .insert(name.to_string(), Arc::clone(&instance));
        Ok(instance)
    }

    fn create_unit(
        &self,
        instance: &Arc<Instance>,
        conf: &UnitConfig,
        buffer: Option<BufferOptions>,
    ) -> Result<Arc<ExecUnit>> {
        let id = UnitId::new(self.core.unit_seq.fetch_add(1, Ordering::Relaxed));
        Ok(Arc::new(ExecUnit::new(
            id,
            instance.kind(),
            Arc::downgrade(instance),
            conf.options_json()?,
            buffer,
        )))
    }

    fn attach_unit(&self, instance: &Arc<Instance>, unit: &Arc<ExecUnit>) {
        instance.add_unit(Arc::clone(unit));
        self.core.dispatcher.register_unit(Arc::clone(unit));
    }

    async fn stop_tier(&self, prefix: &str) {
        let instances: Vec<Arc<Instance>> = self
            .core
            .plugins
            .read()
            .values()
            .filter(|i| i.name().starts_with(prefix))
            .cloned()
            .collect();

        let mut tasks = JoinSet::new();
        for instance in instances {
            tasks.spawn(async move {
                instance.stop(UNIT_STOP_DEADLINE).await;
                tracing::info!(plugin = %instance.name(), "plugin stopped");
            });
        }
        while tasks.join_next().await.is_some() {}
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("plugins", &self.core.plugins.read().len())
            .field("filters", &self.core.filters.read().len())
            .finish()
    }
}

/// Bridges supervisor callbacks to an instance.
struct InstanceHandler(Arc<Instance>);

#[async_trait]
impl ChildHandler for InstanceHandler {
    async fn attached(&self, pipe: Pipe) {
        if let Err(e) = self.0.attach(pipe).await {
            tracing::error!(plugin = %self.0.name(), error = %e, "plugin attach failed");
        }
    }

    fn crashed(&self, detail: &str) {
        tracing::error!(plugin = %self.0.name(), "plugin crashed: {detail}");
    }
}
