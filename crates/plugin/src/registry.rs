//! Plugin registry - name to factory or executable
//!
//! Plugins are addressed by name (`in-forward`, `filter-record`,
//! `out-file`). A name resolves to either an embedded factory, run as an
//! in-process task, or an external executable `sluice-<name>` under the
//! plugin directory, run as a supervised child. Both present the identical
//! transport, so nothing downstream branches on the kind.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::api::{FilterPlugin, InputPlugin, OutputPlugin, PluginKind};

/// Creates one plugin value per configured unit.
pub enum PluginFactory {
    Input(Box<dyn Fn() -> Box<dyn InputPlugin> + Send + Sync>),
    Filter(Box<dyn Fn() -> Box<dyn FilterPlugin> + Send + Sync>),
    Output(Box<dyn Fn() -> Box<dyn OutputPlugin> + Send + Sync>),
}

impl PluginFactory {
    pub fn input<F>(f: F) -> Self
    where
        F: Fn() -> Box<dyn InputPlugin> + Send + Sync + 'static,
    {
        Self::Input(Box::new(f))
    }

    pub fn filter<F>(f: F) -> Self
    where
        F: Fn() -> Box<dyn FilterPlugin> + Send + Sync + 'static,
    {
        Self::Filter(Box::new(f))
    }

    pub fn output<F>(f: F) -> Self
    where
        F: Fn() -> Box<dyn OutputPlugin> + Send + Sync + 'static,
    {
        Self::Output(Box::new(f))
    }

    pub fn kind(&self) -> PluginKind {
        match self {
            Self::Input(_) => PluginKind::Input,
            Self::Filter(_) => PluginKind::Filter,
            Self::Output(_) => PluginKind::Output,
        }
    }
}

/// How a plugin name resolved.
pub enum ResolvedPlugin {
    /// Run in-process from a registered factory
    Embedded(Arc<PluginFactory>),
    /// Spawn this executable as a supervised child
    External(PathBuf),
}

/// Registry of known plugins.
pub struct PluginRegistry {
    embedded: HashMap<String, Arc<PluginFactory>>,
    plugin_dir: Option<PathBuf>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            embedded: HashMap::new(),
            plugin_dir: None,
        }
    }

    /// Directory searched for external plugin executables.
    pub fn with_plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = Some(dir.into());
        self
    }

    /// Register an embedded plugin under its full name.
    ///
    /// # Panics
    ///
    /// Panics if the name is already registered or its prefix does not match
    /// the factory kind; both are programming errors at wiring time.
    pub fn register(&mut self, name: &str, factory: PluginFactory) {
        let kind = PluginKind::from_name(name);
        if kind != Some(factory.kind()) {
            panic!("plugin name {name:?} does not match factory kind {}", factory.kind());
        }
        if self.embedded.contains_key(name) {
            panic!("plugin {name:?} already registered");
        }
        self.embedded.insert(name.to_string(), Arc::new(factory));
    }

    /// Resolve a plugin name to its runnable form.
    ///
    /// Embedded plugins win; otherwise the plugin directory is probed for a
    /// `sluice-<name>` executable.
    pub fn resolve(&self, name: &str) -> Option<ResolvedPlugin> {
        if let Some(factory) = self.embedded.get(name) {
            return Some(ResolvedPlugin::Embedded(Arc::clone(factory)));
        }
        let dir = self.plugin_dir.as_ref()?;
        let path = dir.join(format!("sluice-{name}"));
        path.is_file().then_some(ResolvedPlugin::External(path))
    }

    pub fn is_embedded(&self, name: &str) -> bool {
        self.embedded.contains_key(name)
    }

    /// Names of all embedded plugins, for diagnostics.
    pub fn embedded_names(&self) -> Vec<&str> {
        self.embedded.keys().map(String::as_str).collect()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("embedded", &self.embedded.len())
            .field("plugin_dir", &self.plugin_dir)
            .finish()
    }
}
