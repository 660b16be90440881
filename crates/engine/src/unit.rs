//! Exec unit - one configured instance of a plugin

use std::sync::Weak;

use parking_lot::RwLock;

use sluice_buffer::BufferOptions;
use sluice_plugin::PluginKind;
use sluice_protocol::Event;
use sluice_routing::{Result as RoutingResult, TagRouter, UnitId};

use crate::instance::Instance;

/// One configured unit of a plugin.
///
/// Distinct units of the same plugin kind share a plugin instance (and its
/// transport). Filter units additionally carry their own outbound router over
/// later-registered filters, which is what makes the filter graph a DAG.
pub struct ExecUnit {
    id: UnitId,
    kind: PluginKind,
    instance: Weak<Instance>,
    config: String,
    buffer: Option<BufferOptions>,
    router: Option<RwLock<TagRouter<std::sync::Arc<ExecUnit>>>>,
}

impl ExecUnit {
    pub(crate) fn new(
        id: UnitId,
        kind: PluginKind,
        instance: Weak<Instance>,
        config: String,
        buffer: Option<BufferOptions>,
    ) -> Self {
        let router = matches!(kind, PluginKind::Filter).then(|| RwLock::new(TagRouter::new()));
        Self {
            id,
            kind,
            instance,
            config,
            buffer,
            router,
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn kind(&self) -> PluginKind {
        self.kind
    }

    /// Serialised configuration sent in the Configure frame.
    pub fn config(&self) -> &str {
        &self.config
    }

    /// Buffer policy for output units.
    pub fn buffer_options(&self) -> Option<&BufferOptions> {
        self.buffer.as_ref()
    }

    /// Send an event to this unit through its plugin instance.
    pub(crate) async fn emit(&self, event: &Event) {
        match self.instance.upgrade() {
            Some(instance) => instance.emit(self.id, event).await,
            None => {
                tracing::warn!(unit = %self.id, "plugin instance is gone, event dropped");
            }
        }
    }

    /// Route a filter re-emission onward to a later filter.
    ///
    /// Only filter units carry a router; everything else routes nowhere.
    pub(crate) fn route_onward(&self, tag: &str) -> Option<std::sync::Arc<ExecUnit>> {
        self.router.as_ref()?.read().route(tag).cloned()
    }

    /// Wire a later-registered filter into this filter's outbound router.
    pub(crate) fn add_onward_route(
        &self,
        pattern: &str,
        unit: std::sync::Arc<ExecUnit>,
    ) -> RoutingResult<()> {
        if let Some(router) = self.router.as_ref() {
            router.write().add(pattern, unit)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ExecUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecUnit")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}
