//! Dispatcher - the shared routing fabric
//!
//! Holds the unit table, the filter router, and the named output routers.
//! Plugin instances hand inbound events here; the dispatcher decides whether
//! they enter the filter chain, continue down it, or fan out to outputs.
//!
//! Routers are written only during registration and read during routing, so
//! they sit behind read-write locks whose guards never cross an await.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use sluice_plugin::PluginKind;
use sluice_protocol::Event;
use sluice_routing::{Result as RoutingResult, TagRouter, UnitId};

use crate::unit::ExecUnit;

type SharedRouter = Arc<RwLock<TagRouter<Arc<ExecUnit>>>>;

/// Shared routing state between the engine and its plugin instances.
pub struct Dispatcher {
    units: RwLock<HashMap<i32, Arc<ExecUnit>>>,
    filter_router: RwLock<TagRouter<Arc<ExecUnit>>>,
    // BTreeMap keeps fan-out deterministic across named trees.
    output_routers: RwLock<BTreeMap<String, SharedRouter>>,
    metrics: EngineMetrics,
}

impl Dispatcher {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            units: RwLock::new(HashMap::new()),
            filter_router: RwLock::new(TagRouter::new()),
            output_routers: RwLock::new(BTreeMap::new()),
            metrics: EngineMetrics::new(),
        })
    }

    pub(crate) fn register_unit(&self, unit: Arc<ExecUnit>) {
        self.units.write().insert(unit.id().as_i32(), unit);
    }

    pub(crate) fn add_filter_route(
        &self,
        pattern: &str,
        unit: Arc<ExecUnit>,
    ) -> RoutingResult<()> {
        self.filter_router.write().add(pattern, unit)
    }

    /// The named output router, created on first reference.
    pub(crate) fn output_router(&self, name: &str) -> SharedRouter {
        let mut routers = self.output_routers.write();
        Arc::clone(
            routers
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(TagRouter::new()))),
        )
    }

    /// Inbound events from a plugin instance.
    ///
    /// Events addressed from unit 0 or an input unit enter the filter chain;
    /// re-emissions from a filter continue past it; unknown units are dropped
    /// with a warning.
    pub async fn dispatch_from(&self, source: UnitId, events: Vec<Event>) {
        for event in events {
            if source.is_control() {
                self.filter(event).await;
                continue;
            }
            let unit = self.units.read().get(&source.as_i32()).cloned();
            match unit {
                None => {
                    self.metrics.record_dropped();
                    tracing::warn!(unit = %source, tag = %event.tag, "event from unknown unit, dropped");
                }
                Some(unit) => match unit.kind() {
                    PluginKind::Input => self.filter(event).await,
                    PluginKind::Filter => match unit.route_onward(&event.tag) {
                        Some(next) => next.emit(&event).await,
                        None => self.emit_to_outputs(&event).await,
                    },
                    PluginKind::Output => {
                        self.metrics.record_dropped();
                        tracing::warn!(
                            unit = %source,
                            "output unit emitted an event, dropped"
                        );
                    }
                },
            }
        }
    }

    /// Filter-chain entry: first matching filter wins, otherwise straight to
    /// the outputs.
    pub async fn filter(&self, event: Event) {
        self.metrics.record_received();
        let target = self.filter_router.read().route(&event.tag).cloned();
        match target {
            Some(unit) => unit.emit(&event).await,
            None => self.emit_to_outputs(&event).await,
        }
    }

    /// Offer the event to every named output router; within each, the first
    /// pattern match delivers.
    pub(crate) async fn emit_to_outputs(&self, event: &Event) {
        let routers: Vec<SharedRouter> = self.output_routers.read().values().cloned().collect();
        let mut delivered = false;
        for router in routers {
            let target = router.read().route(&event.tag).cloned();
            if let Some(unit) = target {
                unit.emit(event).await;
                delivered = true;
            }
        }
        if delivered {
            self.metrics.record_routed();
        } else {
            self.metrics.record_dropped();
            tracing::trace!(tag = %event.tag, "no output route for event");
        }
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }
}

/// Event flow counters
#[derive(Debug, Default)]
pub struct EngineMetrics {
    events_received: AtomicU64,
    events_routed: AtomicU64,
    events_dropped: AtomicU64,
}

impl EngineMetrics {
    pub const fn new() -> Self {
        Self {
            events_received: AtomicU64::new(0),
            events_routed: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
        }
    }

    #[inline]
    fn record_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_routed(&self) {
        self.events_routed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineMetricsSnapshot {
        EngineMetricsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_routed: self.events_routed.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of engine event counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineMetricsSnapshot {
    pub events_received: u64,
    pub events_routed: u64,
    pub events_dropped: u64,
}
