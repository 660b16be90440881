//! Sluice - Filter plugins
//!
//! Built-in event transformers. Filters receive events whose tags match
//! their pattern and return new events in their place; the engine guarantees
//! a filter never sees its own re-emissions.

pub mod record;

pub use record::RecordFilter;

use sluice_plugin::{PluginFactory, PluginRegistry};

/// Register every built-in filter with the registry.
pub fn register_builtins(registry: &mut PluginRegistry) {
    registry.register(
        "filter-record",
        PluginFactory::filter(|| Box::new(RecordFilter::default())),
    );
}
