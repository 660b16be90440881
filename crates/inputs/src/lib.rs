//! Sluice - Input plugins
//!
//! Built-in event producers:
//! - [`ForwardInput`] (`in-forward`) - TCP listener for the forward wire
//!   format: flat entries, nested chains, and entry arrays
//! - [`TailInput`] (`in-tail`) - file tailer with rotation tracking and a
//!   position file for restart-safe offsets

pub mod forward;
pub mod position;
pub mod tail;

pub use forward::ForwardInput;
pub use position::{PositionEntry, PositionFile};
pub use tail::TailInput;

use sluice_plugin::{PluginFactory, PluginRegistry};

/// Register every built-in input with the registry.
pub fn register_builtins(registry: &mut PluginRegistry) {
    registry.register(
        "in-forward",
        PluginFactory::input(|| Box::new(ForwardInput::default())),
    );
    registry.register(
        "in-tail",
        PluginFactory::input(|| Box::new(TailInput::default())),
    );
}
