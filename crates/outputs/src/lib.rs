//! Sluice - Output plugins
//!
//! Built-in sinks. Each encodes events into byte items for its unit's
//! buffer and writes retired chunks, reporting partial progress so the
//! buffer retries only what was not committed.

pub mod elasticsearch;
pub mod file;
pub mod stdout;

pub use elasticsearch::ElasticsearchOutput;
pub use file::FileOutput;
pub use stdout::StdoutOutput;

use sluice_plugin::{PluginFactory, PluginRegistry};

/// Register every built-in output with the registry.
pub fn register_builtins(registry: &mut PluginRegistry) {
    registry.register(
        "out-file",
        PluginFactory::output(|| Box::new(FileOutput::default())),
    );
    registry.register(
        "out-stdout",
        PluginFactory::output(|| Box::new(StdoutOutput::default())),
    );
    registry.register(
        "out-elasticsearch",
        PluginFactory::output(|| Box::new(ElasticsearchOutput::default())),
    );
}
