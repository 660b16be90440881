//! Sluice - Plugin SDK
//!
//! The small contract every plugin implements, plus the plugin-side frame
//! loop that speaks the host protocol. A plugin never touches the transport
//! directly: inputs produce through an [`Emitter`], filters return their
//! re-emissions, outputs hand encoded items to a per-unit buffer that calls
//! back into their `write`.
//!
//! One plugin process (or embedded task) may host several configured units
//! of the same kind; the [`PluginRunner`] keeps one plugin value per unit and
//! dispatches frames by unit id.
//!
//! Out-of-tree plugin binaries call [`run_stdio`] from `main` and are
//! indistinguishable from embedded plugins on the wire.

mod api;
mod error;
mod registry;
mod runner;


pub use api::{Emitter, FilterPlugin, InputPlugin, OutputPlugin, PluginKind, parse_config};
pub use error::PluginError;
pub use registry::{PluginFactory, PluginRegistry, ResolvedPlugin};
pub use runner::{run_stdio, PluginRunner};

/// Result type for plugin operations
pub type Result<T> = std::result::Result<T, PluginError>;
