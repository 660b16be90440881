//! Sluice - Engine
//!
//! The root of the host process. The engine owns a process supervisor and a
//! set of plugin instances, routes events between exec units by tag, and
//! runs the phased shutdown that drains pipelines in source-to-sink order.
//!
//! # Structure
//!
//! - [`Engine`] - registration, lifecycle, signals
//! - [`Instance`] - one plugin transport hosting N exec units
//! - [`ExecUnit`] - one configured unit of a plugin
//! - [`Dispatcher`] - the shared routing fabric (filter chain + named
//!   output routers)
//!
//! One engine per process, owned by `main` and passed to collaborators;
//! there is no ambient global.

mod dispatch;
mod engine;
mod error;
mod instance;
mod unit;

pub use dispatch::{Dispatcher, EngineMetrics, EngineMetricsSnapshot};
pub use engine::{Engine, UnitConfig};
pub use error::EngineError;
pub use instance::Instance;
pub use unit::ExecUnit;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
