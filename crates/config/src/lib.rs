//! Sluice - Configuration
//!
//! TOML-based configuration with sensible defaults. Sections are ordered
//! arrays because registration order is meaningful: filters chain in file
//! order and within a router the first matching output wins.
//!
//! # Example
//!
//! ```toml
//! [log]
//! level = "info"
//!
//! [[buffer]]
//! name = "fast"
//! flush_interval = "5s"
//!
//! [[input]]
//! type = "forward"
//! bind = "127.0.0.1:24224"
//!
//! [[filter]]
//! type = "record"
//! match = "app\\..*"
//! add = { team = "platform" }
//!
//! [[output]]
//! type = "file"
//! match = ".*"
//! buffer = "fast"
//! path = "/var/log/sluice/out.log"
//! ```

mod error;
mod logging;


pub use error::ConfigError;
pub use logging::{LogConfig, LogFormat, LogLevel};

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use sluice_buffer::BufferOptions;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level daemon configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,

    /// Directory searched for external plugin executables
    pub plugin_dir: Option<String>,

    /// Named buffer policies
    #[serde(rename = "buffer")]
    pub buffers: Vec<BufferOptions>,

    /// Input units, in registration order
    #[serde(rename = "input")]
    pub inputs: Vec<PluginSection>,

    /// Filter units; file order is chain order
    #[serde(rename = "filter")]
    pub filters: Vec<PluginSection>,

    /// Output units; file order is match order within a router
    #[serde(rename = "output")]
    pub outputs: Vec<PluginSection>,
}

/// One `[[input]]` / `[[filter]]` / `[[output]]` section.
///
/// Everything not named here flows through to the plugin as its options.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginSection {
    /// Plugin type without its kind prefix (`forward`, `file`, ...)
    #[serde(rename = "type")]
    pub plugin: String,

    /// Tag pattern; required for filters and outputs
    #[serde(rename = "match")]
    pub matcher: Option<String>,

    /// Output router name
    pub router: Option<String>,

    /// Buffer policy name; outputs only
    pub buffer: Option<String>,

    /// Plugin-specific options
    #[serde(flatten)]
    pub options: toml::Table,
}

impl PluginSection {
    /// Plugin options as a JSON value, the shape the engine serialises into
    /// the Configure frame.
    pub fn options_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(&self.options)
            .map_err(|e| ConfigError::Validation(format!("options for {:?}: {e}", self.plugin)))
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        contents.parse()
    }

    /// Checks that cannot be expressed in the type system:
    /// filters and outputs need a pattern, buffer names must be unique.
    fn validate(&self) -> Result<()> {
        let mut buffer_names = std::collections::HashSet::new();
        for buffer in &self.buffers {
            if buffer.name.is_empty() {
                return Err(ConfigError::Validation("buffer has an empty name".into()));
            }
            if !buffer_names.insert(&buffer.name) {
                return Err(ConfigError::Validation(format!(
                    "duplicate buffer name: {:?}",
                    buffer.name
                )));
            }
        }
        for filter in &self.filters {
            if filter.matcher.is_none() {
                return Err(ConfigError::Validation(format!(
                    "filter {:?} is missing match",
                    filter.plugin
                )));
            }
        }
        for output in &self.outputs {
            if output.matcher.is_none() {
                return Err(ConfigError::Validation(format!(
                    "output {:?} is missing match",
                    output.plugin
                )));
            }
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }
}
