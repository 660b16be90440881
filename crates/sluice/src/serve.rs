//! Serve command - wire the engine from configuration and run it

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sluice_config::{Config, LogFormat, PluginSection};
use sluice_engine::{Engine, UnitConfig};
use sluice_plugin::PluginRegistry;

/// Serve command arguments
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,
}

pub async fn run(args: ServeArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;

    let level = args
        .log_level
        .unwrap_or_else(|| config.log.level.as_str().to_string());
    init_logging(&level, config.log.format)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        platform = std::env::consts::OS,
        "sluice starting"
    );

    let engine = build_engine(&config)?;
    engine.start().await.context("engine start failed")?;
    engine.trap_signals();
    engine.wait().await;

    if engine.forced_kill() {
        anyhow::bail!("shutdown was not clean: a plugin had to be killed");
    }
    info!("sluice shutdown complete");
    Ok(())
}

/// Build the registry of built-in plugins.
fn build_registry(config: &Config) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    if let Some(dir) = &config.plugin_dir {
        registry = registry.with_plugin_dir(dir);
    }
    sluice_inputs::register_builtins(&mut registry);
    sluice_filters::register_builtins(&mut registry);
    sluice_outputs::register_builtins(&mut registry);
    registry
}

/// Register everything from the config, in file order.
fn build_engine(config: &Config) -> Result<Engine> {
    let engine = Engine::new(build_registry(config));

    for buffer in &config.buffers {
        engine.register_buffer(buffer.clone());
    }
    for input in &config.inputs {
        engine
            .register_input(unit_config(input)?)
            .with_context(|| format!("input {:?}", input.plugin))?;
    }
    for filter in &config.filters {
        engine
            .register_filter(unit_config(filter)?)
            .with_context(|| format!("filter {:?}", filter.plugin))?;
    }
    for output in &config.outputs {
        let router = output.router.as_deref().unwrap_or("default");
        engine
            .register_output(router, unit_config(output)?)
            .with_context(|| format!("output {:?}", output.plugin))?;
    }
    Ok(engine)
}

fn unit_config(section: &PluginSection) -> Result<UnitConfig> {
    let mut conf = UnitConfig::new(&section.plugin).with_options(section.options_value()?);
    if let Some(matcher) = &section.matcher {
        conf = conf.with_match(matcher);
    }
    if let Some(buffer) = &section.buffer {
        conf = conf.with_buffer(buffer);
    }
    Ok(conf)
}

/// Load the config file, falling back through default paths to a built-in
/// forward-to-stdout pipeline.
fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    if let Some(path) = path {
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        return Config::from_file(path).context("failed to load configuration");
    }

    for candidate in ["configs/sluice.toml", "sluice.toml"] {
        let candidate = std::path::Path::new(candidate);
        if candidate.exists() {
            return Config::from_file(candidate).context("failed to load configuration");
        }
    }

    // No config anywhere: forward on 24224 straight to stdout.
    let fallback = r#"
        [[input]]
        type = "forward"

        [[output]]
        type = "stdout"
        match = ".*"
    "#;
    Ok(fallback.parse().expect("built-in fallback config is valid"))
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    match format {
        LogFormat::Console => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_thread_ids(false))
                .with(filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .init();
        }
    }
    Ok(())
}
