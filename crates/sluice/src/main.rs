//! Sluice - pluggable log and event routing daemon
//!
//! # Usage
//!
//! ```bash
//! # Run with the default config search path
//! sluice
//! sluice --config configs/sluice.toml
//!
//! # Explicit subcommand
//! sluice serve --config configs/sluice.toml
//! ```

mod serve;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Sluice - pluggable log and event routing daemon
#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    // Serve flags accepted without a subcommand
    #[command(flatten)]
    serve: serve::ServeArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the routing daemon
    Serve(serve::ServeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Serve(args)) => serve::run(args).await,
        // No subcommand = serve (default behavior)
        None => serve::run(cli.serve).await,
    }
}
