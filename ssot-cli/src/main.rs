//! ssot: reconcile NetBox against its sources of truth.
//!
//! # Usage
//!
//! ```text
//! ssot run [--config <path>] [--dry-run] [--json]
//! ssot inventory [--config <path>] [--json]
//! ssot config check [--config <path>]
//! ssot config path
//! ```
//!
//! Logs go to stderr; `RUST_LOG` overrides `--log-level`.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{config::ConfigCommand, inventory::InventoryArgs, run::RunArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "ssot",
    version,
    about = "Reconcile NetBox inventory against configured sources of truth",
    long_about = None,
)]
struct Cli {
    /// Default log filter when RUST_LOG is unset (e.g. `debug`, `ssot_sync=trace`).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bootstrap, run every source, sweep orphans and print the report.
    Run(RunArgs),

    /// Show what the backend currently holds, without writing anything.
    Inventory(InventoryArgs),

    /// Inspect the configuration file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Run(args) => block_on(args.run()),
        Commands::Inventory(args) => block_on(args.run()),
        Commands::Config { command } => commands::config::run(command),
    }
}

fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    runtime.block_on(future)
}

fn init_tracing(default_level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
