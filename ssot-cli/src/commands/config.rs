//! `ssot config`: validate and locate the configuration file.

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use ssot_core::config::{Config, SourceKind, SweepScope};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Load and validate the config, then summarize it.
    Check {
        /// Config file (default: <config dir>/ssot/config.yaml).
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the default config file location.
    Path,
}

#[derive(Tabled)]
struct SourceRow {
    #[tabled(rename = "rank")]
    rank: u32,
    #[tabled(rename = "source")]
    name: String,
    #[tabled(rename = "type")]
    kind: String,
    #[tabled(rename = "location")]
    location: String,
}

pub fn run(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Check { config } => check(config),
        ConfigCommand::Path => {
            println!("{}", super::config_path(None)?.display());
            Ok(())
        }
    }
}

fn check(explicit: Option<PathBuf>) -> Result<()> {
    let (path, config) = super::load_config(explicit.as_deref())?;
    println!("{} config OK: {}", "✓".green().bold(), path.display());
    print_summary(&config)
}

fn print_summary(config: &Config) -> Result<()> {
    let token = if config.netbox.token.is_empty() {
        "not set".yellow().to_string()
    } else {
        "set".to_string()
    };
    let sweep = match (config.sweep.enabled, config.sweep.scope) {
        (false, _) => "disabled".yellow().to_string(),
        (true, SweepScope::All) => "enabled (all objects)".to_string(),
        (true, SweepScope::Managed) => {
            format!("enabled (objects tagged '{}')", config.managed_tag.name)
        }
    };
    println!("  netbox:  {}", config.netbox.url);
    println!("  token:   {token}");
    if !config.netbox.validate_cert {
        println!("  tls:     {}", "certificate checks disabled".yellow());
    }
    println!("  tag:     {}", config.managed_tag.name);
    println!("  sweep:   {sweep}");

    if config.sources.is_empty() {
        println!("No sources configured.");
        return Ok(());
    }

    let priority = config.priority()?;
    let mut rows: Vec<SourceRow> = config
        .sources
        .iter()
        .map(|source| {
            let (kind, location) = match &source.kind {
                SourceKind::File { path } => ("file", path.display().to_string()),
            };
            SourceRow {
                rank: priority.rank_of(&source.name).unwrap_or(0),
                name: source.name.clone(),
                kind: kind.to_string(),
                location,
            }
        })
        .collect();
    rows.sort_by(|a, b| b.rank.cmp(&a.rank));

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}
