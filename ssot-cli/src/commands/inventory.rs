//! `ssot inventory`: bootstrap only and show what the backend holds.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use ssot_core::EntityKind;

#[derive(Args, Debug)]
pub struct InventoryArgs {
    /// Config file (default: <config dir>/ssot/config.yaml).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize, Tabled)]
struct InventoryRow {
    #[tabled(rename = "kind")]
    kind: EntityKind,
    #[tabled(rename = "loaded")]
    loaded: usize,
    #[tabled(rename = "skipped")]
    skipped: usize,
    #[tabled(rename = "sweep candidates")]
    tracked: usize,
}

impl InventoryArgs {
    pub async fn run(self) -> Result<()> {
        let (_, config) = super::load_config(self.config.as_deref())?;
        // Dry-run so a first bootstrap does not create the sentinel tag.
        let reconciler = super::bootstrap(&config, true).await?;

        let rows: Vec<InventoryRow> = reconciler
            .bootstrap_stats()
            .iter()
            .map(|(kind, stats)| InventoryRow {
                kind: *kind,
                loaded: stats.loaded,
                skipped: stats.skipped,
                tracked: stats.tracked,
            })
            .collect();

        if self.json {
            let payload =
                serde_json::to_string_pretty(&rows).context("failed to encode inventory")?;
            println!("{payload}");
            return Ok(());
        }

        let total: usize = rows.iter().map(|row| row.loaded).sum();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        println!("{total} object(s) at {}", config.netbox.url);
        Ok(())
    }
}
