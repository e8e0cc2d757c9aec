//! `ssot run`: bootstrap, run every configured source, sweep and report.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use ssot_file_source::FileSource;
use ssot_sync::{RunReport, Source, SweepOutcome};

/// Arguments for `ssot run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Config file (default: <config dir>/ssot/config.yaml).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Compute every change but send no writes.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the run report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub async fn run(self) -> Result<()> {
        let (_, config) = super::load_config(self.config.as_deref())?;
        let reconciler = super::bootstrap(&config, self.dry_run).await?;

        let sources: Vec<Arc<dyn Source>> = config
            .sources
            .iter()
            .map(|source| Arc::new(FileSource::from_config(source)) as Arc<dyn Source>)
            .collect();
        let report = reconciler.run(sources).await;

        if self.json {
            let payload =
                serde_json::to_string_pretty(&report).context("failed to encode run report")?;
            println!("{payload}");
        } else {
            print_report(&report);
        }

        if report.aborted {
            bail!("run aborted");
        }
        if !report.is_clean() {
            bail!("run finished with {} error(s)", error_count(&report));
        }
        Ok(())
    }
}

fn error_count(report: &RunReport) -> usize {
    let failed_sources = report.sources.iter().filter(|s| !s.succeeded()).count();
    report.errors.len() + failed_sources + report.sweep_failures()
}

// ---------------------------------------------------------------------------
// Table output
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct KindRow {
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "created")]
    created: usize,
    #[tabled(rename = "patched")]
    patched: usize,
    #[tabled(rename = "unchanged")]
    unchanged: usize,
    #[tabled(rename = "failed")]
    failed: usize,
}

#[derive(Tabled)]
struct SweepRow {
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "object")]
    key: String,
    #[tabled(rename = "id")]
    id: u64,
    #[tabled(rename = "outcome")]
    outcome: String,
}

fn print_report(report: &RunReport) {
    let mode = if report.dry_run {
        " (dry run)".yellow().to_string()
    } else {
        String::new()
    };
    let elapsed = report.finished_at - report.started_at;
    println!(
        "Run started {}{mode}, took {:.1}s",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        elapsed.num_milliseconds() as f64 / 1000.0,
    );

    for source in &report.sources {
        match &source.error {
            None => println!("  {} {}", "✓".green(), source.name),
            Some(err) => println!("  {} {}: {err}", "✗".red(), source.name),
        }
    }

    let rows: Vec<KindRow> = report
        .kinds
        .iter()
        .filter(|(_, tally)| !tally.is_empty())
        .map(|(kind, tally)| {
            // In dry-run the would-be counts stand in for the real ones.
            KindRow {
                kind: kind.to_string(),
                created: tally.created + tally.would_create,
                patched: tally.patched + tally.would_patch,
                unchanged: tally.unchanged,
                failed: tally.failed,
            }
        })
        .collect();
    if rows.is_empty() {
        println!("No objects submitted.");
    } else {
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    print_sweep(report);

    if !report.errors.is_empty() {
        println!("{}", format!("{} error(s):", report.errors.len()).red().bold());
        for error in &report.errors {
            let mut context = Vec::new();
            if let Some(source) = &error.source {
                context.push(source.to_string());
            }
            if let Some(kind) = error.kind {
                context.push(kind.to_string());
            }
            if let Some(object) = &error.object {
                context.push(object.clone());
            }
            if context.is_empty() {
                println!("  {}", error.message);
            } else {
                println!("  [{}] {}", context.join(" "), error.message);
            }
        }
    }

    if report.aborted {
        println!("{}", "Run aborted: remaining work was not submitted.".red().bold());
    } else if report.is_clean() {
        println!("{}", "✓ Reconciled".green().bold());
    }
}

fn print_sweep(report: &RunReport) {
    if let Some(reason) = &report.sweep_skipped {
        println!("Sweep skipped: {}", reason.yellow());
        return;
    }
    if report.sweep.is_empty() {
        println!("Sweep: no orphans.");
        return;
    }

    let rows: Vec<SweepRow> = report
        .sweep
        .iter()
        .map(|entry| SweepRow {
            kind: entry.kind.to_string(),
            key: entry.key.clone(),
            id: entry.id.0,
            outcome: match &entry.outcome {
                SweepOutcome::Deleted => "deleted".red().to_string(),
                SweepOutcome::AlreadyGone => "already gone".dimmed().to_string(),
                SweepOutcome::WouldDelete => "would delete".yellow().to_string(),
                SweepOutcome::Failed { error } => format!("{} {error}", "failed:".red()),
                SweepOutcome::Cancelled => "cancelled".dimmed().to_string(),
            },
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
