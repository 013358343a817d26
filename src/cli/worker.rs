//! Response-cache lifecycle commands

use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use frcpm_offline::error::Result;
use frcpm_offline::response_cache::GenerationStats;
use frcpm_offline::router::{ActivateReport, InstallReport};

use crate::cli::args::GlobalOptions;
use crate::cli::{CommandContext, OutputFormat};
use crate::output::{self, display};

#[derive(Tabled)]
struct GenerationRow {
    #[tabled(rename = "GENERATION")]
    name: String,
    #[tabled(rename = "CURRENT")]
    current: String,
    #[tabled(rename = "ENTRIES")]
    entries: usize,
    #[tabled(rename = "SIZE")]
    size: String,
    #[tabled(rename = "NEWEST")]
    newest: String,
}

impl GenerationRow {
    fn new(stats: &GenerationStats, current: &str) -> Self {
        Self {
            name: stats.name.clone(),
            current: if stats.name == current { "*" } else { "" }.to_string(),
            entries: stats.entries,
            size: display::format_size(stats.total_size_bytes),
            newest: display::format_optional_time(stats.newest_entry),
        }
    }
}

/// What `worker install` did
#[derive(Serialize)]
struct InstallOutcome {
    install: InstallReport,
    activate: Option<ActivateReport>,
}

/// Precache the install manifest, then activate when the new generation
/// skips waiting
pub async fn install(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let install = ctx.offline.router.install().await?;
    let activate = if install.skip_waiting {
        Some(ctx.offline.router.activate().await?)
    } else {
        None
    };

    match ctx.format {
        OutputFormat::Json => output::print_json(&InstallOutcome { install, activate })?,
        _ => {
            println!(
                "{} Installed {} ({} resources)",
                "✓".green(),
                install.generation.bold(),
                install.cached.len()
            );
            for url in &install.cached {
                println!("  {}", url.dimmed());
            }
            if let Some(report) = &activate {
                print_activated(report);
            }
        }
    }
    Ok(())
}

/// Delete every generation but the current one
pub async fn activate(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let report = ctx.offline.router.activate().await?;

    match ctx.format {
        OutputFormat::Json => output::print_json(&report)?,
        _ => print_activated(&report),
    }
    Ok(())
}

fn print_activated(report: &ActivateReport) {
    println!("{} Activated {}", "✓".green(), report.generation.bold());
    if report.deleted.is_empty() {
        println!("  No old generations");
    }
    for name in &report.deleted {
        println!("  Deleted {}", name.dimmed());
    }
}

/// Remove responses past their max-age
pub fn sweep(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let removed = ctx.offline.router.sweep_expired()?;

    match ctx.format {
        OutputFormat::Json => {
            output::print_json(&serde_json::json!({ "removed": removed }))?
        }
        _ => println!("Removed {} expired responses", removed),
    }
    Ok(())
}

/// List generations
pub fn generations(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let router = &ctx.offline.router;
    let current = router.cache().name();
    let stats = router.responses().stats()?;

    match ctx.format {
        OutputFormat::Json => output::print_json(&stats)?,
        OutputFormat::Table => {
            let rows: Vec<GenerationRow> =
                stats.iter().map(|s| GenerationRow::new(s, current)).collect();
            output::print_table(&rows);
        }
        OutputFormat::Pretty => {
            for s in &stats {
                let marker = if s.name == current {
                    "●".green()
                } else {
                    "○".dimmed()
                };
                println!(
                    "{} {}  {} entries, {}",
                    marker,
                    s.name.bold(),
                    s.entries,
                    display::format_size(s.total_size_bytes)
                );
            }
        }
    }
    Ok(())
}
