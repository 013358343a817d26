//! Status command implementation

use std::sync::Arc;

use colored::Colorize;
use serde::Serialize;

use frcpm_offline::error::Result;
use frcpm_offline::monitor::ConnectivityMonitor;
use frcpm_offline::sync::SyncQueue;

use crate::cli::args::GlobalOptions;
use crate::cli::context::{config_path, storage_location};
use crate::cli::{CommandContext, OutputFormat};
use crate::output;

#[derive(Serialize)]
struct StatusReport {
    config_file: String,
    origin: String,
    store: String,
    data_dir: String,
    generation: String,
    cached_responses: usize,
    pending: Vec<PendingCount>,
    online: bool,
}

#[derive(Serialize)]
struct PendingCount {
    queue: SyncQueue,
    items: usize,
}

/// Run the status command to display configuration and storage status
pub async fn run(opts: &GlobalOptions) -> Result<()> {
    let path = config_path(opts)?;
    let ctx = match CommandContext::new(opts) {
        Ok(ctx) => ctx,
        Err(e) if opts.format != OutputFormat::Json => {
            println!("{}\n", "frcpm-offline Status".bold());
            println!("Config file: {}", path.display().to_string().cyan());
            println!("{} Configuration unusable: {}", "✗".red(), e);
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    let offline = &ctx.offline;

    let mut pending = Vec::with_capacity(SyncQueue::ALL.len());
    for queue in SyncQueue::ALL {
        let items = offline.sync.pending(queue).await?.len();
        pending.push(PendingCount { queue, items });
    }

    let mut monitor = ConnectivityMonitor::new(
        Arc::clone(&offline.network),
        offline.router.origin().clone(),
    );
    monitor.probe().await;

    let report = StatusReport {
        config_file: path.display().to_string(),
        origin: offline.router.origin().to_string(),
        store: offline.store.backend().to_string(),
        data_dir: storage_location(ctx.config()),
        generation: offline.router.cache().name().to_string(),
        cached_responses: offline.router.cache().entries()?.len(),
        pending,
        online: monitor.is_online() == Some(true),
    };

    match ctx.format {
        OutputFormat::Json => output::print_json(&report)?,
        _ => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &StatusReport) {
    println!("{}\n", "frcpm-offline Status".bold());
    println!("Config file: {}", report.config_file.cyan());
    println!("Origin:      {}", report.origin.cyan());
    println!("Store:       {}", report.store);
    println!("Data dir:    {}", report.data_dir);
    println!();

    if report.online {
        println!("{} Origin reachable", "✓".green());
    } else {
        println!("{} Origin unreachable (serving from cache)", "✗".red());
    }

    if report.cached_responses > 0 {
        println!(
            "{} Generation {} holds {} responses",
            "✓".green(),
            report.generation.bold(),
            report.cached_responses
        );
    } else {
        println!(
            "{} Generation {} is empty",
            "○".dimmed(),
            report.generation.bold()
        );
        println!("  → Run 'frcpm-offline worker install' to precache it");
    }

    let total: usize = report.pending.iter().map(|p| p.items).sum();
    if total == 0 {
        println!("{} No queued writes", "✓".green());
    } else {
        println!("{} {} queued writes", "⚠".yellow(), total);
        for p in report.pending.iter().filter(|p| p.items > 0) {
            println!("  {} {}", p.queue.to_string().dimmed(), p.items);
        }
        println!("  → Run 'frcpm-offline sync replay' once back online");
    }
    println!();
}
