//! Deferred-write queue commands

use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use frcpm_offline::error::{Error, Result};
use frcpm_offline::net::Request;
use frcpm_offline::sync::{QueuedRequest, ReplayReport, SyncQueue};

use crate::cli::args::GlobalOptions;
use crate::cli::{CommandContext, HeaderArg, OutputFormat, parse_method};
use crate::output::{self, display};

#[derive(Serialize)]
struct QueueListing {
    queue: SyncQueue,
    items: Vec<QueuedRequest>,
}

#[derive(Tabled)]
struct QueuedRow {
    #[tabled(rename = "QUEUE")]
    queue: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "METHOD")]
    method: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "ATTEMPTS")]
    attempts: u32,
    #[tabled(rename = "LAST ERROR")]
    last_error: String,
    #[tabled(rename = "QUEUED")]
    queued_at: String,
}

impl QueuedRow {
    fn new(queue: SyncQueue, item: &QueuedRequest) -> Self {
        Self {
            queue: queue.to_string(),
            id: item.id.clone(),
            method: item.method.clone(),
            url: display::truncate_string(&item.url, 60),
            attempts: item.attempts,
            last_error: item.last_error.clone().unwrap_or_else(|| "-".to_string()),
            queued_at: display::format_time(item.queued_at),
        }
    }
}

#[derive(Tabled)]
struct ReplayRow {
    #[tabled(rename = "QUEUE")]
    queue: String,
    #[tabled(rename = "ATTEMPTED")]
    attempted: usize,
    #[tabled(rename = "SYNCED")]
    synced: usize,
    #[tabled(rename = "FAILED")]
    failed: usize,
}

impl From<&ReplayReport> for ReplayRow {
    fn from(r: &ReplayReport) -> Self {
        Self {
            queue: r.queue.clone(),
            attempted: r.attempted,
            synced: r.synced,
            failed: r.failed,
        }
    }
}

/// List queued writes of one queue or all of them
pub async fn list(opts: &GlobalOptions, queue: Option<SyncQueue>) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let queues = match queue {
        Some(q) => vec![q],
        None => SyncQueue::ALL.to_vec(),
    };

    let mut listings = Vec::with_capacity(queues.len());
    for queue in queues {
        let items = ctx.offline.sync.pending(queue).await?;
        listings.push(QueueListing { queue, items });
    }

    match ctx.format {
        OutputFormat::Json => output::print_json(&listings)?,
        OutputFormat::Table => {
            let rows: Vec<QueuedRow> = listings
                .iter()
                .flat_map(|l| l.items.iter().map(|item| QueuedRow::new(l.queue, item)))
                .collect();
            output::print_table(&rows);
        }
        OutputFormat::Pretty => {
            for listing in &listings {
                println!(
                    "{} ({} pending)",
                    listing.queue.to_string().bold(),
                    listing.items.len()
                );
                for item in &listing.items {
                    let attempts = if item.attempts > 0 {
                        format!(" [{} attempts: {}]", item.attempts, item.last_error.as_deref().unwrap_or("-"))
                            .yellow()
                            .to_string()
                    } else {
                        String::new()
                    };
                    println!(
                        "  {} {} {}{}",
                        item.id.dimmed(),
                        item.method,
                        item.url,
                        attempts
                    );
                }
            }
        }
    }
    Ok(())
}

/// Queue a write for later replay
pub async fn enqueue(
    opts: &GlobalOptions,
    queue: SyncQueue,
    method: &str,
    url: &str,
    headers: &[HeaderArg],
    data: Option<String>,
) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let mut request = Request::new(parse_method(method)?, ctx.offline.router.resolve(url)?);
    for header in headers {
        request = request.with_header(&header.name, &header.value);
    }
    if let Some(data) = data {
        request = request.with_body(data);
    }

    let item = ctx.offline.sync.enqueue(queue, &request).await?;

    match ctx.format {
        OutputFormat::Json => output::print_json(&item)?,
        _ => println!("{} Queued {} on {}", "✓".green(), item.id, queue),
    }
    Ok(())
}

/// Fire a sync trigger, or replay every queue
pub async fn replay(opts: &GlobalOptions, tag: Option<&str>) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let reports = match tag {
        Some(tag) => match ctx.offline.sync.handle_sync_event(tag).await {
            Some(report) => vec![report],
            None => {
                println!("Unknown sync event: {}", tag);
                return Ok(());
            }
        },
        None => ctx.offline.sync.replay_all().await,
    };

    match ctx.format {
        OutputFormat::Json => output::print_json(&reports)?,
        OutputFormat::Table => {
            let rows: Vec<ReplayRow> = reports.iter().map(ReplayRow::from).collect();
            output::print_table(&rows);
        }
        OutputFormat::Pretty => {
            for report in &reports {
                print_report(report);
            }
        }
    }
    Ok(())
}

fn print_report(report: &ReplayReport) {
    if let Some(error) = &report.error {
        println!("{} {}: {}", "✗".red(), report.queue, error);
    } else if report.failed > 0 {
        println!(
            "{} {}: {} of {} synced, {} still queued",
            "!".yellow(),
            report.queue,
            report.synced,
            report.attempted,
            report.failed
        );
    } else {
        println!(
            "{} {}: {} synced",
            "✓".green(),
            report.queue,
            report.synced
        );
    }
}

/// Drop a queued write
pub async fn discard(opts: &GlobalOptions, queue: SyncQueue, id: &str) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    if !ctx.offline.sync.discard(queue, id).await? {
        return Err(Error::Other(format!("no item {} on {}", id, queue)));
    }

    match ctx.format {
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "queue": queue,
            "id": id,
            "discarded": true,
        }))?,
        _ => println!("{} Discarded {} from {}", "✓".green(), id, queue),
    }
    Ok(())
}
