//! Response cache management commands

use colored::Colorize;

use frcpm_offline::error::Result;

use crate::cli::args::GlobalOptions;
use crate::cli::context::{load_config, storage_location};
use crate::cli::{CommandContext, OutputFormat};
use crate::output::{self, display};

/// Show cache status/statistics
pub fn status(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let router = &ctx.offline.router;
    let current = router.cache().name().to_string();
    let stats = router.responses().stats()?;
    let entries = router.cache().entries()?;

    let location = storage_location(ctx.config());

    match ctx.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "current_generation": current,
                "current_entries": entries.len(),
                "current_size_bytes": entries.iter().map(|e| e.size_bytes).sum::<usize>(),
                "generations": stats,
                "path": location,
            });
            output::print_json(&json)?;
        }
        _ => {
            let total_size: usize = stats.iter().map(|s| s.total_size_bytes).sum();
            let total_entries: usize = stats.iter().map(|s| s.entries).sum();

            println!("{}", "Response Cache".bold());
            println!("────────────────────────────────────────");
            println!("Location:       {}", location);
            println!("Generation:     {}", current);
            println!("Entries:        {}", entries.len());
            println!("Generations:    {}", stats.len());
            println!("Total entries:  {}", total_entries);
            println!("Total size:     {}", display::format_size(total_size));

            let oldest = stats.iter().filter_map(|s| s.oldest_entry).min();
            let newest = stats.iter().filter_map(|s| s.newest_entry).max();
            if let Some(oldest) = oldest {
                println!("Oldest entry:   {}", display::format_time(oldest));
            }
            if let Some(newest) = newest {
                println!("Newest entry:   {}", display::format_time(newest));
            }

            let stale = stats.iter().filter(|s| s.name != current).count();
            if stale > 0 {
                println!();
                println!(
                    "{} {} old generation(s) waiting for activation",
                    "→".yellow(),
                    stale
                );
            }
        }
    }

    Ok(())
}

/// Clear all cached responses. The current generation is emptied, older
/// ones are deleted outright.
pub fn clear(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let router = &ctx.offline.router;
    let current = router.cache().name();

    let mut removed = 0;
    for stats in router.responses().stats()? {
        if stats.name == current {
            removed += router.cache().clear()?;
        } else {
            removed += stats.entries;
            router.responses().delete(&stats.name)?;
        }
    }

    match ctx.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "entries_removed": removed,
                "success": true,
            });
            output::print_json(&json)?;
        }
        _ => {
            if removed > 0 {
                println!("Cleared {} cached responses", removed);
            } else {
                println!("Cache was already empty");
            }
        }
    }

    Ok(())
}

/// Show the data directory
pub fn path(opts: &GlobalOptions) -> Result<()> {
    let config = load_config(opts)?;
    println!("{}", storage_location(&config));
    Ok(())
}
