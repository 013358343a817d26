//! Typed data cache commands

use std::time::Duration;

use colored::Colorize;
use serde_json::Value;
use tabled::Tabled;

use frcpm_offline::error::{Error, Result};
use frcpm_offline::typed_cache::{
    CacheOptions, PreloadOutcome, SizeInfo, StatsSnapshot, Workflow, create_cache_key,
};

use crate::cli::args::GlobalOptions;
use crate::cli::{CommandContext, OutputFormat};
use crate::output::{self, display};

#[derive(Tabled)]
struct StatsRow {
    #[tabled(rename = "TYPE")]
    cache_type: String,
    #[tabled(rename = "HITS")]
    hits: u64,
    #[tabled(rename = "MISSES")]
    misses: u64,
    #[tabled(rename = "SIZE")]
    size: u64,
    #[tabled(rename = "HIT RATE")]
    hit_rate: String,
    #[tabled(rename = "LAST ACCESS")]
    last_access: String,
}

impl From<&StatsSnapshot> for StatsRow {
    fn from(s: &StatsSnapshot) -> Self {
        Self {
            cache_type: s.cache_type.to_string(),
            hits: s.hits,
            misses: s.misses,
            size: s.size,
            hit_rate: format_rate(s.hit_rate),
            last_access: display::format_optional_time(s.last_access),
        }
    }
}

#[derive(Tabled)]
struct SizeRow {
    #[tabled(rename = "TYPE")]
    cache_type: String,
    #[tabled(rename = "ENTRIES")]
    entries: usize,
    #[tabled(rename = "TOTAL")]
    total: String,
    #[tabled(rename = "AVERAGE")]
    average: String,
}

impl From<&SizeInfo> for SizeRow {
    fn from(s: &SizeInfo) -> Self {
        Self {
            cache_type: s.cache_type.to_string(),
            entries: s.entries,
            total: display::format_size(s.total_size),
            average: display::format_size(s.average_size.round() as usize),
        }
    }
}

fn format_rate(rate: Option<f64>) -> String {
    rate.map(|r| format!("{:.2}", r))
        .unwrap_or_else(|| "-".to_string())
}

/// Print a cached value
pub async fn get(opts: &GlobalOptions, cache_type: &str, key: &str) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let value: Value = ctx
        .offline
        .typed
        .get_cached_data(cache_type, key)
        .await
        .ok_or_else(|| Error::Other(format!("{}/{} is not cached", cache_type, key)))?;

    match ctx.format {
        OutputFormat::Json => output::print_json(&value)?,
        _ => println!("{}", serde_json::to_string_pretty(&value)?),
    }
    Ok(())
}

/// Cache a JSON value under a type's policy
pub async fn put(
    opts: &GlobalOptions,
    cache_type: &str,
    key: &str,
    value: &str,
    max_age: Option<u64>,
) -> Result<()> {
    let value: Value = serde_json::from_str(value)?;
    let ctx = CommandContext::new(opts)?;
    let options = CacheOptions {
        max_age: max_age.map(Duration::from_secs),
    };

    if !ctx.offline.typed.cache_data(cache_type, key, &value, options).await {
        return Err(Error::Other(format!("failed to cache {}/{}", cache_type, key)));
    }

    match ctx.format {
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "type": cache_type,
            "key": key,
            "cached": true,
        }))?,
        _ => println!("{} Cached {}/{}", "✓".green(), cache_type, key),
    }
    Ok(())
}

/// Drop one entry or a whole type
pub async fn invalidate(opts: &GlobalOptions, cache_type: &str, key: Option<&str>) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let removed = ctx.offline.typed.invalidate_cache(cache_type, key).await?;
    print_removed(ctx.format, removed)
}

/// Hit/miss statistics recorded in the store
pub async fn stats(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let stats = ctx.offline.typed.get_cache_stats().await;

    match ctx.format {
        OutputFormat::Json => output::print_json(&stats)?,
        _ => {
            let rows: Vec<StatsRow> = stats.iter().map(StatsRow::from).collect();
            output::print_table(&rows);
        }
    }
    Ok(())
}

/// Stored entries and sizes per type
pub async fn size(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let info = ctx.offline.typed.get_cache_size_info().await?;

    match ctx.format {
        OutputFormat::Json => output::print_json(&info)?,
        _ => {
            let rows: Vec<SizeRow> = info.iter().map(SizeRow::from).collect();
            output::print_table(&rows);
        }
    }
    Ok(())
}

/// Preload every type marked for preloading
pub async fn preload(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let outcome = ctx.offline.typed.preload_critical_data().await;

    match ctx.format {
        OutputFormat::Json => output::print_json(&outcome)?,
        _ => match outcome {
            PreloadOutcome::Completed { cached } => {
                println!("{} Preloaded {} entries", "✓".green(), cached)
            }
            PreloadOutcome::AlreadyRunning => println!("Preload already in progress"),
        },
    }
    Ok(())
}

/// Preload the types of a workflow
pub async fn warm(opts: &GlobalOptions, workflow: &str) -> Result<()> {
    if Workflow::from_name(workflow).is_none() {
        return Err(Error::Other(format!(
            "unknown workflow '{}' (taskManagement, buildSeason, workshop, competition)",
            workflow
        )));
    }
    let ctx = CommandContext::new(opts)?;
    let cached = ctx.offline.typed.warm_up_cache(workflow).await;

    match ctx.format {
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "workflow": workflow,
            "cached": cached,
        }))?,
        _ => println!("{} Warmed {} ({} entries)", "✓".green(), workflow, cached),
    }
    Ok(())
}

/// Purge expired entries of every type
pub async fn sweep(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let removed = ctx.offline.typed.perform_maintenance().await;
    print_removed(ctx.format, removed)
}

/// Invalidate every type
pub async fn clear(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let removed = ctx.offline.typed.clear_all_caches().await?;
    print_removed(ctx.format, removed)
}

/// Print the cache key for a base and `name=value` params
pub fn key(opts: &GlobalOptions, base: &str, params: &[String]) -> Result<()> {
    let pairs = params
        .iter()
        .map(|p| parse_param(p))
        .collect::<Result<Vec<_>>>()?;
    let key = create_cache_key(base, pairs);

    match opts.format {
        OutputFormat::Json => output::print_json(&serde_json::json!({ "key": key }))?,
        _ => println!("{}", key),
    }
    Ok(())
}

fn parse_param(param: &str) -> Result<(&str, &str)> {
    param
        .split_once('=')
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| Error::Other(format!("expected name=value, got '{}'", param)))
}

fn print_removed(format: OutputFormat, removed: usize) -> Result<()> {
    match format {
        OutputFormat::Json => output::print_json(&serde_json::json!({ "removed": removed }))?,
        _ => println!("Removed {} entries", removed),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("status=open").unwrap(), ("status", "open"));
        assert_eq!(parse_param("q=a=b").unwrap(), ("q", "a=b"));
        assert_eq!(parse_param("empty=").unwrap(), ("empty", ""));
    }

    #[test]
    fn test_parse_param_rejects_bare_names() {
        assert!(parse_param("status").is_err());
        assert!(parse_param("=open").is_err());
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(Some(0.75)), "0.75");
        assert_eq!(format_rate(None), "-");
    }
}
