//! CLI command definitions and handlers

use clap::{Parser, Subcommand};
use reqwest::Method;

use frcpm_offline::error::{Error, Result as AppResult};
use frcpm_offline::router::Strategy;
use frcpm_offline::sync::SyncQueue;
use frcpm_offline::typed_cache::CacheType;

pub mod args;
pub mod cache;
pub mod context;
pub mod data;
pub mod fetch;
pub mod init;
pub mod run;
pub mod status;
pub mod sync;
pub mod worker;

pub use args::{HeaderArg, OutputFormat};
pub use context::CommandContext;

/// frcpm-offline - offline layer of the FRC Project Management System
#[derive(Parser, Debug)]
#[command(name = "frcpm-offline")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (pretty, table, json)
    #[arg(
        long,
        global = true,
        env = "FRCPM_FORMAT",
        default_value = "pretty",
        hide_env = true,
        hide_possible_values = true
    )]
    pub format: OutputFormat,

    /// Override config file location
    #[arg(long, global = true, env = "FRCPM_CONFIG", hide_env = true)]
    pub config: Option<String>,

    /// Override the application origin
    #[arg(long, global = true, env = "FRCPM_ORIGIN", hide_env = true)]
    pub origin: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, env = "FRCPM_DEBUG", hide_env = true)]
    pub debug: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a config file with defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Route one request through the offline layer
    Fetch(fetch::FetchArgs),

    /// Install, activate and sweep response-cache generations
    #[command(subcommand)]
    Worker(WorkerCommands),

    /// Inspect or clear the response cache
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Work with the typed data cache
    #[command(subcommand)]
    Data(DataCommands),

    /// Manage deferred-write queues
    #[command(subcommand)]
    Sync(SyncCommands),

    /// Run the background host: sweeps, reconnect replay and preload
    Run {
        /// Skip install and activation at startup
        #[arg(long)]
        no_install: bool,
    },

    /// Show configuration and storage status
    Status,

    /// Display version information
    Version,
}

/// Response-cache lifecycle subcommands
#[derive(Subcommand, Debug)]
pub enum WorkerCommands {
    /// Precache the install manifest into the current generation and activate it
    Install,

    /// Delete every generation except the current one
    Activate,

    /// Delete responses older than their category max-age
    Sweep,

    /// List cache generations
    Generations,
}

/// Response-cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show response cache statistics
    Status,

    /// Delete every cached response
    Clear,

    /// Show the data directory
    Path,
}

/// Typed-cache subcommands
#[derive(Subcommand, Debug)]
pub enum DataCommands {
    /// Read a cached value
    Get {
        /// Data type (tasks, projects, teamMembers, ...)
        #[arg(value_parser = parse_cache_type_name)]
        cache_type: String,
        key: String,
    },

    /// Cache a JSON value
    Put {
        #[arg(value_parser = parse_cache_type_name)]
        cache_type: String,
        key: String,
        /// JSON value to store
        value: String,
        /// Override the type's max age (seconds)
        #[arg(long)]
        max_age: Option<u64>,
    },

    /// Drop one entry, or every entry of a type
    Invalidate {
        #[arg(value_parser = parse_cache_type_name)]
        cache_type: String,
        key: Option<String>,
    },

    /// Show hit/miss statistics per type
    Stats,

    /// Show stored entry counts and sizes per type
    Size,

    /// Preload every type marked for preloading
    Preload,

    /// Preload the types of a workflow
    Warm {
        /// taskManagement, buildSeason, workshop or competition
        workflow: String,
    },

    /// Purge expired entries of every type
    Sweep,

    /// Invalidate every type
    Clear,

    /// Print a cache key built from a base and params
    Key {
        base: String,
        /// Parameters as name=value
        params: Vec<String>,
    },
}

/// Sync queue subcommands
#[derive(Subcommand, Debug)]
pub enum SyncCommands {
    /// List queued writes
    List {
        /// Queue (task-updates, milestone-updates, ...); all when omitted
        #[arg(value_parser = parse_queue)]
        queue: Option<SyncQueue>,
    },

    /// Queue a write for later replay
    Enqueue {
        #[arg(value_parser = parse_queue)]
        queue: SyncQueue,
        /// HTTP method
        method: String,
        /// URL or origin-relative path
        url: String,
        /// Request header as 'Name: value'
        #[arg(long = "header", short = 'H')]
        headers: Vec<HeaderArg>,
        /// Request body
        #[arg(long, short = 'd')]
        data: Option<String>,
    },

    /// Fire a sync trigger; every queue when no tag is given
    Replay {
        /// Sync tag
        tag: Option<String>,
    },

    /// Drop a queued write without replaying it
    Discard {
        #[arg(value_parser = parse_queue)]
        queue: SyncQueue,
        id: String,
    },
}

fn parse_queue(s: &str) -> Result<SyncQueue, String> {
    s.parse::<SyncQueue>().map_err(|e| e.to_string())
}

fn parse_cache_type_name(s: &str) -> Result<String, String> {
    s.parse::<CacheType>()
        .map(|t| t.as_str().to_string())
        .map_err(|e| e.to_string())
}

pub(crate) fn parse_strategy(s: &str) -> Result<Strategy, String> {
    s.parse()
}

/// Parse an HTTP method name, case-insensitively
pub(crate) fn parse_method(s: &str) -> AppResult<Method> {
    Method::from_bytes(s.to_uppercase().as_bytes())
        .map_err(|_| Error::Other(format!("invalid method '{}'", s)))
}
