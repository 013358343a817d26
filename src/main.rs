//! frcpm-offline CLI - offline layer of the FRC Project Management System

use clap::Parser;
use env_logger::{Builder, Env};

mod cli;
mod output;

use cli::args::GlobalOptions;
use cli::{CacheCommands, Cli, Commands, DataCommands, SyncCommands, WorkerCommands};
use frcpm_offline::Result;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    Builder::from_env(Env::default().default_filter_or(level))
        .format_target(false)
        .init();

    let opts = GlobalOptions::from_cli(&cli);

    match cli.command {
        Commands::Init { force } => cli::init::run(&opts, force),
        Commands::Fetch(args) => cli::fetch::run(&opts, args).await,
        Commands::Worker(cmd) => match cmd {
            WorkerCommands::Install => cli::worker::install(&opts).await,
            WorkerCommands::Activate => cli::worker::activate(&opts).await,
            WorkerCommands::Sweep => cli::worker::sweep(&opts),
            WorkerCommands::Generations => cli::worker::generations(&opts),
        },
        Commands::Cache(cmd) => match cmd {
            CacheCommands::Status => cli::cache::status(&opts),
            CacheCommands::Clear => cli::cache::clear(&opts),
            CacheCommands::Path => cli::cache::path(&opts),
        },
        Commands::Data(cmd) => match cmd {
            DataCommands::Get { cache_type, key } => {
                cli::data::get(&opts, &cache_type, &key).await
            }
            DataCommands::Put {
                cache_type,
                key,
                value,
                max_age,
            } => cli::data::put(&opts, &cache_type, &key, &value, max_age).await,
            DataCommands::Invalidate { cache_type, key } => {
                cli::data::invalidate(&opts, &cache_type, key.as_deref()).await
            }
            DataCommands::Stats => cli::data::stats(&opts).await,
            DataCommands::Size => cli::data::size(&opts).await,
            DataCommands::Preload => cli::data::preload(&opts).await,
            DataCommands::Warm { workflow } => cli::data::warm(&opts, &workflow).await,
            DataCommands::Sweep => cli::data::sweep(&opts).await,
            DataCommands::Clear => cli::data::clear(&opts).await,
            DataCommands::Key { base, params } => cli::data::key(&opts, &base, &params),
        },
        Commands::Sync(cmd) => match cmd {
            SyncCommands::List { queue } => cli::sync::list(&opts, queue).await,
            SyncCommands::Enqueue {
                queue,
                method,
                url,
                headers,
                data,
            } => cli::sync::enqueue(&opts, queue, &method, &url, &headers, data).await,
            SyncCommands::Replay { tag } => cli::sync::replay(&opts, tag.as_deref()).await,
            SyncCommands::Discard { queue, id } => cli::sync::discard(&opts, queue, &id).await,
        },
        Commands::Run { no_install } => cli::run::run(&opts, no_install).await,
        Commands::Status => cli::status::run(&opts).await,
        Commands::Version => {
            println!("frcpm-offline version {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
