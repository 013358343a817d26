//! Long-running host for the offline layer
//!
//! Installs and activates the current generation, then keeps the background
//! sweeps running and watches connectivity. Coming back online replays every
//! sync queue and schedules a preload.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use frcpm_offline::OfflineContext;
use frcpm_offline::error::Result;
use frcpm_offline::monitor::{ConnectivityMonitor, Transition};
use frcpm_offline::scheduler::BackgroundTasks;
use frcpm_offline::typed_cache::CacheType;

use crate::cli::CommandContext;
use crate::cli::args::GlobalOptions;

pub async fn run(opts: &GlobalOptions, no_install: bool) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let offline = &ctx.offline;

    if !no_install {
        install_and_activate(offline).await;
    }

    let mut tasks = BackgroundTasks::new();
    offline.schedule_maintenance(&mut tasks);
    let listeners = register_update_listeners(offline);

    let mut monitor = ConnectivityMonitor::new(
        Arc::clone(&offline.network),
        offline.router.origin().clone(),
    );
    monitor.probe().await;
    match monitor.is_online() {
        Some(true) if offline.config.preload.on_start => {
            let typed = offline.typed.clone();
            tasks.spawn_delayed("startup-preload", Duration::ZERO, async move {
                typed.preload_critical_data().await;
            });
        }
        Some(true) => {}
        _ => log::warn!("{} is unreachable, running offline", offline.router.origin()),
    }

    log::info!(
        "Offline layer running for {} (Ctrl-C to stop)",
        offline.router.origin()
    );

    let mut probe = tokio::time::interval(offline.config.probe_interval());
    probe.set_missed_tick_behavior(MissedTickBehavior::Delay);
    probe.tick().await;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    log::error!("Failed to listen for Ctrl-C: {}", e);
                }
                break;
            }
            _ = probe.tick() => {
                if monitor.probe().await == Transition::WentOnline {
                    offline.on_reconnect(&mut tasks).await;
                }
            }
        }
    }

    log::info!("Shutting down");
    for listener in listeners {
        listener.abort();
    }
    tasks.shutdown().await;
    Ok(())
}

async fn install_and_activate(offline: &OfflineContext) {
    match offline.router.install().await {
        Ok(report) => {
            log::info!(
                "Installed {} ({} resources)",
                report.generation,
                report.cached.len()
            );
            match offline.router.activate().await {
                Ok(report) if !report.deleted.is_empty() => {
                    log::info!("Deleted old generations: {}", report.deleted.join(", "))
                }
                Ok(_) => {}
                Err(e) => log::error!("Activation failed: {}", e),
            }
        }
        Err(e) => log::error!("{}", e),
    }
}

fn register_update_listeners(offline: &OfflineContext) -> Vec<JoinHandle<()>> {
    CacheType::ALL
        .into_iter()
        .map(|cache_type| {
            offline.typed.on_data_update(
                cache_type,
                Some(Box::new(move || {
                    log::debug!("{} cache invalidated by update", cache_type)
                })),
            )
        })
        .collect()
}
