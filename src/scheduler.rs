//! Background task ownership
//!
//! Recurring and delayed jobs run on the tokio runtime until their shared
//! cancellation token fires.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Owner of every background task of a process
pub struct BackgroundTasks {
    shutdown: CancellationToken,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Token cancelled at shutdown
    pub fn token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Number of tasks spawned so far
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Run `job` every `period`, first run one period from now
    pub fn spawn_recurring<F, Fut>(&mut self, name: &'static str, period: Duration, job: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        log::debug!("Running {}", name);
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = job() => {}
                        }
                    }
                }
            }
            log::debug!("{} stopped", name);
        });
        self.handles.push((name, handle));
    }

    /// Run `job` once after `delay`, unless shut down first
    pub fn spawn_delayed<Fut>(&mut self, name: &'static str, delay: Duration, job: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => log::debug!("{} cancelled", name),
                _ = async {
                    tokio::time::sleep(delay).await;
                    job.await;
                } => {}
            }
        });
        self.handles.retain(|(_, h)| !h.is_finished());
        self.handles.push((name, handle));
    }

    /// Cancel every task and wait for them to stop
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    log::warn!("Background task {} panicked: {}", name, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_recurring_skips_immediate_run() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut tasks = BackgroundTasks::new();
        let c = Arc::clone(&count);
        tasks.spawn_recurring("tick", Duration::from_secs(60), move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        tasks.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_recurring() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut tasks = BackgroundTasks::new();
        let c = Arc::clone(&count);
        tasks.spawn_recurring("tick", Duration::from_secs(1), move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(1500)).await;
        tasks.shutdown().await;
        let after = count.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), after);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_runs_once_after_delay() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut tasks = BackgroundTasks::new();
        let c = Arc::clone(&count);
        tasks.spawn_delayed("later", Duration::from_secs(5), async move {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tasks.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_cancelled_by_shutdown() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut tasks = BackgroundTasks::new();
        let c = Arc::clone(&count);
        tasks.spawn_delayed("later", Duration::from_secs(5), async move {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tasks.shutdown().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
