//! Process-wide wiring
//!
//! [`OfflineContext`] is built once per process and owns every component:
//! the store, the network adapter, the response cache, the router, the typed
//! cache, the sync manager and the update signal.

use std::sync::Arc;

use crate::config::{Config, StoreBackendChoice};
use crate::error::{Result, StoreError};
use crate::net::{HttpNetwork, Network};
use crate::response_cache::ResponseStore;
use crate::router::Router;
use crate::scheduler::BackgroundTasks;
use crate::store::{Store, open_store};
use crate::sync::{ReplayReport, SyncManager, SyncQueue};
use crate::typed_cache::{TypedCache, UpdateSignal};

/// Every component of the offline layer, wired together
pub struct OfflineContext {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub network: Arc<dyn Network>,
    pub router: Arc<Router>,
    pub typed: TypedCache,
    pub sync: SyncManager,
    pub signal: UpdateSignal,
}

impl OfflineContext {
    /// Build the context with the reqwest network adapter
    pub fn from_config(config: Config) -> Result<Self> {
        let network = HttpNetwork::new(config.network_timeout())?;
        Self::new(config, Arc::new(network))
    }

    /// Build the context over any network
    pub fn new(config: Config, network: Arc<dyn Network>) -> Result<Self> {
        let origin = config.origin_url()?;
        let store = open_store(&config)?;
        log::debug!("Using {} store", store.backend());

        let responses = open_responses(&config)?;
        let router = Arc::new(Router::new(&config, Arc::clone(&network), responses)?);

        let signal = UpdateSignal::new();
        let typed = TypedCache::new(
            Arc::clone(&store),
            Arc::clone(&network),
            origin.clone(),
            signal.clone(),
        );
        let sync = SyncManager::new(Arc::clone(&store), Arc::clone(&network), origin);

        Ok(Self {
            config,
            store,
            network,
            router,
            typed,
            sync,
            signal,
        })
    }

    /// Schedule the recurring sweeps: expired responses and typed-cache
    /// maintenance.
    pub fn schedule_maintenance(&self, tasks: &mut BackgroundTasks) {
        let router = Arc::clone(&self.router);
        tasks.spawn_recurring(
            "response-sweep",
            self.config.response_sweep_interval(),
            move || {
                let router = Arc::clone(&router);
                async move {
                    if let Err(e) = router.sweep_expired() {
                        log::warn!("Response cache sweep failed: {}", e);
                    }
                }
            },
        );

        let typed = self.typed.clone();
        tasks.spawn_recurring(
            "typed-maintenance",
            self.config.typed_sweep_interval(),
            move || {
                let typed = typed.clone();
                async move {
                    typed.perform_maintenance().await;
                }
            },
        );
    }

    /// Preload critical data after the configured reconnect delay
    pub fn schedule_preload(&self, tasks: &mut BackgroundTasks) {
        let typed = self.typed.clone();
        tasks.spawn_delayed("preload", self.config.reconnect_delay(), async move {
            typed.preload_critical_data().await;
        });
    }

    /// Connectivity came back: fire the sync trigger of every queue, then
    /// schedule a preload.
    pub async fn on_reconnect(&self, tasks: &mut BackgroundTasks) -> Vec<ReplayReport> {
        let mut reports = Vec::with_capacity(SyncQueue::ALL.len());
        for queue in SyncQueue::ALL {
            if let Some(report) = self.sync.handle_sync_event(queue.tag()).await {
                if report.attempted > 0 {
                    log::info!(
                        "{}: {} synced, {} still queued",
                        report.queue,
                        report.synced,
                        report.failed
                    );
                }
                reports.push(report);
            }
        }
        self.schedule_preload(tasks);
        reports
    }
}

/// Open the response cache database, falling back to memory when the
/// durable location is unusable and the configuration allows it
fn open_responses(config: &Config) -> Result<ResponseStore> {
    let durable = match (config.store.backend, config.data_dir()) {
        (StoreBackendChoice::Bounded, _) => None,
        (StoreBackendChoice::Durable, None) => return Err(StoreError::NoDataDir.into()),
        (_, dir) => dir,
    };

    let Some(dir) = durable else {
        return Ok(ResponseStore::open_in_memory()?);
    };

    match ResponseStore::open_at(&dir) {
        Ok(store) => Ok(store),
        Err(e) if config.store.backend == StoreBackendChoice::Auto => {
            log::warn!("Response cache unavailable ({}), keeping it in memory", e);
            Ok(ResponseStore::open_in_memory()?)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{MockNetwork, Request, Response};
    use crate::store::{Partition, StoreBackend};
    use crate::typed_cache::{CacheEntry, CacheType};
    use chrono::Utc;
    use reqwest::Method;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir, backend: StoreBackendChoice) -> Config {
        let mut config = Config::default();
        config.store.backend = backend;
        config.store.data_dir = Some(dir.path().to_path_buf());
        config
    }

    #[test]
    fn test_durable_context_uses_sqlite() {
        let dir = TempDir::new().unwrap();
        let ctx = OfflineContext::new(
            config_in(&dir, StoreBackendChoice::Durable),
            Arc::new(MockNetwork::new()),
        )
        .unwrap();

        assert_eq!(ctx.store.backend(), StoreBackend::Durable);
        assert!(dir.path().join("store.db").exists());
        assert!(dir.path().join("responses.db").exists());
    }

    #[test]
    fn test_bounded_context_stays_in_memory() {
        let dir = TempDir::new().unwrap();
        let ctx = OfflineContext::new(
            config_in(&dir, StoreBackendChoice::Bounded),
            Arc::new(MockNetwork::new()),
        )
        .unwrap();

        assert_eq!(ctx.store.backend(), StoreBackend::Bounded);
        assert!(!dir.path().join("responses.db").exists());
    }

    #[test]
    fn test_current_generation_comes_from_config() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir, StoreBackendChoice::Bounded);
        config.cache_name = "frc-pm-test".to_string();
        let ctx = OfflineContext::new(config, Arc::new(MockNetwork::new())).unwrap();

        assert_eq!(ctx.router.cache().name(), "frc-pm-test");
    }

    fn paused_context(mock: &MockNetwork) -> (TempDir, OfflineContext) {
        let dir = TempDir::new().unwrap();
        let ctx = OfflineContext::new(
            config_in(&dir, StoreBackendChoice::Bounded),
            Arc::new(mock.clone()),
        )
        .unwrap();
        (dir, ctx)
    }

    /// Let spawned tasks run until every one of them is waiting on a timer
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn url(path: &str) -> String {
        format!("http://localhost:8080{}", path)
    }

    #[test]
    fn test_default_schedule() {
        let config = Config::default();
        assert_eq!(config.response_sweep_interval(), Duration::from_secs(24 * 60 * 60));
        assert_eq!(config.typed_sweep_interval(), Duration::from_secs(30 * 60));
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_replays_queues_then_preloads_after_delay() {
        let mock = MockNetwork::new()
            .with_response(&url("/api/tasks/7"), Response::new(200, "{}"))
            .with_response(&url("/api/tasks"), Response::text(200, "[]"));
        let (_dir, ctx) = paused_context(&mock);

        let task = Request::new(Method::PUT, ctx.router.resolve("/api/tasks/7").unwrap())
            .with_body(&b"{\"progress\":50}"[..]);
        ctx.sync.enqueue(SyncQueue::TaskUpdates, &task).await.unwrap();
        let weight = Request::new(Method::POST, ctx.router.resolve("/api/robots/2/weight").unwrap());
        ctx.sync.enqueue(SyncQueue::RobotWeightUpdates, &weight).await.unwrap();

        let mut tasks = BackgroundTasks::new();
        let reports = ctx.on_reconnect(&mut tasks).await;

        assert_eq!(reports.len(), SyncQueue::ALL.len());
        let tasks_report = &reports[0];
        assert_eq!((tasks_report.attempted, tasks_report.synced), (1, 1));
        let weight_report = &reports[3];
        assert_eq!((weight_report.attempted, weight_report.failed), (1, 1));
        assert_eq!(mock.calls_to(&url("/api/tasks/7")), 1);
        assert_eq!(mock.calls_to(&url("/api/robots/2/weight")), 1);
        assert!(ctx.sync.pending(SyncQueue::TaskUpdates).await.unwrap().is_empty());

        // Nothing is preloaded before the delay
        settle().await;
        tokio::time::advance(ctx.config.reconnect_delay() - Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(mock.calls_to(&url("/api/tasks")), 0);

        tokio::time::advance(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(mock.calls_to(&url("/api/tasks")), 1);
        let cached: Option<serde_json::Value> = ctx.typed.get_cached_data("tasks", "all").await;
        assert_eq!(cached, Some(serde_json::json!([])));

        tasks.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_typed_maintenance_runs_every_interval() {
        let mock = MockNetwork::new();
        let (_dir, ctx) = paused_context(&mock);

        let stale = CacheEntry::new(
            CacheType::Tasks,
            "all",
            serde_json::json!([1]),
            Duration::from_secs(60),
            Utc::now() - chrono::Duration::hours(1),
        );
        let partition = Partition::open(Arc::clone(&ctx.store), CacheType::Tasks.partition());
        partition.put("all", &stale).await.unwrap();

        let mut tasks = BackgroundTasks::new();
        ctx.schedule_maintenance(&mut tasks);
        settle().await;

        tokio::time::advance(ctx.config.typed_sweep_interval() - Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(partition.count().await.unwrap(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(partition.count().await.unwrap(), 0);

        tasks.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_sweep_runs_every_interval() {
        let mock = MockNetwork::new();
        let (_dir, ctx) = paused_context(&mock);

        let request = Request::get(ctx.router.resolve("/api/tasks").unwrap());
        ctx.router
            .cache()
            .put_at(
                &request,
                &Response::text(200, "[]"),
                Utc::now() - chrono::Duration::hours(1),
            )
            .unwrap();

        let mut tasks = BackgroundTasks::new();
        ctx.schedule_maintenance(&mut tasks);
        settle().await;

        // The typed sweep fires first and leaves responses alone
        tokio::time::advance(ctx.config.typed_sweep_interval()).await;
        settle().await;
        assert!(ctx.router.cache().match_request(&request).unwrap().is_some());

        tokio::time::advance(
            ctx.config.response_sweep_interval() - ctx.config.typed_sweep_interval(),
        )
        .await;
        settle().await;
        assert!(ctx.router.cache().match_request(&request).unwrap().is_none());

        tasks.shutdown().await;
    }

    #[tokio::test]
    async fn test_update_signal_is_shared_with_typed_cache() {
        let dir = TempDir::new().unwrap();
        let ctx = OfflineContext::new(
            config_in(&dir, StoreBackendChoice::Bounded),
            Arc::new(MockNetwork::new()),
        )
        .unwrap();

        let mut rx = ctx.typed.signal().subscribe();
        ctx.signal.emit(crate::typed_cache::CacheType::Robots);
        assert!(rx.recv().await.is_ok());
    }
}
