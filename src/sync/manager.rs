use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use reqwest::{Method, Url};
use serde::Serialize;

use super::{QueuedRequest, SyncQueue, next_id};
use crate::net::{Network, Request};
use crate::store::{Partition, Store, StoreResult};

/// Outcome of replaying one queue
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplayReport {
    pub queue: String,
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
    /// Set when the queue itself could not be read
    pub error: Option<String>,
}

/// Records offline writes and replays them
#[derive(Clone)]
pub struct SyncManager {
    store: Arc<dyn Store>,
    network: Arc<dyn Network>,
    origin: Url,
}

impl SyncManager {
    pub fn new(store: Arc<dyn Store>, network: Arc<dyn Network>, origin: Url) -> Self {
        Self {
            store,
            network,
            origin,
        }
    }

    fn partition(&self, queue: SyncQueue) -> Partition {
        Partition::open(Arc::clone(&self.store), queue.partition())
    }

    /// Record a write for later replay
    pub async fn enqueue(&self, queue: SyncQueue, request: &Request) -> StoreResult<QueuedRequest> {
        let now = Utc::now();
        let item = QueuedRequest {
            id: next_id(now),
            url: request.url.to_string(),
            method: request.method.to_string(),
            headers: request.headers.clone(),
            body: request.body.clone(),
            attempts: 0,
            last_error: None,
            queued_at: now,
        };
        self.partition(queue).put(&item.id, &item).await?;
        log::info!("Queued {} {} on {} ({})", item.method, item.url, queue, item.id);
        Ok(item)
    }

    /// Items waiting in a queue, in replay order
    pub async fn pending(&self, queue: SyncQueue) -> StoreResult<Vec<QueuedRequest>> {
        Ok(self
            .partition(queue)
            .get_all::<QueuedRequest>()
            .await?
            .into_iter()
            .map(|(_, item)| item)
            .collect())
    }

    /// Drop one item without replaying it. Returns whether it existed.
    pub async fn discard(&self, queue: SyncQueue, id: &str) -> StoreResult<bool> {
        let partition = self.partition(queue);
        let existed = partition.get::<QueuedRequest>(id).await?.is_some();
        if existed {
            partition.delete(id).await?;
            log::info!("Discarded {} from {}", id, queue);
        }
        Ok(existed)
    }

    /// Replay every item of a queue in order.
    ///
    /// Successful items are removed; failed items stay queued with their
    /// attempt count and last error updated. Never fails.
    pub async fn replay(&self, queue: SyncQueue) -> ReplayReport {
        log::info!("Syncing {}", queue);
        let mut report = ReplayReport {
            queue: queue.tag().to_string(),
            ..ReplayReport::default()
        };

        let items = match self.pending(queue).await {
            Ok(items) => items,
            Err(e) => {
                log::error!("Error in {} sync: {}", queue, e);
                report.error = Some(e.to_string());
                return report;
            }
        };

        let partition = self.partition(queue);
        for mut item in items {
            // A concurrent pass or a discard may have taken it already
            if matches!(partition.get::<QueuedRequest>(&item.id).await, Ok(None)) {
                log::debug!("{} already left {}, skipping", item.id, queue);
                continue;
            }
            report.attempted += 1;
            match self.send(&item).await {
                Ok(()) => {
                    if let Err(e) = partition.delete(&item.id).await {
                        log::error!("Synced {} but could not dequeue it: {}", item.id, e);
                    }
                    report.synced += 1;
                    log::info!("Synced {} ({} {})", item.id, item.method, item.url);
                }
                Err(reason) => {
                    log::error!("Failed to sync {}: {}", item.id, reason);
                    item.attempts += 1;
                    item.last_error = Some(reason);
                    if let Err(e) = Self::record_failure(&partition, &item).await {
                        log::warn!("Could not record failure of {}: {}", item.id, e);
                    }
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Write back attempt bookkeeping, unless the item left the queue while
    /// it was in flight
    async fn record_failure(partition: &Partition, item: &QueuedRequest) -> StoreResult<()> {
        if partition.get::<QueuedRequest>(&item.id).await?.is_none() {
            log::debug!("{} left the queue during replay, not requeueing", item.id);
            return Ok(());
        }
        partition.put(&item.id, item).await
    }

    async fn send(&self, item: &QueuedRequest) -> Result<(), String> {
        let method = Method::from_bytes(item.method.as_bytes())
            .map_err(|_| format!("invalid method '{}'", item.method))?;
        let url = self
            .origin
            .join(&item.url)
            .map_err(|e| format!("invalid url '{}': {}", item.url, e))?;

        let mut request = Request::new(method, url);
        request.headers = item
            .headers
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.clone()))
            .collect::<BTreeMap<_, _>>();
        request.body = item.body.clone();

        let response = self.network.fetch(&request).await.map_err(|e| e.to_string())?;
        if response.is_success() {
            Ok(())
        } else {
            Err(format!("HTTP {}", response.status))
        }
    }

    /// Replay every queue, one after another
    pub async fn replay_all(&self) -> Vec<ReplayReport> {
        let mut reports = Vec::with_capacity(SyncQueue::ALL.len());
        for queue in SyncQueue::ALL {
            reports.push(self.replay(queue).await);
        }
        reports
    }

    /// Handle a sync trigger. Unknown tags are logged and ignored.
    pub async fn handle_sync_event(&self, tag: &str) -> Option<ReplayReport> {
        log::debug!("Background sync triggered: {}", tag);
        match SyncQueue::from_tag(tag) {
            Some(queue) => Some(self.replay(queue).await),
            None => {
                log::info!("Unknown sync event: {}", tag);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use crate::net::{MockNetwork, Response};
    use crate::store::BoundedStore;
    use async_trait::async_trait;

    const ORIGIN: &str = "http://localhost:8080";

    fn setup(mock: &MockNetwork) -> SyncManager {
        SyncManager::new(
            Arc::new(BoundedStore::new()),
            Arc::new(mock.clone()),
            Url::parse(ORIGIN).unwrap(),
        )
    }

    fn put(path: &str, body: &str) -> Request {
        Request::new(Method::PUT, Url::parse(&format!("{}{}", ORIGIN, path)).unwrap())
            .with_header("content-type", "application/json")
            .with_body(body)
    }

    #[tokio::test]
    async fn test_enqueue_and_pending_in_order() {
        let sync = setup(&MockNetwork::new());
        for i in 1..=3 {
            sync.enqueue(SyncQueue::TaskUpdates, &put(&format!("/api/tasks/{}", i), "{}"))
                .await
                .unwrap();
        }

        let pending = sync.pending(SyncQueue::TaskUpdates).await.unwrap();
        let urls: Vec<&str> = pending.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "http://localhost:8080/api/tasks/1",
                "http://localhost:8080/api/tasks/2",
                "http://localhost:8080/api/tasks/3"
            ]
        );
        assert_eq!(pending[0].method, "PUT");
        assert_eq!(pending[0].body.as_deref(), Some(&b"{}"[..]));
        assert!(sync.pending(SyncQueue::MilestoneUpdates).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replay_leaves_only_failed_item() {
        let mock = MockNetwork::new()
            .with_response("http://localhost:8080/api/tasks/1", Response::new(200, ""))
            .with_response("http://localhost:8080/api/tasks/2", Response::new(500, ""))
            .with_response("http://localhost:8080/api/tasks/3", Response::new(204, ""));
        let sync = setup(&mock);
        for i in 1..=3 {
            sync.enqueue(SyncQueue::TaskUpdates, &put(&format!("/api/tasks/{}", i), "{}"))
                .await
                .unwrap();
        }

        let report = sync.replay(SyncQueue::TaskUpdates).await;
        assert_eq!(report.attempted, 3);
        assert_eq!(report.synced, 2);
        assert_eq!(report.failed, 1);

        let remaining = sync.pending(SyncQueue::TaskUpdates).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].url, "http://localhost:8080/api/tasks/2");
        assert_eq!(remaining[0].attempts, 1);
        assert_eq!(remaining[0].last_error.as_deref(), Some("HTTP 500"));

        let order: Vec<String> = mock.captured().iter().map(|r| r.url.to_string()).collect();
        assert_eq!(
            order,
            vec![
                "http://localhost:8080/api/tasks/1",
                "http://localhost:8080/api/tasks/2",
                "http://localhost:8080/api/tasks/3"
            ]
        );
    }

    #[tokio::test]
    async fn test_replay_sends_method_headers_and_body() {
        let url = "http://localhost:8080/api/robots/1/weight";
        let mock = MockNetwork::new().with_response(url, Response::new(200, ""));
        let sync = setup(&mock);
        sync.enqueue(SyncQueue::RobotWeightUpdates, &put("/api/robots/1/weight", "{\"kg\":52}"))
            .await
            .unwrap();

        sync.replay(SyncQueue::RobotWeightUpdates).await;

        let sent = &mock.captured()[0];
        assert_eq!(sent.method, Method::PUT);
        assert_eq!(sent.header("content-type"), Some("application/json"));
        assert_eq!(sent.body.as_deref(), Some(&b"{\"kg\":52}"[..]));
    }

    #[tokio::test]
    async fn test_binary_body_replayed_byte_for_byte() {
        let url = "http://localhost:8080/api/robots/1/weight";
        let mock = MockNetwork::new().with_response(url, Response::new(200, ""));
        let sync = setup(&mock);
        let body = vec![0x80, 0xff, 0x00, b'A'];
        let request = Request::new(Method::PUT, Url::parse(url).unwrap())
            .with_header("content-type", "application/octet-stream")
            .with_body(body.clone());

        let queued = sync.enqueue(SyncQueue::RobotWeightUpdates, &request).await.unwrap();
        assert_eq!(queued.body.as_deref(), Some(&body[..]));

        sync.replay(SyncQueue::RobotWeightUpdates).await;
        assert_eq!(mock.captured()[0].body.as_deref(), Some(&body[..]));
    }

    /// Empties the task queue on every request, as a concurrent pass would,
    /// then fails the request
    struct DrainingNetwork {
        store: Arc<dyn Store>,
        sent: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Network for DrainingNetwork {
        async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
            self.sent.lock().unwrap().push(request.url.to_string());
            let partition = Partition::open(Arc::clone(&self.store), SyncQueue::TaskUpdates.partition());
            for (id, _) in partition.get_all::<QueuedRequest>().await.unwrap() {
                partition.delete(&id).await.unwrap();
            }
            Ok(Response::new(500, ""))
        }
    }

    #[tokio::test]
    async fn test_items_removed_mid_replay_are_neither_requeued_nor_sent() {
        let store: Arc<dyn Store> = Arc::new(BoundedStore::new());
        let network = Arc::new(DrainingNetwork {
            store: Arc::clone(&store),
            sent: std::sync::Mutex::new(Vec::new()),
        });
        let sync = SyncManager::new(store, network.clone(), Url::parse(ORIGIN).unwrap());
        for i in 1..=2 {
            sync.enqueue(SyncQueue::TaskUpdates, &put(&format!("/api/tasks/{}", i), "{}"))
                .await
                .unwrap();
        }

        let report = sync.replay(SyncQueue::TaskUpdates).await;
        assert_eq!(report.attempted, 1);
        assert_eq!(report.failed, 1);
        assert!(sync.pending(SyncQueue::TaskUpdates).await.unwrap().is_empty());
        assert_eq!(
            *network.sent.lock().unwrap(),
            vec!["http://localhost:8080/api/tasks/1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_network_failure_keeps_everything_queued() {
        let mock = MockNetwork::new();
        mock.set_offline(true);
        let sync = setup(&mock);
        sync.enqueue(SyncQueue::AttendanceUpdates, &put("/api/attendance/1", "{}"))
            .await
            .unwrap();

        let report = sync.replay(SyncQueue::AttendanceUpdates).await;
        assert_eq!(report.failed, 1);
        assert!(report.error.is_none());

        let second = sync.replay(SyncQueue::AttendanceUpdates).await;
        assert_eq!(second.failed, 1);
        let remaining = sync.pending(SyncQueue::AttendanceUpdates).await.unwrap();
        assert_eq!(remaining[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_relative_urls_resolve_against_origin() {
        let mock = MockNetwork::new()
            .with_response("http://localhost:8080/api/milestones/5", Response::new(200, ""));
        let sync = setup(&mock);
        let item = QueuedRequest {
            id: "0001".to_string(),
            url: "/api/milestones/5".to_string(),
            method: "PATCH".to_string(),
            headers: BTreeMap::new(),
            body: None,
            attempts: 0,
            last_error: None,
            queued_at: Utc::now(),
        };
        sync.partition(SyncQueue::MilestoneUpdates)
            .put(&item.id, &item)
            .await
            .unwrap();

        let report = sync.replay(SyncQueue::MilestoneUpdates).await;
        assert_eq!(report.synced, 1);
    }

    #[tokio::test]
    async fn test_discard() {
        let sync = setup(&MockNetwork::new());
        let item = sync
            .enqueue(SyncQueue::TaskUpdates, &put("/api/tasks/1", "{}"))
            .await
            .unwrap();

        assert!(sync.discard(SyncQueue::TaskUpdates, &item.id).await.unwrap());
        assert!(!sync.discard(SyncQueue::TaskUpdates, &item.id).await.unwrap());
        assert!(sync.pending(SyncQueue::TaskUpdates).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_sync_event_is_ignored() {
        let mock = MockNetwork::new();
        let sync = setup(&mock);
        assert!(sync.handle_sync_event("budget-updates").await.is_none());
        assert!(mock.captured().is_empty());

        let report = sync.handle_sync_event("task-updates").await.unwrap();
        assert_eq!(report.attempted, 0);
    }

    #[tokio::test]
    async fn test_replay_all_covers_each_queue() {
        let sync = setup(&MockNetwork::new());
        let reports = sync.replay_all().await;
        let queues: Vec<&str> = reports.iter().map(|r| r.queue.as_str()).collect();
        assert_eq!(
            queues,
            vec![
                "task-updates",
                "milestone-updates",
                "attendance-updates",
                "robot-weight-updates"
            ]
        );
    }
}
