//! Typed cache manager
//!
//! Applies each data type's policy (expiry, capacity eviction, preloading)
//! on top of the partitioned store. Store failures never escape a read or a
//! write: they are logged and reported as a miss or as `false`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use super::entry::CacheEntry;
use super::policy::{CacheType, Workflow};
use super::signal::UpdateSignal;
use super::stats::{CacheStatistics, SizeInfo, StatsSnapshot};
use crate::error::{Error, NetworkError, Result};
use crate::net::{Network, Request};
use crate::router::Strategy;
use crate::store::{Partition, Store, StoreResult};

/// A full type loses one fifth of its capacity, rounded up
const EVICTION_DIVISOR: usize = 5;

/// Partition holding one [`CacheStatistics`] record per type
const STATS_PARTITION: &str = "cacheStats";

/// Per-call overrides for [`TypedCache::cache_data`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheOptions {
    pub max_age: Option<Duration>,
}

/// Outcome of [`TypedCache::preload_critical_data`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum PreloadOutcome {
    AlreadyRunning,
    Completed { cached: usize },
}

/// Callback run after an update signal invalidated a type
pub type UpdateCallback = Box<dyn Fn() + Send + Sync>;

/// Policy engine over the typed partitions of a store
#[derive(Clone)]
pub struct TypedCache {
    store: Arc<dyn Store>,
    network: Arc<dyn Network>,
    origin: Url,
    signal: UpdateSignal,
    /// Serializes read-modify-write of the statistics records
    stats_lock: Arc<Mutex<()>>,
    preloading: Arc<AtomicBool>,
}

/// Clears the preload flag when a preload ends, however it ends
struct PreloadGuard(Arc<AtomicBool>);

impl Drop for PreloadGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl TypedCache {
    pub fn new(
        store: Arc<dyn Store>,
        network: Arc<dyn Network>,
        origin: Url,
        signal: UpdateSignal,
    ) -> Self {
        Self {
            store,
            network,
            origin,
            signal,
            stats_lock: Arc::new(Mutex::new(())),
            preloading: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn signal(&self) -> &UpdateSignal {
        &self.signal
    }

    fn partition(&self, cache_type: CacheType) -> Partition {
        Partition::open(Arc::clone(&self.store), cache_type.partition())
    }

    fn resolve_type(name: &str) -> Option<CacheType> {
        match name.parse::<CacheType>() {
            Ok(t) => Some(t),
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        }
    }

    fn stats_partition(&self) -> Partition {
        Partition::open(Arc::clone(&self.store), STATS_PARTITION)
    }

    /// Update a type's statistics record. Failures are logged, never raised.
    async fn with_stats(&self, cache_type: CacheType, f: impl FnOnce(&mut CacheStatistics)) {
        let _guard = self.stats_lock.lock().await;
        let partition = self.stats_partition();
        let mut stats = match partition.get::<CacheStatistics>(cache_type.as_str()).await {
            Ok(stats) => stats.unwrap_or_default(),
            Err(e) => {
                log::warn!("Cannot read {} statistics: {}", cache_type, e);
                return;
            }
        };
        f(&mut stats);
        if let Err(e) = partition.put(cache_type.as_str(), &stats).await {
            log::warn!("Cannot record {} statistics: {}", cache_type, e);
        }
    }

    async fn load_stats(&self, cache_type: CacheType) -> CacheStatistics {
        match self.stats_partition().get(cache_type.as_str()).await {
            Ok(stats) => stats.unwrap_or_default(),
            Err(e) => {
                log::warn!("Cannot read {} statistics: {}", cache_type, e);
                CacheStatistics::default()
            }
        }
    }

    /// Store a value under a type's policy. Returns `false` for an unknown
    /// type or a store failure.
    pub async fn cache_data<T: Serialize>(
        &self,
        cache_type: &str,
        key: &str,
        value: &T,
        options: CacheOptions,
    ) -> bool {
        let Some(cache_type) = Self::resolve_type(cache_type) else {
            return false;
        };
        let data = match serde_json::to_value(value) {
            Ok(data) => data,
            Err(e) => {
                log::error!("Cannot serialize {}/{}: {}", cache_type, key, e);
                return false;
            }
        };

        match self.store_entry(cache_type, key, data, options, Utc::now()).await {
            Ok(()) => {
                log::debug!("Cached {}/{}", cache_type, key);
                true
            }
            Err(e) => {
                log::error!("Error caching {}/{}: {}", cache_type, key, e);
                false
            }
        }
    }

    async fn store_entry(
        &self,
        cache_type: CacheType,
        key: &str,
        data: Value,
        options: CacheOptions,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let descriptor = cache_type.descriptor();
        let max_age = options.max_age.unwrap_or(descriptor.max_age);
        let entry = CacheEntry::new(cache_type, key, data, max_age, now);

        self.enforce_max_size(cache_type, now).await?;
        self.partition(cache_type).put(key, &entry).await?;
        self.with_stats(cache_type, |s| s.record_store()).await;
        Ok(())
    }

    /// Evict the lowest-scoring fifth of a full type.
    ///
    /// Returns how many entries were removed.
    pub(crate) async fn enforce_max_size(
        &self,
        cache_type: CacheType,
        now: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let max_size = cache_type.descriptor().max_size;
        let partition = self.partition(cache_type);
        let mut entries: Vec<(String, CacheEntry)> = partition.get_all().await?;
        if entries.len() < max_size {
            return Ok(0);
        }

        let to_remove = max_size.div_ceil(EVICTION_DIVISOR).max(1);
        entries.sort_by(|(_, a), (_, b)| a.score(now).total_cmp(&b.score(now)));

        let mut removed = 0;
        for (key, _) in entries.into_iter().take(to_remove) {
            partition.delete(&key).await?;
            removed += 1;
        }
        self.with_stats(cache_type, |s| s.shrink(removed as u64)).await;
        log::info!("Removed {} entries from {} cache", removed, cache_type);
        Ok(removed)
    }

    /// Read a value. Absent, expired, unreadable and unknown-type lookups
    /// all return `None`.
    pub async fn get_cached_data<T: DeserializeOwned>(&self, cache_type: &str, key: &str) -> Option<T> {
        let cache_type = Self::resolve_type(cache_type)?;
        let data = self.read_entry(cache_type, key, Utc::now()).await?;
        match serde_json::from_value(data) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("Cached {}/{} has an unexpected shape: {}", cache_type, key, e);
                None
            }
        }
    }

    async fn read_entry(&self, cache_type: CacheType, key: &str, now: DateTime<Utc>) -> Option<Value> {
        match self.lookup(cache_type, key, now).await {
            Ok(Some(data)) => {
                self.with_stats(cache_type, |s| s.record_hit()).await;
                log::debug!("Cache hit for {}/{}", cache_type, key);
                Some(data)
            }
            Ok(None) => {
                self.with_stats(cache_type, |s| s.record_miss()).await;
                None
            }
            Err(e) => {
                log::error!("Error retrieving {}/{}: {}", cache_type, key, e);
                self.with_stats(cache_type, |s| s.record_miss()).await;
                None
            }
        }
    }

    async fn lookup(&self, cache_type: CacheType, key: &str, now: DateTime<Utc>) -> StoreResult<Option<Value>> {
        let partition = self.partition(cache_type);
        let Some(mut entry) = partition.get::<CacheEntry>(key).await? else {
            return Ok(None);
        };

        if entry.is_expired(now) {
            partition.delete(key).await?;
            self.with_stats(cache_type, |s| s.shrink(1)).await;
            log::debug!("Expired {}/{}", cache_type, key);
            return Ok(None);
        }

        entry.touch(now);
        partition.put(key, &entry).await?;
        Ok(Some(entry.data))
    }

    /// Drop one entry, or every entry of a type when `key` is `None`.
    ///
    /// Returns how many entries were removed.
    pub async fn invalidate_cache(&self, cache_type: &str, key: Option<&str>) -> Result<usize> {
        let cache_type: CacheType = cache_type.parse()?;
        self.invalidate(cache_type, key).await
    }

    async fn invalidate(&self, cache_type: CacheType, key: Option<&str>) -> Result<usize> {
        let partition = self.partition(cache_type);
        match key {
            Some(key) => {
                let existed = partition.get::<Value>(key).await?.is_some();
                partition.delete(key).await?;
                self.with_stats(cache_type, |s| s.shrink(1)).await;
                log::info!("Invalidated {}/{}", cache_type, key);
                Ok(usize::from(existed))
            }
            None => {
                let entries: Vec<(String, Value)> = partition.get_all().await?;
                for (key, _) in &entries {
                    partition.delete(key).await?;
                }
                self.with_stats(cache_type, |s| s.size = 0).await;
                log::info!("Invalidated all {} cache", cache_type);
                Ok(entries.len())
            }
        }
    }

    /// Purge expired entries of every type
    pub async fn perform_maintenance(&self) -> usize {
        self.perform_maintenance_at(Utc::now()).await
    }

    pub(crate) async fn perform_maintenance_at(&self, now: DateTime<Utc>) -> usize {
        log::debug!("Performing typed cache maintenance");
        let mut total = 0;
        for cache_type in CacheType::ALL {
            match self.purge_expired(cache_type, now).await {
                Ok(0) => {}
                Ok(removed) => {
                    log::info!("Removed {} expired entries from {}", removed, cache_type);
                    self.with_stats(cache_type, |s| s.shrink(removed as u64)).await;
                    total += removed;
                }
                Err(e) => log::warn!("Maintenance of {} failed: {}", cache_type, e),
            }
        }
        total
    }

    async fn purge_expired(&self, cache_type: CacheType, now: DateTime<Utc>) -> StoreResult<usize> {
        let partition = self.partition(cache_type);
        let entries: Vec<(String, CacheEntry)> = partition.get_all().await?;
        let mut removed = 0;
        for (key, entry) in entries {
            if entry.is_expired(now) {
                partition.delete(&key).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Statistics of every type
    pub async fn get_cache_stats(&self) -> Vec<StatsSnapshot> {
        let mut snapshots = Vec::with_capacity(CacheType::ALL.len());
        for cache_type in CacheType::ALL {
            snapshots.push(self.load_stats(cache_type).await.snapshot(cache_type));
        }
        snapshots
    }

    /// Invalidate every type and reset statistics
    pub async fn clear_all_caches(&self) -> Result<usize> {
        log::info!("Clearing all typed caches");
        let mut removed = 0;
        for cache_type in CacheType::ALL {
            removed += self.invalidate(cache_type, None).await?;
        }
        let _guard = self.stats_lock.lock().await;
        let stats = self.stats_partition();
        for cache_type in CacheType::ALL {
            stats.delete(cache_type.as_str()).await?;
        }
        Ok(removed)
    }

    /// Entry counts and byte sizes per type
    pub async fn get_cache_size_info(&self) -> Result<Vec<SizeInfo>> {
        let mut info = Vec::with_capacity(CacheType::ALL.len());
        for cache_type in CacheType::ALL {
            let entries: Vec<(String, CacheEntry)> = self.partition(cache_type).get_all().await?;
            let total_size: usize = entries.iter().map(|(_, e)| e.size).sum();
            let average_size = if entries.is_empty() {
                0.0
            } else {
                total_size as f64 / entries.len() as f64
            };
            info.push(SizeInfo {
                cache_type,
                entries: entries.len(),
                total_size,
                average_size,
            });
        }
        Ok(info)
    }

    /// Preload every type marked for preloading.
    ///
    /// Only one preload runs at a time; a call made while one is running
    /// returns [`PreloadOutcome::AlreadyRunning`] without doing anything.
    pub async fn preload_critical_data(&self) -> PreloadOutcome {
        if self
            .preloading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::info!("Preload already in progress");
            return PreloadOutcome::AlreadyRunning;
        }
        let _guard = PreloadGuard(Arc::clone(&self.preloading));

        log::info!("Starting critical data preload");
        let mut cached = 0;
        for cache_type in CacheType::ALL {
            if cache_type.descriptor().preload {
                cached += self.preload_data_type(cache_type).await;
            }
        }
        log::info!("Critical data preload completed ({} entries)", cached);
        PreloadOutcome::Completed { cached }
    }

    /// Fetch a type's preload endpoints into their keys.
    ///
    /// Returns how many endpoints were cached; failures are logged.
    pub async fn preload_data_type(&self, cache_type: CacheType) -> usize {
        let mut cached = 0;
        for endpoint in cache_type.preload_endpoints() {
            match self.fetch_json(endpoint.url).await {
                Ok(data) => {
                    match self
                        .store_entry(cache_type, endpoint.key, data, CacheOptions::default(), Utc::now())
                        .await
                    {
                        Ok(()) => cached += 1,
                        Err(e) => log::error!("Error caching {}/{}: {}", cache_type, endpoint.key, e),
                    }
                }
                Err(e) => log::error!("Error preloading {} from {}: {}", cache_type, endpoint.url, e),
            }
        }
        cached
    }

    /// Preload the types of a named workflow. Unknown workflows do nothing.
    pub async fn warm_up_cache(&self, workflow: &str) -> usize {
        let Some(workflow) = Workflow::from_name(workflow) else {
            log::debug!("No such workflow: {}", workflow);
            return 0;
        };
        log::info!("Warming up cache for {}", workflow.as_str());

        let mut cached = 0;
        for cache_type in workflow.types() {
            cached += self.preload_data_type(cache_type).await;
        }
        cached
    }

    /// Invalidate a type whenever its update signal fires, then run the
    /// callback. The listener runs until the signal is dropped.
    pub fn on_data_update(&self, cache_type: CacheType, callback: Option<UpdateCallback>) -> JoinHandle<()> {
        let mut rx = self.signal.subscribe();
        let cache = self.clone();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.cache_type == cache_type => {
                        if let Err(e) = cache.invalidate(cache_type, None).await {
                            log::warn!("Invalidation on {} failed: {}", event.event_name(), e);
                        }
                        if let Some(callback) = &callback {
                            callback();
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("Update listener for {} skipped {} events", cache_type, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Load a value through the type's strategy descriptor.
    ///
    /// The fetched JSON body is cached under `key`. Fails only when neither
    /// the network nor the cache can produce a value.
    pub async fn get_or_fetch(&self, cache_type: CacheType, key: &str, url: &str) -> Result<Value> {
        let strategy = cache_type.descriptor().strategy;
        let now = Utc::now();

        match strategy {
            Strategy::CacheFirst | Strategy::CacheOnly => {
                if let Some(data) = self.read_entry(cache_type, key, now).await {
                    return Ok(data);
                }
                if strategy == Strategy::CacheOnly {
                    return Err(Error::Other(format!("{}/{} is not cached", cache_type, key)));
                }
                self.fetch_and_store(cache_type, key, url).await
            }
            Strategy::NetworkFirst | Strategy::NetworkOnly => {
                match self.fetch_and_store(cache_type, key, url).await {
                    Ok(data) => Ok(data),
                    Err(e) if strategy == Strategy::NetworkOnly => Err(e),
                    Err(e) => {
                        log::debug!("Network failed for {}/{}, trying cache: {}", cache_type, key, e);
                        self.read_entry(cache_type, key, now).await.ok_or(e)
                    }
                }
            }
            Strategy::StaleWhileRevalidate => {
                if let Some(data) = self.read_entry(cache_type, key, now).await {
                    let cache = self.clone();
                    let key = key.to_string();
                    let url = url.to_string();
                    tokio::spawn(async move {
                        if let Err(e) = cache.fetch_and_store(cache_type, &key, &url).await {
                            log::debug!("Background update of {}/{} failed: {}", cache_type, key, e);
                        }
                    });
                    return Ok(data);
                }
                self.fetch_and_store(cache_type, key, url).await
            }
        }
    }

    async fn fetch_and_store(&self, cache_type: CacheType, key: &str, url: &str) -> Result<Value> {
        let data = self.fetch_json(url).await?;
        if let Err(e) = self
            .store_entry(cache_type, key, data.clone(), CacheOptions::default(), Utc::now())
            .await
        {
            log::error!("Error caching {}/{}: {}", cache_type, key, e);
        }
        Ok(data)
    }

    async fn fetch_json(&self, target: &str) -> Result<Value> {
        let url = self
            .origin
            .join(target)
            .map_err(|e| NetworkError::InvalidRequest(format!("{}: {}", target, e)))?;
        let request = Request::get(url).with_header("accept", "application/json");
        let response = self.network.fetch(&request).await?;
        if !response.is_success() {
            return Err(Error::Other(format!(
                "{} returned HTTP {}",
                request.url, response.status
            )));
        }
        Ok(response.json_body()?)
    }
}
