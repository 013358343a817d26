//! Partitioned key-value persistence
//!
//! Two backends implement [`Store`]: a durable SQLite database and a bounded
//! in-process map used when the durable database cannot be opened. One
//! backend is chosen per process by [`open_store`]; partitions are never
//! split across backends.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::config::{Config, StoreBackendChoice};
use crate::error::StoreError;

pub mod bounded;
pub mod sqlite;

pub use bounded::BoundedStore;
pub use sqlite::SqliteStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Which backend a store is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Durable,
    Bounded,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Durable => write!(f, "durable (sqlite)"),
            StoreBackend::Bounded => write!(f, "bounded (in-process)"),
        }
    }
}

/// One stored record
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: String,
    pub value: Value,
}

/// Partitioned key-value store.
///
/// Every operation is atomic per key; nothing is atomic across keys.
/// `get_all` enumerates in key order.
#[async_trait]
pub trait Store: Send + Sync {
    /// Which backend this is
    fn backend(&self) -> StoreBackend;

    /// All records of a partition
    async fn get_all(&self, partition: &str) -> StoreResult<Vec<StoredRecord>>;

    /// One record
    async fn get(&self, partition: &str, key: &str) -> StoreResult<Option<Value>>;

    /// Insert or replace a record
    async fn put(&self, partition: &str, key: &str, value: &Value) -> StoreResult<()>;

    /// Delete a record; deleting a missing key is not an error
    async fn delete(&self, partition: &str, key: &str) -> StoreResult<()>;
}

/// Handle to one named partition of a store
#[derive(Clone)]
pub struct Partition {
    store: Arc<dyn Store>,
    name: String,
}

impl Partition {
    /// Open a partition handle
    pub fn open(store: Arc<dyn Store>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All records, deserialized. Records that do not parse are skipped.
    pub async fn get_all<T: DeserializeOwned>(&self) -> StoreResult<Vec<(String, T)>> {
        let records = self.store.get_all(&self.name).await?;
        Ok(records
            .into_iter()
            .filter_map(|record| match serde_json::from_value(record.value) {
                Ok(value) => Some((record.key, value)),
                Err(e) => {
                    log::warn!(
                        "Skipping unreadable record {}/{}: {}",
                        self.name,
                        record.key,
                        e
                    );
                    None
                }
            })
            .collect())
    }

    /// One record, deserialized
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.store.get(&self.name, key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Serialize and store a record
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        let value = serde_json::to_value(value)?;
        self.store.put(&self.name, key, &value).await
    }

    /// Delete a record
    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        self.store.delete(&self.name, key).await
    }

    /// Number of records
    pub async fn count(&self) -> StoreResult<usize> {
        Ok(self.store.get_all(&self.name).await?.len())
    }
}

/// Open the store selected by configuration.
///
/// With `auto`, the durable backend is probed first and the bounded backend
/// is used only if it cannot be opened.
pub fn open_store(config: &Config) -> StoreResult<Arc<dyn Store>> {
    let data_dir = config.data_dir();

    match config.store.backend {
        StoreBackendChoice::Durable => {
            let dir = data_dir.ok_or(StoreError::NoDataDir)?;
            Ok(Arc::new(SqliteStore::open_at(&dir)?))
        }
        StoreBackendChoice::Bounded => Ok(Arc::new(BoundedStore::new())),
        StoreBackendChoice::Auto => Ok(probe(data_dir.as_deref())),
    }
}

fn probe(data_dir: Option<&Path>) -> Arc<dyn Store> {
    match data_dir.map(SqliteStore::open_at) {
        Some(Ok(store)) => Arc::new(store),
        Some(Err(e)) => {
            log::warn!("Durable store unavailable ({}), using bounded store", e);
            Arc::new(BoundedStore::new())
        }
        None => {
            log::warn!("No data directory, using bounded store");
            Arc::new(BoundedStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Widget {
        name: String,
        weight: f64,
    }

    #[tokio::test]
    async fn test_partition_typed_roundtrip() {
        let store: Arc<dyn Store> = Arc::new(BoundedStore::new());
        let partition = Partition::open(store, "widgets");
        let widget = Widget {
            name: "intake".to_string(),
            weight: 4.5,
        };

        partition.put("w1", &widget).await.unwrap();
        let loaded: Option<Widget> = partition.get("w1").await.unwrap();
        assert_eq!(loaded, Some(widget));
        assert_eq!(partition.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_partition_get_all_skips_unreadable() {
        let store: Arc<dyn Store> = Arc::new(BoundedStore::new());
        store
            .put("widgets", "bad", &serde_json::json!("not a widget"))
            .await
            .unwrap();
        let partition = Partition::open(store, "widgets");
        partition
            .put(
                "good",
                &Widget {
                    name: "arm".to_string(),
                    weight: 2.0,
                },
            )
            .await
            .unwrap();

        let all: Vec<(String, Widget)> = partition.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0, "good");
    }

    #[test]
    fn test_open_store_auto_prefers_durable() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.store.data_dir = Some(dir.path().to_path_buf());

        let store = open_store(&config).unwrap();
        assert_eq!(store.backend(), StoreBackend::Durable);
    }

    #[test]
    fn test_open_store_auto_falls_back_to_bounded() {
        let dir = TempDir::new().unwrap();
        // A regular file where the data directory should be
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let mut config = Config::default();
        config.store.data_dir = Some(blocker);

        let store = open_store(&config).unwrap();
        assert_eq!(store.backend(), StoreBackend::Bounded);
    }

    #[test]
    fn test_open_store_bounded_choice() {
        let mut config = Config::default();
        config.store.backend = StoreBackendChoice::Bounded;
        let store = open_store(&config).unwrap();
        assert_eq!(store.backend(), StoreBackend::Bounded);
    }
}
