//! Bounded in-process store
//!
//! Fallback used when the durable database is unavailable. Individual
//! records are capped at 1 MiB and the whole store at 5 MiB; writes that
//! would exceed either limit are refused and leave the store unchanged.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{Store, StoreBackend, StoreResult, StoredRecord};
use crate::error::StoreError;

/// Largest serialized record accepted
pub const RECORD_LIMIT: usize = 1024 * 1024;

/// Total serialized bytes accepted across all partitions
pub const STORE_QUOTA: usize = 5 * 1024 * 1024;

/// Size-limited synchronous key-value store
pub struct BoundedStore {
    partitions: Mutex<HashMap<String, BTreeMap<String, String>>>,
    record_limit: usize,
    quota: usize,
}

impl Default for BoundedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundedStore {
    pub fn new() -> Self {
        Self::with_limits(RECORD_LIMIT, STORE_QUOTA)
    }

    /// Create a store with custom limits
    pub fn with_limits(record_limit: usize, quota: usize) -> Self {
        Self {
            partitions: Mutex::new(HashMap::new()),
            record_limit,
            quota,
        }
    }

    /// Serialized bytes currently held
    pub fn used_bytes(&self) -> usize {
        self.partitions
            .lock()
            .map(|p| used(&p))
            .unwrap_or_default()
    }
}

fn used(partitions: &HashMap<String, BTreeMap<String, String>>) -> usize {
    partitions
        .values()
        .flat_map(|records| records.iter())
        .map(|(k, v)| k.len() + v.len())
        .sum()
}

#[async_trait]
impl Store for BoundedStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Bounded
    }

    async fn get_all(&self, partition: &str) -> StoreResult<Vec<StoredRecord>> {
        let partitions = self.partitions.lock().map_err(|_| StoreError::Poisoned)?;
        let Some(records) = partitions.get(partition) else {
            return Ok(Vec::new());
        };

        records
            .iter()
            .map(|(key, raw)| {
                Ok(StoredRecord {
                    key: key.clone(),
                    value: serde_json::from_str(raw)?,
                })
            })
            .collect()
    }

    async fn get(&self, partition: &str, key: &str) -> StoreResult<Option<Value>> {
        let partitions = self.partitions.lock().map_err(|_| StoreError::Poisoned)?;
        match partitions.get(partition).and_then(|r| r.get(key)) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, partition: &str, key: &str, value: &Value) -> StoreResult<()> {
        let raw = serde_json::to_string(value)?;
        if raw.len() > self.record_limit {
            return Err(StoreError::RecordTooLarge {
                partition: partition.to_string(),
                key: key.to_string(),
                size: raw.len(),
                limit: self.record_limit,
            });
        }

        let mut partitions = self.partitions.lock().map_err(|_| StoreError::Poisoned)?;
        let replaced = partitions
            .get(partition)
            .and_then(|r| r.get(key))
            .map(|old| key.len() + old.len())
            .unwrap_or(0);
        let projected = used(&partitions) - replaced + key.len() + raw.len();
        if projected > self.quota {
            return Err(StoreError::QuotaExceeded {
                used: projected,
                quota: self.quota,
            });
        }

        partitions
            .entry(partition.to_string())
            .or_default()
            .insert(key.to_string(), raw);
        Ok(())
    }

    async fn delete(&self, partition: &str, key: &str) -> StoreResult<()> {
        let mut partitions = self.partitions.lock().map_err(|_| StoreError::Poisoned)?;
        if let Some(records) = partitions.get_mut(partition) {
            records.remove(key);
        }
        Ok(())
    }
}
