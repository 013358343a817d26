//! SQLite-backed durable store
//!
//! All partitions live in one table keyed by `(partition, record_key)`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use super::{Store, StoreBackend, StoreResult, StoredRecord};
use crate::error::StoreError;

/// Schema version - increment to trigger nuke-and-rebuild
const SCHEMA_VERSION: i32 = 1;

const DB_FILE: &str = "store.db";

/// Durable store over a single SQLite file
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open or create the store inside `data_dir`
    pub fn open_at(data_dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| StoreError::Io(format!("Failed to create data dir: {}", e)))?;

        let db_path = data_dir.join(DB_FILE);
        let conn = Connection::open(&db_path)?;

        let version: i32 = conn
            .pragma_query_value(None, "user_version", |r| r.get(0))
            .unwrap_or(0);

        if version != 0 && version != SCHEMA_VERSION {
            log::info!(
                "Store schema version mismatch ({} != {}), rebuilding",
                version,
                SCHEMA_VERSION
            );
            drop(conn);
            std::fs::remove_file(&db_path)
                .map_err(|e| StoreError::Io(format!("Failed to remove store DB: {}", e)))?;
            return Self::open_at(data_dir);
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                partition TEXT NOT NULL,
                record_key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (partition, record_key)
            );
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: db_path,
        })
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&guard)
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Durable
    }

    async fn get_all(&self, partition: &str) -> StoreResult<Vec<StoredRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT record_key, value FROM records
                 WHERE partition = ?1 ORDER BY record_key",
            )?;
            let rows = stmt.query_map([partition], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut records = Vec::new();
            for row in rows {
                let (key, raw) = row?;
                let value = serde_json::from_str(&raw)?;
                records.push(StoredRecord { key, value });
            }
            Ok(records)
        })
    }

    async fn get(&self, partition: &str, key: &str) -> StoreResult<Option<Value>> {
        self.with_conn(|conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT value FROM records WHERE partition = ?1 AND record_key = ?2",
                    params![partition, key],
                    |row| row.get(0),
                )
                .optional()?;

            match raw {
                Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
                None => Ok(None),
            }
        })
    }

    async fn put(&self, partition: &str, key: &str, value: &Value) -> StoreResult<()> {
        let raw = serde_json::to_string(value)?;
        let now = Utc::now().timestamp_millis();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO records (partition, record_key, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![partition, key, raw, now],
            )?;
            Ok(())
        })
    }

    async fn delete(&self, partition: &str, key: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM records WHERE partition = ?1 AND record_key = ?2",
                params![partition, key],
            )?;
            Ok(())
        })
    }
}
