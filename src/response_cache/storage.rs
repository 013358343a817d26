//! SQLite-based response cache storage

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use super::request_key;
use crate::error::StoreError;
use crate::net::{Request, Response};
use crate::store::StoreResult;

/// Schema version - increment to trigger nuke-and-rebuild
const SCHEMA_VERSION: i32 = 1;

const DB_FILE: &str = "responses.db";

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS generations (
        name TEXT PRIMARY KEY NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS responses (
        generation TEXT NOT NULL,
        request_key TEXT NOT NULL,
        method TEXT NOT NULL,
        url TEXT NOT NULL,
        status INTEGER NOT NULL,
        headers TEXT NOT NULL,
        body BLOB NOT NULL,
        stored_at INTEGER NOT NULL,
        size_bytes INTEGER NOT NULL,
        PRIMARY KEY (generation, request_key)
    );

    CREATE INDEX IF NOT EXISTS idx_responses_stored_at ON responses(stored_at);
"#;

/// All response-cache generations, backed by one SQLite database.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct ResponseStore {
    conn: Arc<Mutex<Connection>>,
}

impl ResponseStore {
    /// Open or create the response store inside `data_dir`
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
                "Response cache schema version mismatch ({} != {}), rebuilding",
                version,
                SCHEMA_VERSION
            );
            drop(conn);
            std::fs::remove_file(&db_path)
                .map_err(|e| StoreError::Io(format!("Failed to remove response DB: {}", e)))?;
            return Self::open_at(data_dir);
        }

        Self::init(conn)
    }

    /// Open a non-persistent response store
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&guard)
    }

    /// Open (creating if needed) a named generation
    pub fn open(&self, name: &str) -> StoreResult<ResponseCache> {
        let now = Utc::now().timestamp_millis();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO generations (name, created_at) VALUES (?1, ?2)",
                params![name, now],
            )?;
            Ok(())
        })?;

        Ok(ResponseCache {
            store: self.clone(),
            name: name.to_string(),
        })
    }

    /// Whether a generation exists
    pub fn has(&self, name: &str) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let found: Option<String> = conn
                .query_row(
                    "SELECT name FROM generations WHERE name = ?1",
                    [name],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Names of all generations, oldest first
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT name FROM generations ORDER BY created_at, name")?;
            let names = stmt
                .query_map([], |r| r.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names)
        })
    }

    /// Delete a generation and everything in it
    pub fn delete(&self, name: &str) -> StoreResult<bool> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM responses WHERE generation = ?1", [name])?;
            let deleted = conn.execute("DELETE FROM generations WHERE name = ?1", [name])?;
            Ok(deleted > 0)
        })
    }

    /// Per-generation statistics
    pub fn stats(&self) -> StoreResult<Vec<GenerationStats>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT g.name,
                        COUNT(r.request_key),
                        COALESCE(SUM(r.size_bytes), 0),
                        MIN(r.stored_at),
                        MAX(r.stored_at)
                 FROM generations g
                 LEFT JOIN responses r ON r.generation = g.name
                 GROUP BY g.name
                 ORDER BY g.created_at, g.name",
            )?;
            let stats = stmt
                .query_map([], |r| {
                    Ok(GenerationStats {
                        name: r.get(0)?,
                        entries: r.get::<_, i64>(1)? as usize,
                        total_size_bytes: r.get::<_, i64>(2)? as usize,
                        oldest_entry: r.get::<_, Option<i64>>(3)?.and_then(millis_to_datetime),
                        newest_entry: r.get::<_, Option<i64>>(4)?.and_then(millis_to_datetime),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(stats)
        })
    }
}

fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

/// Handle to one named generation
#[derive(Clone)]
pub struct ResponseCache {
    store: ResponseStore,
    name: String,
}

/// Metadata of one cached response
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub key: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub stored_at: DateTime<Utc>,
    pub size_bytes: usize,
}

/// Statistics about one generation
#[derive(Debug, Clone, Serialize)]
pub struct GenerationStats {
    pub name: String,
    pub entries: usize,
    pub total_size_bytes: usize,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

impl ResponseCache {
    /// Generation name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cached response for a request, if any
    pub fn match_request(&self, request: &Request) -> StoreResult<Option<Response>> {
        self.match_key(&request_key(&request.method, &request.url))
    }

    /// Cached GET response for a URL, if any
    pub fn match_url(&self, url: &reqwest::Url) -> StoreResult<Option<Response>> {
        self.match_key(&request_key(&reqwest::Method::GET, url))
    }

    fn match_key(&self, key: &str) -> StoreResult<Option<Response>> {
        self.store.with_conn(|conn| {
            let row: Option<(u16, String, Vec<u8>)> = conn
                .query_row(
                    "SELECT status, headers, body FROM responses
                     WHERE generation = ?1 AND request_key = ?2",
                    params![self.name, key],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                )
                .optional()?;

            match row {
                Some((status, headers, body)) => {
                    let headers: BTreeMap<String, String> = serde_json::from_str(&headers)?;
                    Ok(Some(Response {
                        status,
                        headers,
                        body,
                    }))
                }
                None => Ok(None),
            }
        })
    }

    /// Store a response for a request, captured now
    pub fn put(&self, request: &Request, response: &Response) -> StoreResult<()> {
        self.put_at(request, response, Utc::now())
    }

    /// Store a response with an explicit capture instant
    pub fn put_at(
        &self,
        request: &Request,
        response: &Response,
        stored_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let key = request_key(&request.method, &request.url);
        let headers = serde_json::to_string(&response.headers)?;
        self.store.with_conn(|conn| {
            insert(conn, &self.name, &key, request, response, &headers, stored_at)
        })
    }

    /// Store several responses in one transaction: all or nothing
    pub fn put_all(&self, pairs: &[(Request, Response)]) -> StoreResult<()> {
        let now = Utc::now();
        let mut guard = self.store.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = guard.transaction()?;
        for (request, response) in pairs {
            let key = request_key(&request.method, &request.url);
            let headers = serde_json::to_string(&response.headers)?;
            insert(&tx, &self.name, &key, request, response, &headers, now)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete the entry for a request key
    pub fn delete_key(&self, key: &str) -> StoreResult<bool> {
        self.store.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM responses WHERE generation = ?1 AND request_key = ?2",
                params![self.name, key],
            )?;
            Ok(deleted > 0)
        })
    }

    /// Delete the entry for a request
    pub fn delete(&self, request: &Request) -> StoreResult<bool> {
        self.delete_key(&request_key(&request.method, &request.url))
    }

    /// Metadata for every entry, oldest first
    pub fn entries(&self) -> StoreResult<Vec<CachedEntry>> {
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT request_key, method, url, status, stored_at, size_bytes
                 FROM responses WHERE generation = ?1 ORDER BY stored_at",
            )?;
            let entries = stmt
                .query_map([&self.name], |r| {
                    Ok(CachedEntry {
                        key: r.get(0)?,
                        method: r.get(1)?,
                        url: r.get(2)?,
                        status: r.get(3)?,
                        stored_at: millis_to_datetime(r.get(4)?).unwrap_or_default(),
                        size_bytes: r.get::<_, i64>(5)? as usize,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
    }

    /// Remove every entry of this generation, returning how many were removed
    pub fn clear(&self) -> StoreResult<usize> {
        self.store.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM responses WHERE generation = ?1", [&self.name])?;
            Ok(removed)
        })
    }
}

fn insert(
    conn: &Connection,
    generation: &str,
    key: &str,
    request: &Request,
    response: &Response,
    headers: &str,
    stored_at: DateTime<Utc>,
) -> StoreResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO responses
         (generation, request_key, method, url, status, headers, body, stored_at, size_bytes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            generation,
            key,
            request.method.as_str(),
            request.url.as_str(),
            response.status,
            headers,
            response.body,
            stored_at.timestamp_millis(),
            response.body.len() as i64
        ],
    )?;
    Ok(())
}
