//! Durable cache backend on SQLite.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use pwakit_net::ResponseType;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::task;
use tracing::{debug, info};

use crate::{
    CacheBackend, CacheEntry, CacheError, CacheResult, RequestKey, StoredRequest, StoredResponse,
};

/// Database schema version for migrations
const SCHEMA_VERSION: i32 = 1;

/// Initialize or upgrade the cache database.
fn init_database(conn: &Connection) -> CacheResult<()> {
    // Bucket deletion cascades to entries
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    let table_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get::<_, i32>(0).map(|count| count > 0),
        )
        .unwrap_or(false);

    let version: i32 = if table_exists {
        conn.query_row(
            "SELECT version FROM schema_version ORDER BY id DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0)
    } else {
        0
    };

    if version < SCHEMA_VERSION {
        create_schema_v1(conn)?;
    }

    Ok(())
}

/// Create initial schema (version 1)
fn create_schema_v1(conn: &Connection) -> CacheResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            version INTEGER NOT NULL,
            applied_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS caches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cache_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cache_id INTEGER NOT NULL REFERENCES caches(id) ON DELETE CASCADE,
            method TEXT NOT NULL,
            url TEXT NOT NULL,
            request_headers TEXT NOT NULL,
            request_body BLOB,
            response_url TEXT,
            status INTEGER,
            response_headers TEXT,
            response_body BLOB,
            response_type TEXT,
            cached_at INTEGER NOT NULL,
            UNIQUE (cache_id, method, url)
        );

        CREATE INDEX IF NOT EXISTS idx_entries_cache ON cache_entries(cache_id);
        "#,
    )?;

    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?, ?)",
        params![SCHEMA_VERSION, Utc::now().timestamp()],
    )?;

    Ok(())
}

fn cache_id(conn: &Connection, cache: &str) -> CacheResult<i64> {
    conn.query_row("SELECT id FROM caches WHERE name = ?1", [cache], |row| {
        row.get(0)
    })
    .optional()?
    .ok_or_else(|| CacheError::BucketNotFound(cache.to_string()))
}

fn upsert(conn: &Connection, cache_id: i64, entry: &CacheEntry) -> CacheResult<()> {
    let request_headers = serde_json::to_string(&entry.request.headers)?;
    let response = entry.response.as_ref();
    let response_headers = response
        .map(|r| serde_json::to_string(&r.headers))
        .transpose()?;

    conn.execute(
        r#"
        INSERT INTO cache_entries (
            cache_id, method, url, request_headers, request_body,
            response_url, status, response_headers, response_body, response_type, cached_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT (cache_id, method, url) DO UPDATE SET
            request_headers = excluded.request_headers,
            request_body = excluded.request_body,
            response_url = excluded.response_url,
            status = excluded.status,
            response_headers = excluded.response_headers,
            response_body = excluded.response_body,
            response_type = excluded.response_type,
            cached_at = excluded.cached_at
        "#,
        params![
            cache_id,
            entry.request.method,
            entry.request.url,
            request_headers,
            entry.request.body,
            response.map(|r| r.url.as_str()),
            response.map(|r| r.status),
            response_headers,
            response.map(|r| r.body.as_slice()),
            response.map(|r| r.response_type.as_str()),
            entry.cached_at,
        ],
    )?;
    Ok(())
}

const ENTRY_COLUMNS: &str = "e.method, e.url, e.request_headers, e.request_body, e.response_url, \
     e.status, e.response_headers, e.response_body, e.response_type, e.cached_at";

/// Row as stored, before JSON columns are decoded.
struct RawEntry {
    method: String,
    url: String,
    request_headers: String,
    request_body: Option<Vec<u8>>,
    response_url: Option<String>,
    status: Option<i64>,
    response_headers: Option<String>,
    response_body: Option<Vec<u8>>,
    response_type: Option<String>,
    cached_at: i64,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            method: row.get(0)?,
            url: row.get(1)?,
            request_headers: row.get(2)?,
            request_body: row.get(3)?,
            response_url: row.get(4)?,
            status: row.get(5)?,
            response_headers: row.get(6)?,
            response_body: row.get(7)?,
            response_type: row.get(8)?,
            cached_at: row.get(9)?,
        })
    }

    fn into_entry(self) -> CacheResult<CacheEntry> {
        let request = StoredRequest {
            method: self.method,
            url: self.url,
            headers: serde_json::from_str(&self.request_headers)?,
            body: self.request_body,
        };

        let response = match self.response_url {
            Some(url) => {
                let status = self
                    .status
                    .and_then(|s| u16::try_from(s).ok())
                    .ok_or_else(|| CacheError::InvalidEntry(format!("bad status for {url}")))?;
                let headers = match self.response_headers {
                    Some(ref json) => serde_json::from_str(json)?,
                    None => Vec::new(),
                };
                let response_type = self
                    .response_type
                    .as_deref()
                    .and_then(ResponseType::from_name)
                    .unwrap_or_default();
                Some(StoredResponse {
                    url,
                    status,
                    headers,
                    body: self.response_body.unwrap_or_default(),
                    response_type,
                })
            }
            None => None,
        };

        Ok(CacheEntry {
            request,
            response,
            cached_at: self.cached_at,
        })
    }
}

/// Cache backend persisted in a SQLite database.
///
/// Statements run on the blocking thread pool; the connection is shared behind a mutex.
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open (or create) a database file.
    pub fn open(path: &Path) -> CacheResult<Self> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened cache database");
        Self::with_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> CacheResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> CacheResult<Self> {
        init_database(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, op: F) -> CacheResult<T>
    where
        F: FnOnce(&mut Connection) -> CacheResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            op(&mut guard)
        })
        .await
        .map_err(|e| CacheError::Task(e.to_string()))?
    }
}

#[async_trait]
impl CacheBackend for SqliteBackend {
    async fn open(&self, cache: &str) -> CacheResult<()> {
        let cache = cache.to_string();
        self.run(move |conn| {
            let created = conn.execute(
                "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)",
                params![cache, Utc::now().timestamp_millis()],
            )?;
            if created > 0 {
                debug!(cache = %cache, "Created cache");
            }
            Ok(())
        })
        .await
    }

    async fn has(&self, cache: &str) -> CacheResult<bool> {
        let cache = cache.to_string();
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM caches WHERE name = ?1",
                [&cache],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
    }

    async fn delete(&self, cache: &str) -> CacheResult<bool> {
        let cache = cache.to_string();
        self.run(move |conn| Ok(conn.execute("DELETE FROM caches WHERE name = ?1", [&cache])? > 0))
            .await
    }

    async fn names(&self) -> CacheResult<Vec<String>> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM caches ORDER BY id")?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(names)
        })
        .await
    }

    async fn put(&self, cache: &str, entry: CacheEntry) -> CacheResult<()> {
        let cache = cache.to_string();
        self.run(move |conn| {
            let id = cache_id(conn, &cache)?;
            upsert(conn, id, &entry)
        })
        .await
    }

    async fn put_all(&self, cache: &str, entries: Vec<CacheEntry>) -> CacheResult<()> {
        let cache = cache.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let id = cache_id(&tx, &cache)?;
            for entry in &entries {
                upsert(&tx, id, entry)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get(&self, cache: &str, key: &RequestKey) -> CacheResult<Option<CacheEntry>> {
        let cache = cache.to_string();
        let key = key.clone();
        self.run(move |conn| {
            let sql = format!(
                "SELECT {ENTRY_COLUMNS} FROM cache_entries e JOIN caches c ON c.id = e.cache_id \
                 WHERE c.name = ?1 AND e.method = ?2 AND e.url = ?3"
            );
            conn.query_row(&sql, params![cache, key.method, key.url], RawEntry::from_row)
                .optional()?
                .map(RawEntry::into_entry)
                .transpose()
        })
        .await
    }

    async fn remove(&self, cache: &str, key: &RequestKey) -> CacheResult<bool> {
        let cache = cache.to_string();
        let key = key.clone();
        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM cache_entries WHERE cache_id = (SELECT id FROM caches WHERE name = ?1) \
                 AND method = ?2 AND url = ?3",
                params![cache, key.method, key.url],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn entries(&self, cache: &str) -> CacheResult<Vec<CacheEntry>> {
        let cache = cache.to_string();
        self.run(move |conn| {
            let id = cache_id(conn, &cache)?;
            let sql = format!(
                "SELECT {ENTRY_COLUMNS} FROM cache_entries e WHERE e.cache_id = ?1 ORDER BY e.id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let raw = stmt
                .query_map([id], RawEntry::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            raw.into_iter().map(RawEntry::into_entry).collect()
        })
        .await
    }
}
