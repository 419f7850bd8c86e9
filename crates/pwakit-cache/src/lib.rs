//! # PwaKit Cache
//!
//! Named cache buckets mapping request identities to response snapshots.
//!
//! ## Architecture
//!
//! ```text
//! CacheStorage (caches)
//!     │
//!     └── Cache (one named bucket)
//!             └── RequestKey → CacheEntry { request, response }
//!
//! CacheBackend
//!     ├── MemoryBackend   (tokio RwLock + hashbrown)
//!     └── SqliteBackend   (rusqlite, durable)
//! ```
//!
//! Entries enumerate in insertion order; overwriting a key keeps its position.
//! Bucket names enumerate in creation order.

use std::sync::Arc;

use async_trait::async_trait;
use pwakit_common::PwaKitError;
use pwakit_net::{Request, Response};
use thiserror::Error;

pub mod entry;
pub mod memory;
pub mod sqlite;

pub use entry::{CacheEntry, RequestKey, StoredRequest, StoredResponse};
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

// ==================== Errors ====================

/// Errors that can occur in cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache not found: {0}")]
    BucketNotFound(String),

    #[error("Invalid cache entry: {0}")]
    InvalidEntry(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<CacheError> for PwaKitError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Storage(_) | CacheError::Task(_) => {
                PwaKitError::storage_with_source("cache storage failed", err)
            }
            other => PwaKitError::cache_with_source("cache operation failed", other),
        }
    }
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

// ==================== Backend ====================

/// Storage substrate for cache buckets.
///
/// Implementations serialize individual key operations; concurrent puts to the
/// same key resolve as last write wins.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Create the bucket if it does not exist.
    async fn open(&self, cache: &str) -> CacheResult<()>;

    /// Check if a bucket exists.
    async fn has(&self, cache: &str) -> CacheResult<bool>;

    /// Delete a bucket and all of its entries. Returns whether it existed.
    async fn delete(&self, cache: &str) -> CacheResult<bool>;

    /// All bucket names in creation order.
    async fn names(&self) -> CacheResult<Vec<String>>;

    /// Insert or replace one entry.
    async fn put(&self, cache: &str, entry: CacheEntry) -> CacheResult<()>;

    /// Insert or replace a batch of entries atomically: either every entry is
    /// stored or none is.
    async fn put_all(&self, cache: &str, entries: Vec<CacheEntry>) -> CacheResult<()>;

    /// Look up an entry by exact key.
    async fn get(&self, cache: &str, key: &RequestKey) -> CacheResult<Option<CacheEntry>>;

    /// Remove an entry. Returns whether it existed.
    async fn remove(&self, cache: &str, key: &RequestKey) -> CacheResult<bool>;

    /// All entries in insertion order.
    async fn entries(&self, cache: &str) -> CacheResult<Vec<CacheEntry>>;
}

// ==================== Cache Storage ====================

/// Cache storage (the `caches` global).
#[derive(Clone)]
pub struct CacheStorage {
    backend: Arc<dyn CacheBackend>,
}

impl CacheStorage {
    /// Wrap a backend.
    pub fn new(backend: impl CacheBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Wrap a shared backend.
    pub fn from_backend(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Storage backed by process memory.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Open a cache (creates if it doesn't exist).
    pub async fn open(&self, name: &str) -> CacheResult<Cache> {
        self.backend.open(name).await?;
        Ok(Cache {
            name: name.to_string(),
            backend: Arc::clone(&self.backend),
        })
    }

    /// Check if a cache exists.
    pub async fn has(&self, name: &str) -> CacheResult<bool> {
        self.backend.has(name).await
    }

    /// Delete a cache.
    pub async fn delete(&self, name: &str) -> CacheResult<bool> {
        self.backend.delete(name).await
    }

    /// Get all cache names.
    pub async fn keys(&self) -> CacheResult<Vec<String>> {
        self.backend.names().await
    }

    /// Match a request across all caches, oldest cache first.
    pub async fn match_request(&self, request: &Request) -> CacheResult<Option<Response>> {
        let key = RequestKey::from(request);
        for name in self.backend.names().await? {
            if let Some(response) = self.backend.get(&name, &key).await?.and_then(|e| e.response) {
                return response.to_response().map(Some);
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for CacheStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStorage").finish_non_exhaustive()
    }
}

// ==================== Cache ====================

/// Handle to one named cache bucket.
#[derive(Clone)]
pub struct Cache {
    name: String,
    backend: Arc<dyn CacheBackend>,
}

impl Cache {
    /// Cache name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store a response for a request.
    pub async fn put(&self, request: &Request, response: &Response) -> CacheResult<()> {
        self.backend
            .put(&self.name, CacheEntry::from_exchange(request, response))
            .await
    }

    /// Store a prepared entry.
    pub async fn put_entry(&self, entry: CacheEntry) -> CacheResult<()> {
        self.backend.put(&self.name, entry).await
    }

    /// Store a batch of entries; all or nothing.
    pub async fn put_all(&self, entries: Vec<CacheEntry>) -> CacheResult<()> {
        self.backend.put_all(&self.name, entries).await
    }

    /// Match a request by exact method and URL.
    pub async fn match_request(&self, request: &Request) -> CacheResult<Option<Response>> {
        self.match_key(&RequestKey::from(request)).await
    }

    /// Match a key, returning the stored response.
    pub async fn match_key(&self, key: &RequestKey) -> CacheResult<Option<Response>> {
        match self.backend.get(&self.name, key).await? {
            Some(CacheEntry {
                response: Some(response),
                ..
            }) => response.to_response().map(Some),
            _ => Ok(None),
        }
    }

    /// Look up the full entry for a key.
    pub async fn entry(&self, key: &RequestKey) -> CacheResult<Option<CacheEntry>> {
        self.backend.get(&self.name, key).await
    }

    /// Delete the entry for a key.
    pub async fn delete(&self, key: &RequestKey) -> CacheResult<bool> {
        self.backend.remove(&self.name, key).await
    }

    /// Get all stored requests in insertion order.
    pub async fn keys(&self) -> CacheResult<Vec<StoredRequest>> {
        Ok(self
            .backend
            .entries(&self.name)
            .await?
            .into_iter()
            .map(|e| e.request)
            .collect())
    }

    /// Get all entries in insertion order.
    pub async fn entries(&self) -> CacheResult<Vec<CacheEntry>> {
        self.backend.entries(&self.name).await
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").field("name", &self.name).finish()
    }
}
