//! In-process cache backend.

use async_trait::async_trait;
use hashbrown::HashMap;
use tokio::sync::RwLock;
use tracing::trace;

use crate::{CacheBackend, CacheEntry, CacheError, CacheResult, RequestKey};

#[derive(Debug, Default)]
struct Bucket {
    /// Creation sequence number.
    seq: u64,
    entries: Vec<CacheEntry>,
}

impl Bucket {
    fn position(&self, key: &RequestKey) -> Option<usize> {
        self.entries.iter().position(|e| &e.key() == key)
    }

    fn upsert(&mut self, entry: CacheEntry) {
        match self.position(&entry.key()) {
            Some(index) => self.entries[index] = entry,
            None => self.entries.push(entry),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    caches: HashMap<String, Bucket>,
    next_seq: u64,
}

/// Cache backend held entirely in memory. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn open(&self, cache: &str) -> CacheResult<()> {
        let mut state = self.state.write().await;
        if !state.caches.contains_key(cache) {
            let seq = state.next_seq;
            state.next_seq += 1;
            state.caches.insert(
                cache.to_string(),
                Bucket {
                    seq,
                    entries: Vec::new(),
                },
            );
            trace!(cache, "Created cache");
        }
        Ok(())
    }

    async fn has(&self, cache: &str) -> CacheResult<bool> {
        Ok(self.state.read().await.caches.contains_key(cache))
    }

    async fn delete(&self, cache: &str) -> CacheResult<bool> {
        Ok(self.state.write().await.caches.remove(cache).is_some())
    }

    async fn names(&self) -> CacheResult<Vec<String>> {
        let state = self.state.read().await;
        let mut names: Vec<(u64, &String)> =
            state.caches.iter().map(|(name, b)| (b.seq, name)).collect();
        names.sort_unstable_by_key(|(seq, _)| *seq);
        Ok(names.into_iter().map(|(_, name)| name.clone()).collect())
    }

    async fn put(&self, cache: &str, entry: CacheEntry) -> CacheResult<()> {
        let mut state = self.state.write().await;
        let bucket = state
            .caches
            .get_mut(cache)
            .ok_or_else(|| CacheError::BucketNotFound(cache.to_string()))?;
        bucket.upsert(entry);
        Ok(())
    }

    async fn put_all(&self, cache: &str, entries: Vec<CacheEntry>) -> CacheResult<()> {
        // A single write guard makes the batch atomic.
        let mut state = self.state.write().await;
        let bucket = state
            .caches
            .get_mut(cache)
            .ok_or_else(|| CacheError::BucketNotFound(cache.to_string()))?;
        for entry in entries {
            bucket.upsert(entry);
        }
        Ok(())
    }

    async fn get(&self, cache: &str, key: &RequestKey) -> CacheResult<Option<CacheEntry>> {
        let state = self.state.read().await;
        Ok(state
            .caches
            .get(cache)
            .and_then(|b| b.position(key).map(|i| b.entries[i].clone())))
    }

    async fn remove(&self, cache: &str, key: &RequestKey) -> CacheResult<bool> {
        let mut state = self.state.write().await;
        let Some(bucket) = state.caches.get_mut(cache) else {
            return Ok(false);
        };
        match bucket.position(key) {
            Some(index) => {
                bucket.entries.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn entries(&self, cache: &str) -> CacheResult<Vec<CacheEntry>> {
        let state = self.state.read().await;
        state
            .caches
            .get(cache)
            .map(|b| b.entries.clone())
            .ok_or_else(|| CacheError::BucketNotFound(cache.to_string()))
    }
}
