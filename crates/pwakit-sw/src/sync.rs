//! Deferred write queue drained on background sync.

use std::sync::Arc;

use http::StatusCode;
use pwakit_cache::{Cache, CacheEntry, CacheStorage, StoredRequest};
use pwakit_common::{PwaKitError, Result};
use pwakit_net::{Fetcher, Request, UrlPattern};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::AgentConfig;

/// A queued write that could not be replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayFailure {
    pub url: String,
    pub error: String,
}

/// Result of one drain of the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub cache_name: String,
    /// URLs replayed and removed from the queue.
    pub replayed: Vec<String>,
    /// Writes kept for the next sync.
    pub failed: Vec<ReplayFailure>,
    /// Entries in the bucket that do not target the submission endpoint.
    pub skipped: usize,
    /// Set when the queue could not be opened or read.
    pub aborted: Option<String>,
}

impl SyncReport {
    /// Whether every queued write went out.
    pub fn is_clean(&self) -> bool {
        self.aborted.is_none() && self.failed.is_empty()
    }
}

/// Durable queue of write requests waiting for connectivity.
pub struct DeferredWriteQueue {
    caches: CacheStorage,
    fetcher: Arc<dyn Fetcher>,
    cache_name: String,
    endpoint: UrlPattern,
    tag: String,
}

impl DeferredWriteQueue {
    pub fn new(config: &AgentConfig, caches: CacheStorage, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            caches,
            fetcher,
            cache_name: config.data_cache_name(),
            endpoint: UrlPattern::contains(config.submission_path.as_str()),
            tag: config.sync_tag.clone(),
        }
    }

    /// The sync tag this queue answers to.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Whether a sync signal with `tag` drains this queue.
    pub fn handles(&self, tag: &str) -> bool {
        self.tag == tag
    }

    /// Store a write request for later replay.
    pub async fn enqueue(&self, request: &Request) -> Result<()> {
        if !self.endpoint.matches(&request.url) {
            return Err(PwaKitError::InvalidArgument(format!(
                "{} does not match {}",
                request.url, self.endpoint
            )));
        }
        let cache = self.caches.open(&self.cache_name).await?;
        cache
            .put_entry(CacheEntry::new(StoredRequest::from(request), None))
            .await?;
        debug!(cache = %self.cache_name, url = %request.url, "Queued write");
        Ok(())
    }

    /// Queued writes in replay order.
    pub async fn pending(&self) -> Result<Vec<StoredRequest>> {
        let cache = self.caches.open(&self.cache_name).await?;
        Ok(cache
            .keys()
            .await?
            .into_iter()
            .filter(|r| self.endpoint.matches_str(&r.url))
            .collect())
    }

    /// Replay every queued write in order, removing the ones that succeed.
    pub async fn drain(&self) -> SyncReport {
        let mut report = SyncReport {
            cache_name: self.cache_name.clone(),
            ..Default::default()
        };

        let (cache, queued) = match self.load().await {
            Ok(loaded) => loaded,
            Err(err) => {
                error!(
                    cache = %self.cache_name,
                    error = %err,
                    category = err.category(),
                    "Sync failed"
                );
                report.aborted = Some(err.to_string());
                return report;
            }
        };

        for request in queued {
            if !self.endpoint.matches_str(&request.url) {
                report.skipped += 1;
                continue;
            }

            match self.replay(&request).await {
                Ok(status) => {
                    debug!(url = %request.url, %status, "Replayed write");
                    if let Err(err) = cache.delete(&request.key()).await {
                        warn!(
                            url = %request.url,
                            error = %err,
                            "Replayed write could not be removed from the queue"
                        );
                    }
                    report.replayed.push(request.url);
                }
                Err(err) => {
                    warn!(
                        url = %request.url,
                        error = %err,
                        retryable = err.is_retryable(),
                        "Replay failed, keeping write queued"
                    );
                    report.failed.push(ReplayFailure {
                        url: request.url,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            cache = %self.cache_name,
            replayed = report.replayed.len(),
            failed = report.failed.len(),
            "Sync finished"
        );
        report
    }

    async fn load(&self) -> Result<(Cache, Vec<StoredRequest>)> {
        let cache = self.caches.open(&self.cache_name).await?;
        let queued = cache.keys().await?;
        Ok((cache, queued))
    }

    /// Any HTTP response counts as delivered; only a failed fetch keeps the
    /// write queued.
    async fn replay(&self, stored: &StoredRequest) -> Result<StatusCode> {
        let request = stored.to_request()?;
        let response = self.fetcher.fetch(request).await?;
        Ok(response.status)
    }
}
