//! App-shell cache population and stale cache cleanup.

use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use pwakit_cache::{CacheEntry, CacheStorage, RequestKey, StoredRequest};
use pwakit_common::{PwaKitError, Result};
use pwakit_net::{Fetcher, Request, RequestMode};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::AgentConfig;

/// Method of the marker entry an activated generation keeps in its shell cache.
const ACTIVATION_METHOD: &str = "ACTIVATE";

/// Outcome of the install phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub cache_name: String,
    /// Shell resources requested.
    pub requested: usize,
    /// Shell resources stored.
    pub cached: usize,
    /// Why population failed, if it did.
    pub error: Option<String>,
}

impl InstallReport {
    /// Whether every shell resource was stored.
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.cached == self.requested
    }
}

/// A cache that could not be deleted during activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionFailure {
    pub cache: String,
    pub error: String,
}

/// Outcome of the activate phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivateReport {
    /// The current shell cache, if it exists.
    pub retained: Vec<String>,
    pub deleted: Vec<String>,
    pub failed: Vec<DeletionFailure>,
    /// Set when the cache names could not be enumerated or the activation
    /// could not be recorded.
    pub error: Option<String>,
}

/// Owns the versioned app-shell cache.
pub struct ShellCacheManager {
    config: Arc<AgentConfig>,
    caches: CacheStorage,
    fetcher: Arc<dyn Fetcher>,
}

impl ShellCacheManager {
    pub fn new(config: Arc<AgentConfig>, caches: CacheStorage, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config,
            caches,
            fetcher,
        }
    }

    /// Fetch every shell resource and store them as one batch.
    ///
    /// Any failed resource fails the whole batch; the failure is logged and
    /// reported, never propagated.
    pub async fn install(&self) -> InstallReport {
        let cache_name = self.config.shell_cache_name();
        let requested = self.config.shell_resources.len();
        info!(cache = %cache_name, resources = requested, "Caching app shell");

        match self.populate(&cache_name).await {
            Ok(cached) => {
                info!(cache = %cache_name, cached, "App shell cached");
                InstallReport {
                    cache_name,
                    requested,
                    cached,
                    error: None,
                }
            }
            Err(err) => {
                error!(
                    cache = %cache_name,
                    error = %err,
                    category = err.category(),
                    "Cache error during install"
                );
                InstallReport {
                    cache_name,
                    requested,
                    cached: 0,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    async fn populate(&self, cache_name: &str) -> Result<usize> {
        let cache = self.caches.open(cache_name).await?;
        let urls = self.config.shell_urls()?;

        let entries = try_join_all(urls.into_iter().map(|url| self.fetch_resource(url))).await?;
        let cached = entries.len();
        cache.put_all(entries).await?;
        Ok(cached)
    }

    async fn fetch_resource(&self, url: Url) -> Result<CacheEntry> {
        let request = Request::get(url).mode(RequestMode::SameOrigin);
        let response = self.fetcher.fetch(request.clone()).await?;
        if !response.ok() {
            return Err(PwaKitError::network(format!(
                "{} responded with {}",
                request.url, response.status
            )));
        }
        debug!(url = %request.url, "Fetched shell resource");
        Ok(CacheEntry::from_exchange(&request, &response))
    }

    /// Delete every cache whose name is not the current shell cache name,
    /// then record the activation in the shell cache.
    ///
    /// Deletions run concurrently; a failed deletion is logged and does not
    /// stop the others.
    pub async fn activate(&self) -> ActivateReport {
        let current = self.config.shell_cache_name();

        let names = match self.caches.keys().await {
            Ok(names) => names,
            Err(err) => {
                let err = PwaKitError::from(err);
                error!(error = %err, category = err.category(), "Could not enumerate caches");
                return ActivateReport {
                    error: Some(err.to_string()),
                    ..Default::default()
                };
            }
        };

        let (retained, stale): (Vec<String>, Vec<String>) =
            names.into_iter().partition(|name| *name == current);

        let deletions = stale.into_iter().map(|name| async move {
            info!(cache = %name, "Deleting old cache");
            let result = self.caches.delete(&name).await;
            (name, result)
        });

        let mut report = ActivateReport {
            retained,
            ..Default::default()
        };

        for (name, result) in join_all(deletions).await {
            match result {
                Ok(existed) => {
                    if !existed {
                        debug!(cache = %name, "Cache already gone");
                    }
                    report.deleted.push(name);
                }
                Err(err) => {
                    warn!(cache = %name, error = %err, "Failed to delete old cache");
                    report.failed.push(DeletionFailure {
                        cache: name,
                        error: err.to_string(),
                    });
                }
            }
        }

        if let Err(err) = self.record_activation().await {
            error!(cache = %current, error = %err, "Could not record activation");
            report.error = Some(err.to_string());
        }

        info!(
            retained = report.retained.len(),
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "Activation cleanup finished"
        );
        report
    }

    /// Whether the current generation has completed activation.
    ///
    /// Never creates the shell cache.
    pub async fn is_activated(&self) -> Result<bool> {
        let name = self.config.shell_cache_name();
        if !self.caches.has(&name).await? {
            return Ok(false);
        }
        let cache = self.caches.open(&name).await?;
        Ok(cache.entry(&self.activation_key()).await?.is_some())
    }

    async fn record_activation(&self) -> Result<()> {
        let key = self.activation_key();
        let marker = StoredRequest {
            method: key.method,
            url: key.url,
            headers: Vec::new(),
            body: None,
        };
        let cache = self.caches.open(&self.config.shell_cache_name()).await?;
        cache.put_entry(CacheEntry::new(marker, None)).await?;
        Ok(())
    }

    fn activation_key(&self) -> RequestKey {
        RequestKey {
            method: ACTIVATION_METHOD.to_string(),
            url: self.config.origin.to_string(),
        }
    }
}
