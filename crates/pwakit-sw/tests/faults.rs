//! Storage faults must be logged and reported, never surfaced to the host.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use pwakit_cache::{
    CacheBackend, CacheEntry, CacheError, CacheResult, CacheStorage, MemoryBackend, RequestKey,
};
use pwakit_net::testing::ScriptedFetcher;
use pwakit_net::{Request, Url};
use pwakit_sw::{AgentConfig, OfflineAgent, ServiceWorkerState};

/// Memory backend that fails selected operations on demand.
#[derive(Default)]
struct FlakyBackend {
    inner: MemoryBackend,
    undeletable: Mutex<HashSet<String>>,
    unopenable: Mutex<HashSet<String>>,
    fail_puts: AtomicBool,
    fail_removes: AtomicBool,
}

fn injected(what: &str) -> CacheError {
    CacheError::Task(format!("injected {what} failure"))
}

#[async_trait]
impl CacheBackend for FlakyBackend {
    async fn open(&self, cache: &str) -> CacheResult<()> {
        if self.unopenable.lock().unwrap().contains(cache) {
            return Err(injected("open"));
        }
        self.inner.open(cache).await
    }

    async fn has(&self, cache: &str) -> CacheResult<bool> {
        self.inner.has(cache).await
    }

    async fn delete(&self, cache: &str) -> CacheResult<bool> {
        if self.undeletable.lock().unwrap().contains(cache) {
            return Err(injected("delete"));
        }
        self.inner.delete(cache).await
    }

    async fn names(&self) -> CacheResult<Vec<String>> {
        self.inner.names().await
    }

    async fn put(&self, cache: &str, entry: CacheEntry) -> CacheResult<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(injected("put"));
        }
        self.inner.put(cache, entry).await
    }

    async fn put_all(&self, cache: &str, entries: Vec<CacheEntry>) -> CacheResult<()> {
        self.inner.put_all(cache, entries).await
    }

    async fn get(&self, cache: &str, key: &RequestKey) -> CacheResult<Option<CacheEntry>> {
        self.inner.get(cache, key).await
    }

    async fn remove(&self, cache: &str, key: &RequestKey) -> CacheResult<bool> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(injected("remove"));
        }
        self.inner.remove(cache, key).await
    }

    async fn entries(&self, cache: &str) -> CacheResult<Vec<CacheEntry>> {
        self.inner.entries(cache).await
    }
}

const ORIGIN: &str = "https://shop.test/";

fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

fn setup() -> (OfflineAgent, Arc<FlakyBackend>, Arc<ScriptedFetcher>) {
    let config = AgentConfig::default().with_origin(Url::parse(ORIGIN).unwrap());
    let fetcher = Arc::new(ScriptedFetcher::new());
    for url in config.shell_urls().unwrap() {
        fetcher.route(url.as_str(), 200, url.path());
    }
    let backend = Arc::new(FlakyBackend::default());
    let caches = CacheStorage::from_backend(backend.clone());
    let agent = OfflineAgent::new(config, caches, fetcher.clone()).unwrap();
    (agent, backend, fetcher)
}

#[tokio::test]
async fn test_failed_deletion_does_not_block_others() {
    let (agent, backend, _) = setup();
    for name in ["ftc-pwa-v0.1.0", "ftc-pwa-v0.2.0", "ftc-pwa-v0.3.0"] {
        agent.caches().open(name).await.unwrap();
    }
    backend
        .undeletable
        .lock()
        .unwrap()
        .insert("ftc-pwa-v0.2.0".to_string());

    agent.install().await;
    let report = agent.activate().await;

    assert_eq!(report.deleted, vec!["ftc-pwa-v0.1.0", "ftc-pwa-v0.3.0"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].cache, "ftc-pwa-v0.2.0");
    assert_eq!(
        agent.caches().keys().await.unwrap(),
        vec!["ftc-pwa-v0.2.0", "ftc-pwa-v1.0.0"]
    );
}

#[tokio::test]
async fn test_background_write_failure_does_not_affect_response() {
    let (agent, backend, fetcher) = setup();
    agent.install().await;
    agent.activate().await;

    backend.fail_puts.store(true, Ordering::SeqCst);
    fetcher.route("https://shop.test/deals", 200, "deals");

    let outcome = agent.fetch(Request::get(url("/deals"))).await;
    assert_eq!(outcome.response().unwrap().text().unwrap(), "deals");
    agent.settle().await;

    fetcher.set_offline(true);
    let outcome = agent.fetch(Request::get(url("/deals"))).await;
    assert_eq!(outcome.source(), "unavailable");
}

#[tokio::test]
async fn test_queue_open_failure_aborts_sync() {
    let (agent, backend, fetcher) = setup();
    backend
        .unopenable
        .lock()
        .unwrap()
        .insert("ftc-pwa-v1.0.0-data".to_string());

    let report = agent.sync("order-submission").await.unwrap();
    assert!(report.aborted.is_some());
    assert!(!report.is_clean());
    assert!(fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_undeletable_replay_stays_queued() {
    let (agent, backend, fetcher) = setup();
    agent
        .queue()
        .enqueue(&Request::post(url("/orders/submit/8"), Bytes::new()))
        .await
        .unwrap();
    fetcher.route("https://shop.test/orders/submit/8", 200, "");
    backend.fail_removes.store(true, Ordering::SeqCst);

    let report = agent.sync("order-submission").await.unwrap();
    assert_eq!(report.replayed.len(), 1);
    assert_eq!(agent.queue().pending().await.unwrap().len(), 1);

    backend.fail_removes.store(false, Ordering::SeqCst);
    agent.sync("order-submission").await.unwrap();
    assert!(agent.queue().pending().await.unwrap().is_empty());
    assert_eq!(fetcher.call_count("https://shop.test/orders/submit/8"), 2);
}

#[tokio::test]
async fn test_broken_shell_cache_reads_as_miss() {
    let (agent, backend, fetcher) = setup();
    agent.install().await;
    agent.activate().await;
    backend
        .unopenable
        .lock()
        .unwrap()
        .insert("ftc-pwa-v1.0.0".to_string());

    fetcher.set_offline(true);
    let outcome = agent.fetch(Request::navigate(url("/"))).await;
    assert!(outcome.response().is_none());
}

#[tokio::test]
async fn test_unrecorded_activation_is_not_restored() {
    let (agent, backend, fetcher) = setup();
    agent.install().await;
    backend.fail_puts.store(true, Ordering::SeqCst);

    let report = agent.activate().await;
    assert!(report.error.is_some());
    assert_eq!(agent.state().await, ServiceWorkerState::Activated);

    let config = agent.config().clone();
    let fresh = OfflineAgent::new(config, agent.caches().clone(), fetcher).unwrap();
    assert_eq!(fresh.restore().await.unwrap(), ServiceWorkerState::Parsed);
}
