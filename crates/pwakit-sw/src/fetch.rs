//! Network-first fetch interception with cache fallback.

use std::sync::Arc;

use http::{Method, StatusCode};
use pwakit_cache::{Cache, CacheResult, CacheStorage, RequestKey};
use pwakit_common::Result;
use pwakit_net::{Fetcher, Request, Response, ResponseType};
use tracing::{debug, trace, warn};

use crate::background::BackgroundTasks;
use crate::config::AgentConfig;

/// What the interceptor did with a request.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; the host performs the request itself.
    Passthrough,
    /// Served from the network.
    Network(Response),
    /// Served from the shell cache after a network failure.
    Cached(Response),
    /// Offline fallback document for a failed navigation.
    OfflineFallback(Response),
    /// Network failed and nothing suitable was cached.
    Unavailable,
}

impl FetchOutcome {
    /// Borrow the response, if there is one.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Network(r) | Self::Cached(r) | Self::OfflineFallback(r) => Some(r),
            Self::Passthrough | Self::Unavailable => None,
        }
    }

    /// Take the response, if there is one.
    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::Network(r) | Self::Cached(r) | Self::OfflineFallback(r) => Some(r),
            Self::Passthrough | Self::Unavailable => None,
        }
    }

    /// Short name of where the answer came from.
    pub fn source(&self) -> &'static str {
        match self {
            Self::Passthrough => "passthrough",
            Self::Network(_) => "network",
            Self::Cached(_) => "cache",
            Self::OfflineFallback(_) => "offline-fallback",
            Self::Unavailable => "unavailable",
        }
    }
}

/// Whether a network response may be stored in the shell cache.
pub fn is_cacheable(response: &Response) -> bool {
    response.status == StatusCode::OK && response.response_type == ResponseType::Basic
}

/// Applies network-first-with-cache-fallback to GET requests.
pub struct FetchInterceptor {
    caches: CacheStorage,
    fetcher: Arc<dyn Fetcher>,
    shell_cache: String,
    offline_key: RequestKey,
    tasks: BackgroundTasks,
}

impl FetchInterceptor {
    pub fn new(
        config: &AgentConfig,
        caches: CacheStorage,
        fetcher: Arc<dyn Fetcher>,
        tasks: BackgroundTasks,
    ) -> Result<Self> {
        Ok(Self {
            caches,
            fetcher,
            shell_cache: config.shell_cache_name(),
            offline_key: RequestKey::get(&config.offline_url()?),
            tasks,
        })
    }

    /// Handle one intercepted request.
    pub async fn handle(&self, request: Request) -> FetchOutcome {
        if request.method != Method::GET {
            trace!(url = %request.url, method = %request.method, "Not intercepting");
            return FetchOutcome::Passthrough;
        }

        match self.fetcher.fetch(request.clone()).await {
            Ok(response) => {
                if is_cacheable(&response) {
                    self.store_in_background(request, response.clone());
                } else {
                    trace!(
                        url = %request.url,
                        status = %response.status,
                        response_type = response.response_type.as_str(),
                        "Response not cacheable"
                    );
                }
                FetchOutcome::Network(response)
            }
            Err(err) => {
                debug!(url = %request.url, error = %err, "Network failed, trying cache");
                self.fallback(&request).await
            }
        }
    }

    /// Write the response into the shell cache without holding up the caller.
    fn store_in_background(&self, request: Request, response: Response) {
        let caches = self.caches.clone();
        let cache_name = self.shell_cache.clone();

        self.tasks.spawn(async move {
            let result: CacheResult<()> = async {
                let cache = caches.open(&cache_name).await?;
                cache.put(&request, &response).await
            }
            .await;

            match result {
                Ok(()) => trace!(cache = %cache_name, url = %request.url, "Cached response"),
                Err(err) => {
                    warn!(cache = %cache_name, url = %request.url, error = %err, "Failed to cache response")
                }
            }
        });
    }

    /// Look up the shell cache without creating it.
    async fn shell_cache(&self) -> CacheResult<Option<Cache>> {
        if !self.caches.has(&self.shell_cache).await? {
            return Ok(None);
        }
        self.caches.open(&self.shell_cache).await.map(Some)
    }

    async fn fallback(&self, request: &Request) -> FetchOutcome {
        let cache = match self.shell_cache().await {
            Ok(Some(cache)) => cache,
            Ok(None) => {
                debug!(cache = %self.shell_cache, "Shell cache missing");
                return FetchOutcome::Unavailable;
            }
            Err(err) => {
                warn!(cache = %self.shell_cache, error = %err, "Shell cache unavailable");
                return FetchOutcome::Unavailable;
            }
        };

        match cache.match_request(request).await {
            Ok(Some(response)) => return FetchOutcome::Cached(response),
            Ok(None) => {}
            Err(err) => warn!(url = %request.url, error = %err, "Cache lookup failed"),
        }

        if !request.is_navigation() {
            return FetchOutcome::Unavailable;
        }

        match cache.match_key(&self.offline_key).await {
            Ok(Some(response)) => FetchOutcome::OfflineFallback(response),
            Ok(None) => {
                warn!(url = %self.offline_key.url, "Offline page is not cached");
                FetchOutcome::Unavailable
            }
            Err(err) => {
                warn!(url = %self.offline_key.url, error = %err, "Offline page lookup failed");
                FetchOutcome::Unavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use pwakit_net::testing::ScriptedFetcher;
    use url::Url;

    const ORIGIN: &str = "https://shop.test/";

    struct Fixture {
        interceptor: FetchInterceptor,
        fetcher: Arc<ScriptedFetcher>,
        caches: CacheStorage,
        tasks: BackgroundTasks,
        config: AgentConfig,
    }

    fn fixture() -> Fixture {
        let config = AgentConfig::default().with_origin(Url::parse(ORIGIN).unwrap());
        let fetcher = Arc::new(ScriptedFetcher::new());
        let caches = CacheStorage::in_memory();
        let tasks = BackgroundTasks::new();
        let interceptor =
            FetchInterceptor::new(&config, caches.clone(), fetcher.clone(), tasks.clone())
                .unwrap();
        Fixture {
            interceptor,
            fetcher,
            caches,
            tasks,
            config,
        }
    }

    fn url(path: &str) -> Url {
        Url::parse(ORIGIN).unwrap().join(path).unwrap()
    }

    impl Fixture {
        async fn cached(&self, path: &str) -> Option<Response> {
            let cache = self.caches.open(&self.config.shell_cache_name()).await.unwrap();
            cache.match_request(&Request::get(url(path))).await.unwrap()
        }
    }

    #[test]
    fn test_cacheability_filter() {
        let ok = Response::new(url("/"), StatusCode::OK, "");
        assert!(is_cacheable(&ok));
        assert!(!is_cacheable(&ok.clone().with_type(ResponseType::Opaque)));
        assert!(!is_cacheable(&ok.clone().with_type(ResponseType::Cors)));
        assert!(!is_cacheable(&Response::new(url("/"), StatusCode::NOT_FOUND, "")));
        assert!(!is_cacheable(&Response::new(url("/"), StatusCode::NO_CONTENT, "")));
    }

    #[tokio::test]
    async fn test_network_success_is_returned_and_cached() {
        let f = fixture();
        f.fetcher.route("https://shop.test/products", 200, "catalog");

        let outcome = f.interceptor.handle(Request::get(url("/products"))).await;
        assert_eq!(outcome.source(), "network");
        assert_eq!(outcome.response().unwrap().text().unwrap(), "catalog");

        f.tasks.settle().await;
        let copy = f.cached("/products").await.unwrap();
        assert_eq!(copy.text().unwrap(), "catalog");
    }

    #[tokio::test]
    async fn test_uncacheable_responses_are_returned_but_not_stored() {
        let f = fixture();
        f.fetcher.route("https://shop.test/missing", 404, "nope");
        f.fetcher.route_with_type(
            "https://shop.test/widget.js",
            200,
            "widget",
            ResponseType::Opaque,
        );

        let outcome = f.interceptor.handle(Request::get(url("/missing"))).await;
        assert_eq!(outcome.response().unwrap().status, StatusCode::NOT_FOUND);
        let outcome = f.interceptor.handle(Request::get(url("/widget.js"))).await;
        assert_eq!(outcome.source(), "network");

        f.tasks.settle().await;
        assert!(f.cached("/missing").await.is_none());
        assert!(f.cached("/widget.js").await.is_none());
    }

    #[tokio::test]
    async fn test_non_get_passes_through() {
        let f = fixture();
        let request = Request::post(url("/orders/submit/1"), Bytes::from_static(b"{}"));

        let outcome = f.interceptor.handle(request).await;
        assert!(matches!(outcome, FetchOutcome::Passthrough));
        assert!(f.fetcher.calls().is_empty());
        assert!(f.caches.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_serves_cached_copy() {
        let f = fixture();
        f.fetcher.route("https://shop.test/users", 200, "users");
        f.interceptor.handle(Request::get(url("/users"))).await;
        f.tasks.settle().await;

        f.fetcher.set_offline(true);
        let outcome = f.interceptor.handle(Request::get(url("/users"))).await;
        assert_eq!(outcome.source(), "cache");
        assert_eq!(outcome.into_response().unwrap().text().unwrap(), "users");
    }

    #[tokio::test]
    async fn test_offline_navigation_gets_fallback_page() {
        let f = fixture();
        f.fetcher.route("https://shop.test/offline.html", 200, "you are offline");
        f.interceptor.handle(Request::get(url("/offline.html"))).await;
        f.tasks.settle().await;

        f.fetcher.set_offline(true);
        let outcome = f.interceptor.handle(Request::navigate(url("/"))).await;
        assert_eq!(outcome.source(), "offline-fallback");
        assert_eq!(outcome.response().unwrap().text().unwrap(), "you are offline");

        let outcome = f.interceptor.handle(Request::get(url("/assets/app.css"))).await;
        assert!(matches!(outcome, FetchOutcome::Unavailable));
    }

    #[tokio::test]
    async fn test_offline_navigation_without_fallback_is_unavailable() {
        let f = fixture();
        f.fetcher.set_offline(true);
        let outcome = f.interceptor.handle(Request::navigate(url("/"))).await;
        assert!(outcome.response().is_none());
    }

    #[tokio::test]
    async fn test_offline_lookup_does_not_create_shell_cache() {
        let f = fixture();
        f.fetcher.set_offline(true);

        let outcome = f.interceptor.handle(Request::navigate(url("/products"))).await;
        assert!(matches!(outcome, FetchOutcome::Unavailable));
        assert!(!f.caches.has(&f.config.shell_cache_name()).await.unwrap());
    }

    #[tokio::test]
    async fn test_offline_match_ignores_fragment() {
        let f = fixture();
        f.fetcher.route("https://shop.test/products", 200, "catalog");
        f.interceptor.handle(Request::get(url("/products"))).await;
        f.tasks.settle().await;

        f.fetcher.set_offline(true);
        let outcome = f
            .interceptor
            .handle(Request::navigate(url("/products#reviews")))
            .await;
        assert_eq!(outcome.source(), "cache");
        assert_eq!(outcome.response().unwrap().text().unwrap(), "catalog");
    }
}
