//! reqwest-backed implementation of the fetch primitive.

use std::time::Duration;

use async_trait::async_trait;
use http::header::{ACCEPT_LANGUAGE, ACCESS_CONTROL_ALLOW_ORIGIN};
use http::HeaderMap;
use reqwest::Client;
use tracing::{debug, info, trace};

use crate::{Fetcher, NetError, Request, Response, ResponseType, Url};

/// HTTP fetcher configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// User agent string.
    pub user_agent: String,
    /// Accept-Language header.
    pub accept_language: String,
    /// Per-request timeout. `None` lets a hung exchange wait indefinitely.
    pub timeout: Option<Duration>,
    /// Maximum redirects.
    pub max_redirects: usize,
    /// Origin of the controlled application. Responses from other origins are
    /// classified as `cors` or `opaque`.
    pub origin: Option<Url>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("PwaKit/", env!("CARGO_PKG_VERSION")).to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            timeout: None,
            max_redirects: 10,
            origin: None,
        }
    }
}

impl LoaderConfig {
    /// Set the controlled origin.
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// Fetcher that performs real HTTP exchanges.
pub struct HttpFetcher {
    client: Client,
    config: LoaderConfig,
}

impl HttpFetcher {
    /// Create a new HTTP fetcher.
    pub fn new(config: LoaderConfig) -> Result<Self, NetError> {
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects));

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        info!(origin = ?config.origin.as_ref().map(Url::as_str), "HttpFetcher initialized");

        Ok(Self { client, config })
    }

    fn classify(&self, final_url: &Url, headers: &HeaderMap) -> ResponseType {
        match self.config.origin {
            None => ResponseType::Basic,
            Some(ref origin) if origin.origin() == final_url.origin() => ResponseType::Basic,
            Some(_) if headers.contains_key(ACCESS_CONTROL_ALLOW_ORIGIN) => ResponseType::Cors,
            Some(_) => ResponseType::Opaque,
        }
    }

    fn map_error(&self, err: reqwest::Error) -> NetError {
        match self.config.timeout {
            Some(timeout) if err.is_timeout() => NetError::Timeout(timeout),
            _ => NetError::HttpError(err),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, "Fetching resource");

        let mut req_builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .header(ACCEPT_LANGUAGE, &self.config.accept_language);

        if let Some(body) = request.body {
            req_builder = req_builder.body(body);
        }

        let response = req_builder.send().await.map_err(|e| self.map_error(e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await.map_err(|e| self.map_error(e))?;
        let response_type = self.classify(&url, &headers);

        trace!(
            url = %url,
            status = %status,
            response_type = response_type.as_str(),
            body_len = body.len(),
            "Response received"
        );

        let mut response = Response::new(url, status, body).with_type(response_type);
        response.headers = headers;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_config_default() {
        let config = LoaderConfig::default();
        assert!(config.user_agent.starts_with("PwaKit/"));
        assert!(config.timeout.is_none());
        assert!(config.origin.is_none());
    }

    #[test]
    fn test_classify_by_origin() {
        let origin = Url::parse("https://shop.test/").unwrap();
        let fetcher = HttpFetcher::new(LoaderConfig::default().with_origin(origin)).unwrap();

        let same = Url::parse("https://shop.test/products").unwrap();
        assert_eq!(fetcher.classify(&same, &HeaderMap::new()), ResponseType::Basic);

        let cross = Url::parse("https://cdn.test/lib.js").unwrap();
        assert_eq!(fetcher.classify(&cross, &HeaderMap::new()), ResponseType::Opaque);

        let mut cors_headers = HeaderMap::new();
        cors_headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, "*".parse().unwrap());
        assert_eq!(fetcher.classify(&cross, &cors_headers), ResponseType::Cors);
    }
}
