//! JSON views of agent results for terminal output.

use pwakit_cache::{CacheResult, CacheStorage};
use pwakit_sw::{FetchOutcome, ServiceWorkerState};
use serde::Serialize;

/// Printable form of a fetch outcome.
#[derive(Debug, Serialize)]
pub struct FetchSummary {
    pub state: ServiceWorkerState,
    pub source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl FetchSummary {
    pub fn new(state: ServiceWorkerState, outcome: &FetchOutcome) -> Self {
        let response = outcome.response();
        Self {
            state,
            source: outcome.source(),
            url: response.map(|r| r.url.to_string()),
            status: response.map(|r| r.status.as_u16()),
            response_type: response.map(|r| r.response_type.as_str()),
            body: response.map(|r| String::from_utf8_lossy(r.body()).into_owned()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CacheSummary {
    pub name: String,
    pub entries: Vec<String>,
}

/// Every bucket with the method and URL of each entry.
pub async fn list_caches(caches: &CacheStorage) -> CacheResult<Vec<CacheSummary>> {
    let mut summaries = Vec::new();
    for name in caches.keys().await? {
        let cache = caches.open(&name).await?;
        let entries = cache
            .keys()
            .await?
            .into_iter()
            .map(|r| format!("{} {}", r.method, r.url))
            .collect();
        summaries.push(CacheSummary { name, entries });
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pwakit_net::{Request, Response, StatusCode, Url};

    #[test]
    fn test_unavailable_has_no_response_fields() {
        let summary = FetchSummary::new(ServiceWorkerState::Activated, &FetchOutcome::Unavailable);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "state": "activated", "source": "unavailable" })
        );
    }

    #[test]
    fn test_network_summary_includes_body() {
        let url = Url::parse("https://shop.test/products").unwrap();
        let outcome = FetchOutcome::Network(Response::new(url, StatusCode::OK, "catalog"));
        let summary = FetchSummary::new(ServiceWorkerState::Activated, &outcome);
        assert_eq!(summary.status, Some(200));
        assert_eq!(summary.response_type, Some("basic"));
        assert_eq!(summary.body.as_deref(), Some("catalog"));
    }

    #[tokio::test]
    async fn test_list_caches() {
        let caches = CacheStorage::in_memory();
        let cache = caches.open("ftc-pwa-v1.0.0").await.unwrap();
        let url = Url::parse("https://shop.test/").unwrap();
        cache
            .put(&Request::get(url.clone()), &Response::new(url, StatusCode::OK, "home"))
            .await
            .unwrap();

        let listed = list_caches(&caches).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].entries, vec!["GET https://shop.test/"]);
    }
}
