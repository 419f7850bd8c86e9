//! Request/response snapshots stored in cache buckets.

use bytes::Bytes;
use chrono::Utc;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use pwakit_net::{Request, RequestMode, Response, ResponseType, Url};
use serde::{Deserialize, Serialize};

use crate::{CacheError, CacheResult};

/// Identity of a cached request: method plus absolute URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        Self {
            method: method.as_str().to_string(),
            url: cache_url(url),
        }
    }

    /// Key for a GET of `url`.
    pub fn get(url: &Url) -> Self {
        Self::new(&Method::GET, url)
    }
}

impl From<&Request> for RequestKey {
    fn from(request: &Request) -> Self {
        Self::new(&request.method, &request.url)
    }
}

/// A request snapshot, complete enough to replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl StoredRequest {
    pub fn key(&self) -> RequestKey {
        RequestKey {
            method: self.method.clone(),
            url: self.url.clone(),
        }
    }

    /// Rebuild a live request from the snapshot.
    pub fn to_request(&self) -> CacheResult<Request> {
        let url = Url::parse(&self.url)
            .map_err(|e| CacheError::InvalidEntry(format!("bad url {}: {e}", self.url)))?;
        let method = Method::from_bytes(self.method.as_bytes())
            .map_err(|e| CacheError::InvalidEntry(format!("bad method {}: {e}", self.method)))?;

        let mut request = Request::get(url).mode(RequestMode::SameOrigin);
        request.method = method;
        request.headers = headers_to_map(&self.headers)?;
        request.body = self.body.clone().map(Bytes::from);
        Ok(request)
    }
}

impl From<&Request> for StoredRequest {
    fn from(request: &Request) -> Self {
        Self {
            method: request.method.as_str().to_string(),
            url: cache_url(&request.url),
            headers: headers_from_map(&request.headers),
            body: request.body.as_ref().map(|b| b.to_vec()),
        }
    }
}

/// A response snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub response_type: ResponseType,
}

impl StoredResponse {
    /// Rebuild a live response from the snapshot.
    pub fn to_response(&self) -> CacheResult<Response> {
        let url = Url::parse(&self.url)
            .map_err(|e| CacheError::InvalidEntry(format!("bad url {}: {e}", self.url)))?;
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| CacheError::InvalidEntry(format!("bad status {}: {e}", self.status)))?;

        let mut response =
            Response::new(url, status, self.body.clone()).with_type(self.response_type);
        response.headers = headers_to_map(&self.headers)?;
        Ok(response)
    }
}

impl From<&Response> for StoredResponse {
    fn from(response: &Response) -> Self {
        Self {
            url: response.url.to_string(),
            status: response.status.as_u16(),
            headers: headers_from_map(&response.headers),
            body: response.body().to_vec(),
            response_type: response.response_type,
        }
    }
}

/// One entry of a cache bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub request: StoredRequest,
    /// Absent for queued requests that have not been answered yet.
    pub response: Option<StoredResponse>,
    /// Milliseconds since the Unix epoch.
    pub cached_at: i64,
}

impl CacheEntry {
    pub fn new(request: StoredRequest, response: Option<StoredResponse>) -> Self {
        Self {
            request,
            response,
            cached_at: Utc::now().timestamp_millis(),
        }
    }

    /// Snapshot a request/response pair.
    pub fn from_exchange(request: &Request, response: &Response) -> Self {
        Self::new(request.into(), Some(response.into()))
    }

    pub fn key(&self) -> RequestKey {
        self.request.key()
    }
}

/// Fragments never reach the server, so they take no part in matching.
fn cache_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

// Header values that are not visible ASCII are kept as Latin-1 text.
fn headers_from_map(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let text = match value.to_str() {
                Ok(text) => text.to_string(),
                Err(_) => value.as_bytes().iter().map(|&b| char::from(b)).collect(),
            };
            (name.as_str().to_string(), text)
        })
        .collect()
}

fn headers_to_map(headers: &[(String, String)]) -> CacheResult<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| CacheError::InvalidEntry(format!("bad header name {name}: {e}")))?;
        map.append(name, header_value(value)?);
    }
    Ok(map)
}

fn header_value(text: &str) -> CacheResult<HeaderValue> {
    let value = if text.is_ascii() {
        HeaderValue::from_str(text).map_err(bad_header_value)?
    } else {
        let bytes = text
            .chars()
            .map(u8::try_from)
            .collect::<Result<Vec<u8>, _>>()
            .map_err(bad_header_value)?;
        HeaderValue::from_bytes(&bytes).map_err(bad_header_value)?
    };
    Ok(value)
}

fn bad_header_value(e: impl std::fmt::Display) -> CacheError {
    CacheError::InvalidEntry(format!("bad header value: {e}"))
}
