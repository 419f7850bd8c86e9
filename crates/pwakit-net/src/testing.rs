//! Scripted fetcher for exercising fetch policies without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use http::{Method, StatusCode};

use crate::{Fetcher, NetError, Request, Response, ResponseType, Url};

#[derive(Debug, Clone)]
enum Route {
    Respond {
        status: StatusCode,
        body: String,
        response_type: ResponseType,
    },
    Fail,
}

/// A fetcher that answers from a table of routes keyed by absolute URL.
///
/// Unrouted URLs and every URL while offline fail with a network error.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, Route>>,
    offline: AtomicBool,
    calls: Mutex<Vec<(Method, String)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with a basic response.
    pub fn route(&self, url: &str, status: u16, body: &str) {
        self.route_with_type(url, status, body, ResponseType::Basic);
    }

    /// Answer `url` with a response of the given type.
    pub fn route_with_type(&self, url: &str, status: u16, body: &str, response_type: ResponseType) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        lock(&self.routes).insert(
            url.to_string(),
            Route::Respond {
                status,
                body: body.to_string(),
                response_type,
            },
        );
    }

    /// Make `url` fail with a network error.
    pub fn fail(&self, url: &str) {
        lock(&self.routes).insert(url.to_string(), Route::Fail);
    }

    /// Toggle global network availability.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every request seen so far, in order.
    pub fn calls(&self) -> Vec<(Method, String)> {
        lock(&self.calls).clone()
    }

    /// Number of requests seen for `url`.
    pub fn call_count(&self, url: &str) -> usize {
        lock(&self.calls).iter().filter(|(_, u)| u == url).count()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: Request) -> Result<Response, NetError> {
        let url = request.url.to_string();
        lock(&self.calls).push((request.method.clone(), url.clone()));

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::Offline);
        }

        let route = lock(&self.routes).get(&url).cloned();
        match route {
            Some(Route::Respond {
                status,
                body,
                response_type,
            }) => {
                let response_url = Url::parse(&url).map_err(|e| NetError::InvalidUrl(e.to_string()))?;
                Ok(Response::new(response_url, status, body).with_type(response_type))
            }
            Some(Route::Fail) => Err(NetError::RequestFailed(format!("scripted failure: {url}"))),
            None => Err(NetError::RequestFailed(format!("no route for {url}"))),
        }
    }
}
