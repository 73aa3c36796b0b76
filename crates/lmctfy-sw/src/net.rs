//! Network fetch seam for the worker.
//!
//! The worker never talks to the network directly; it goes through
//! [`NetworkFetch`] so the live [`HttpFetcher`] and the deterministic
//! [`ScriptedNetwork`] are interchangeable.

use std::future::Future;
use std::sync::Mutex;

use hashbrown::HashMap;
use tracing::trace;

use crate::{FetchRequest, FetchResponse, SwError};

// ==================== Trait ====================

/// Performs a live fetch for an intercepted request.
pub trait NetworkFetch: Send + Sync {
    /// Fetch the request from the network.
    fn fetch(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<FetchResponse, SwError>> + Send;
}

// ==================== HTTP Fetcher ====================

/// Live fetcher backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with a default client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a fetcher over an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkFetch for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, SwError> {
        trace!(url = %request.url, method = %request.method, "network fetch");

        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| SwError::NetworkError(e.to_string()))?;

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SwError::NetworkError(e.to_string()))?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect::<HashMap<_, _>>();

        let body = response
            .bytes()
            .await
            .map_err(|e| SwError::NetworkError(e.to_string()))?
            .to_vec();

        Ok(FetchResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body,
            from_cache: false,
        })
    }
}

// ==================== Scripted Network ====================

/// Deterministic in-memory fetcher for tests and harnesses.
///
/// Routes are exact normalized URL strings; anything unrouted fails like an
/// unreachable network. Every call is recorded.
#[derive(Debug, Default)]
pub struct ScriptedNetwork {
    routes: HashMap<String, FetchResponse>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedNetwork {
    /// Create an empty scripted network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stub a URL with a canned response.
    pub fn stub(&mut self, url: &str, response: FetchResponse) {
        self.routes.insert(url.to_string(), response);
    }

    /// Stub a URL with a 200 response carrying the given body.
    pub fn stub_ok(&mut self, url: &str, body: &[u8]) {
        self.stub(
            url,
            FetchResponse {
                status: 200,
                status_text: "OK".to_string(),
                headers: HashMap::new(),
                body: body.to_vec(),
                from_cache: false,
            },
        );
    }

    /// Stub a URL with an empty response of the given status.
    pub fn stub_status(&mut self, url: &str, status: u16) {
        self.stub(
            url,
            FetchResponse {
                status,
                status_text: String::new(),
                headers: HashMap::new(),
                body: Vec::new(),
                from_cache: false,
            },
        );
    }

    /// URLs fetched so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of fetches performed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl NetworkFetch for ScriptedNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, SwError> {
        self.calls.lock().unwrap().push(request.url.to_string());

        match self.routes.get(request.url.as_str()) {
            Some(response) => Ok(response.clone()),
            None => Err(SwError::NetworkError(format!(
                "no scripted route for {}",
                request.url
            ))),
        }
    }
}
