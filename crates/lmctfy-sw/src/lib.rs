//! # lmctfy Service Worker
//!
//! Offline-first asset cache worker for the lmctfy site.
//!
//! ## Features
//!
//! - **Install**: pre-caches the fixed asset manifest into the current
//!   cache generation, all-or-nothing
//! - **Fetch**: cache-first resolution with live network fallback
//! - **Activate**: deletes the superseded cache generation
//! - **Messages**: `{"type": "SKIP_WAITING"}` promotes a waiting worker
//!   to active immediately
//!
//! ## Architecture
//!
//! ```text
//! WorkerHost (lifecycle driver, host::WorkerHost)
//!     │  awaits each handler before advancing the phase
//!     └── CacheWorker::dispatch
//!             ├── message  → skip-waiting directive
//!             ├── install  → precache manifest into "lmctfy-cache-a"
//!             ├── fetch    → cache match | network fetch
//!             └── activate → delete "lmctfy-cache"
//!
//! CacheStorage (lmctfy-cache)
//!     └── Cache → request key → CacheEntry
//! ```

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, trace};
use url::Url;

use lmctfy_cache::{CacheEntry, CacheStorage};

pub mod host;
pub mod net;

pub use host::{HostEvent, WorkerHost, WorkerState};
pub use net::{HttpFetcher, NetworkFetch, ScriptedNetwork};

// ==================== Errors ====================

/// Errors that can occur in worker operations.
#[derive(Error, Debug, Clone)]
pub enum SwError {
    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

// ==================== Constants ====================

/// Current cache generation.
pub const CACHE: &str = "lmctfy-cache-a";

/// Prior cache generation, deleted at activation.
pub const PREVIOUS_CACHE: &str = "lmctfy-cache";

/// Control message type that promotes a waiting worker.
pub const SKIP_WAITING: &str = "SKIP_WAITING";

/// Worker scope; relative manifest entries resolve against this.
pub const SCOPE: &str = "https://lmctfy.baierschmidtja.com/";

/// Assets that must be cached before the worker can activate.
pub const PRECACHE_MANIFEST: [&str; 5] = [
    "https://cdn.jsdelivr.net/npm/bootstrap@4.5.3/dist/css/bootstrap.min.css",
    "/lmctfy.css",
    "/lmctfy.js",
    "https://lmctfy.baierschmidtja.com",
    "/index.html",
];

// ==================== Config ====================

/// Worker configuration.
///
/// `Default` yields the production values; tests and harnesses substitute
/// their own scope and manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Scope URL the worker controls.
    pub scope: Url,

    /// Name of the current cache generation.
    pub cache_name: String,

    /// Name of the superseded cache generation.
    pub previous_cache_name: String,

    /// Asset manifest, absolute or scope-relative URLs.
    pub precache_manifest: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scope: Url::parse(SCOPE).expect("scope literal is a valid URL"),
            cache_name: CACHE.to_string(),
            previous_cache_name: PREVIOUS_CACHE.to_string(),
            precache_manifest: PRECACHE_MANIFEST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl WorkerConfig {
    /// Resolve a manifest reference against the worker scope.
    ///
    /// Absolute URLs pass through (normalized); relative references join
    /// onto the scope. The resulting URL string is the cache key.
    pub fn resolve(&self, reference: &str) -> Result<Url, SwError> {
        Ok(self.scope.join(reference)?)
    }
}

// ==================== Requests & Responses ====================

/// An intercepted outgoing request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Request URL.
    pub url: Url,

    /// Request method.
    pub method: String,

    /// Request headers.
    pub headers: HashMap<String, String>,
}

impl FetchRequest {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: "GET".to_string(),
            headers: HashMap::new(),
        }
    }
}

/// A response handed back to the requester.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Status code.
    pub status: u16,

    /// Status text.
    pub status_text: String,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Whether served from cache.
    pub from_cache: bool,
}

impl FetchResponse {
    /// Check if the status is a success (2xx).
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Create a response from a cache entry.
    pub fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            status: entry.status,
            status_text: entry.status_text.clone(),
            headers: entry.headers.clone(),
            body: entry.body.clone(),
            from_cache: true,
        }
    }
}

// ==================== Events ====================

/// The fixed set of signals the host delivers to the worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Control message from a controlled page.
    Message(JsonValue),
    /// Install lifecycle event.
    Install,
    /// Intercepted network request.
    Fetch(FetchRequest),
    /// Activate lifecycle event.
    Activate,
}

/// Directive a control message can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlDirective {
    /// Promote the waiting worker to active immediately.
    SkipWaiting,
}

/// Result of dispatching one event.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    /// Message not recognized; nothing happened.
    Ignored,
    /// The worker asked to skip its waiting phase.
    SkipWaiting,
    /// A lifecycle phase's pending work finished.
    Completed,
    /// A fetch event produced a response.
    Response(FetchResponse),
}

// ==================== Cache Worker ====================

/// The cache manager worker.
///
/// Handlers are async; the host awaits each returned future before letting
/// the triggering lifecycle phase finish (the `waitUntil` contract).
pub struct CacheWorker<N: NetworkFetch> {
    config: WorkerConfig,
    storage: Arc<RwLock<CacheStorage>>,
    net: N,
}

impl<N: NetworkFetch> CacheWorker<N> {
    /// Create a worker with fresh cache storage.
    pub fn new(config: WorkerConfig, net: N) -> Self {
        Self::with_storage(config, Arc::new(RwLock::new(CacheStorage::new())), net)
    }

    /// Create a worker over existing origin storage.
    ///
    /// A new worker generation shares the origin's stores with the one it
    /// supersedes; this is how the stale generation is still visible at
    /// activation time.
    pub fn with_storage(
        config: WorkerConfig,
        storage: Arc<RwLock<CacheStorage>>,
        net: N,
    ) -> Self {
        Self {
            config,
            storage,
            net,
        }
    }

    /// Worker configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Handle to the origin's cache storage.
    pub fn storage(&self) -> Arc<RwLock<CacheStorage>> {
        Arc::clone(&self.storage)
    }

    /// The network fetcher.
    pub fn network(&self) -> &N {
        &self.net
    }

    /// Dispatch one host signal to its handler.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome, SwError> {
        match event {
            WorkerEvent::Message(data) => Ok(match self.handle_message(&data) {
                Some(ControlDirective::SkipWaiting) => EventOutcome::SkipWaiting,
                None => EventOutcome::Ignored,
            }),
            WorkerEvent::Install => {
                self.handle_install().await?;
                Ok(EventOutcome::Completed)
            }
            WorkerEvent::Fetch(request) => Ok(EventOutcome::Response(
                self.handle_fetch(&request).await?,
            )),
            WorkerEvent::Activate => {
                self.handle_activate().await?;
                Ok(EventOutcome::Completed)
            }
        }
    }

    /// Handle a control message.
    ///
    /// Only `{"type": "SKIP_WAITING"}` is recognized; every other payload
    /// (null, missing or foreign `type`, non-object) is silently ignored.
    pub fn handle_message(&self, data: &JsonValue) -> Option<ControlDirective> {
        match data.get("type").and_then(JsonValue::as_str) {
            Some(SKIP_WAITING) => {
                debug!("skip waiting requested by client");
                Some(ControlDirective::SkipWaiting)
            }
            _ => None,
        }
    }

    /// Handle the install event: precache the whole manifest.
    ///
    /// Every manifest asset is fetched before anything is written, so a
    /// failed asset fails the install without committing a partial batch.
    pub async fn handle_install(&self) -> Result<(), SwError> {
        let mut staged = Vec::with_capacity(self.config.precache_manifest.len());

        for reference in &self.config.precache_manifest {
            let key = self.config.resolve(reference)?;
            let request = FetchRequest::get(key.clone());

            let response = self
                .net
                .fetch(&request)
                .await
                .map_err(|e| SwError::InstallFailed(format!("{reference}: {e}")))?;

            if !response.ok() {
                return Err(SwError::InstallFailed(format!(
                    "{reference}: status {}",
                    response.status
                )));
            }

            trace!(url = %key, status = response.status, "staged manifest asset");
            staged.push((
                key.to_string(),
                CacheEntry::new(
                    key.to_string(),
                    request.method,
                    response.status,
                    response.status_text,
                    response.headers,
                    response.body,
                ),
            ));
        }

        let mut storage = self.storage.write().await;
        let entries = staged.len();
        storage.open(&self.config.cache_name).put_all(staged);
        info!(cache = %self.config.cache_name, entries, "precache complete");
        Ok(())
    }

    /// Handle an intercepted fetch: cache-first, network fallback.
    ///
    /// The match runs across every store under the origin, not just the
    /// current generation. A miss goes to the network exactly once and the
    /// live response is never written back into any store.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<FetchResponse, SwError> {
        if request.method.eq_ignore_ascii_case("GET") {
            let storage = self.storage.read().await;
            if let Some(entry) = storage.match_request(request.url.as_str()) {
                debug!(url = %request.url, "cache hit");
                return Ok(FetchResponse::from_entry(entry));
            }
        }

        trace!(url = %request.url, method = %request.method, "cache miss, going to network");
        self.net.fetch(request).await
    }

    /// Handle the activate event: drop the superseded cache generation.
    ///
    /// Only stores named exactly like the previous generation are deleted;
    /// the current store and anything else are untouched. Running this with
    /// no stale store present is a no-op.
    pub async fn handle_activate(&self) -> Result<(), SwError> {
        let mut storage = self.storage.write().await;

        let stale: Vec<String> = storage
            .keys()
            .into_iter()
            .filter(|name| *name == self.config.previous_cache_name)
            .collect();

        for name in stale {
            storage.delete(&name);
            info!(cache = %name, "deleted stale cache generation");
        }

        Ok(())
    }
}
