//! lmctfy smoke harness
//!
//! Drives the offline worker through one full lifecycle with a scripted
//! network, so the whole path can be exercised deterministically and
//! offline: a leftover previous-generation cache, a skip-waiting message
//! arriving before install finishes, precaching, cache hits and misses,
//! and stale-generation cleanup at activation.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::RwLock;
use tracing::{info, warn};

use lmctfy_cache::CacheStorage;
use lmctfy_common::{init_logging, LogConfig, LogFormat};
use lmctfy_sw::{
    CacheWorker, FetchRequest, ScriptedNetwork, SwError, WorkerConfig, WorkerHost, PREVIOUS_CACHE,
};

#[tokio::main]
async fn main() -> Result<(), SwError> {
    init_logging(LogConfig {
        format: LogFormat::Compact,
        ..LogConfig::default()
    });

    let config = WorkerConfig::default();

    // Script the network: every manifest asset plus one uncached page.
    let mut net = ScriptedNetwork::new();
    for reference in &config.precache_manifest {
        let key = config.resolve(reference)?;
        net.stub_ok(key.as_str(), format!("asset {reference}").as_bytes());
    }
    let uncached = config.resolve("/about.html")?;
    net.stub_ok(uncached.as_str(), b"live page");

    // The superseded worker generation left its store behind.
    let storage = Arc::new(RwLock::new(CacheStorage::new()));
    storage.write().await.open(PREVIOUS_CACHE);

    let worker = CacheWorker::with_storage(config.clone(), storage.clone(), net);
    let (mut host, mut events) = WorkerHost::new(worker);

    // A client nudges the new version before it has even installed.
    host.post_message(json!({"type": "SKIP_WAITING"})).await?;

    // Install precaches the manifest, then the deferred skip-waiting
    // request carries straight through activation.
    host.install().await?;
    info!(state = ?host.state(), "lifecycle complete");

    // Cache hit.
    let index = config.resolve("/index.html")?;
    let response = host.fetch(FetchRequest::get(index)).await?;
    info!(
        from_cache = response.from_cache,
        bytes = response.body.len(),
        "fetched /index.html"
    );

    // Cache miss with a live fallback.
    let response = host.fetch(FetchRequest::get(uncached)).await?;
    info!(
        from_cache = response.from_cache,
        bytes = response.body.len(),
        "fetched /about.html"
    );

    // Cache miss with the network down for that URL.
    let unroutable = config.resolve("/unroutable.png")?;
    match host.fetch(FetchRequest::get(unroutable)).await {
        Ok(_) => warn!("unroutable fetch unexpectedly succeeded"),
        Err(e) => info!(error = %e, "unroutable fetch failed as expected"),
    }

    {
        let storage = storage.read().await;
        info!(
            caches = ?storage.keys(),
            previous_present = storage.has(PREVIOUS_CACHE),
            "cache stores after activation"
        );
    }

    info!(
        network_calls = host.worker().network().call_count(),
        "network summary"
    );

    while let Ok(event) = events.try_recv() {
        info!(?event, "host event");
    }

    Ok(())
}
