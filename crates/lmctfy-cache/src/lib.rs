//! # lmctfy Cache
//!
//! Named request/response cache stores for the lmctfy offline worker.
//!
//! This is the storage half of the Cache API the worker programs against:
//!
//! ```text
//! CacheStorage (caches)
//!     └── Cache ("lmctfy-cache-a")
//!             └── request key → CacheEntry (status, headers, body)
//! ```
//!
//! Keys are normalized absolute URLs; the worker layer resolves relative
//! references against its scope before they ever reach this crate. Entries
//! are immutable once written: there is no update path, a full refresh means
//! a new cache generation under a new name.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

// ==================== Cache Entry ====================

/// A cached request/response pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL (normalized, absolute).
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response status text.
    pub status_text: String,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Create an entry stamped with the current time.
    pub fn new(
        url: impl Into<String>,
        method: impl Into<String>,
        status: u16,
        status_text: impl Into<String>,
        headers: HashMap<String, String>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            status,
            status_text: status_text.into(),
            headers,
            body,
            cached_at: now_millis(),
        }
    }
}

// ==================== Cache ====================

/// A single named cache store.
#[derive(Debug, Default)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    /// Cached entries keyed by normalized request URL.
    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request key against this store.
    pub fn match_request(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Store an entry under a key.
    pub fn put(&mut self, key: &str, entry: CacheEntry) {
        trace!(cache = %self.name, key, "put entry");
        self.entries.insert(key.to_string(), entry);
    }

    /// Store a whole batch of entries at once.
    ///
    /// The worker stages every manifest fetch before calling this, so a
    /// failed fetch never leaves a half-written batch behind.
    pub fn put_all(&mut self, batch: Vec<(String, CacheEntry)>) {
        debug!(cache = %self.name, entries = batch.len(), "put batch");
        for (key, entry) in batch {
            self.entries.insert(key, entry);
        }
    }

    /// Delete an entry. Returns whether anything was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Get all keys.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache Storage ====================

/// The set of named cache stores for one origin (the `caches` global).
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cache, creating it if it does not exist.
    pub fn open(&mut self, name: &str) -> &mut Cache {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    /// Get a cache without creating it.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Check if a cache exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a whole cache store. Returns whether it existed.
    pub fn delete(&mut self, name: &str) -> bool {
        let removed = self.caches.remove(name).is_some();
        if removed {
            debug!(cache = name, "deleted cache store");
        }
        removed
    }

    /// Get all cache names.
    pub fn keys(&self) -> Vec<String> {
        self.caches.keys().cloned().collect()
    }

    /// Match a request key across every store, unrestricted by name.
    pub fn match_request(&self, key: &str) -> Option<&CacheEntry> {
        for cache in self.caches.values() {
            if let Some(entry) = cache.match_request(key) {
                return Some(entry);
            }
        }
        None
    }
}

// ==================== Helpers ====================

/// Milliseconds since the Unix epoch.
fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str) -> CacheEntry {
        CacheEntry::new(url, "GET", 200, "OK", HashMap::new(), b"body".to_vec())
    }

    #[test]
    fn test_cache_put_and_match() {
        let mut cache = Cache::new("lmctfy-cache-a");

        let url = "https://lmctfy.baierschmidtja.com/lmctfy.css";
        cache.put(url, entry(url));

        assert!(cache.match_request(url).is_some());
        assert!(cache
            .match_request("https://lmctfy.baierschmidtja.com/other.css")
            .is_none());
    }

    #[test]
    fn test_cache_put_all_batch() {
        let mut cache = Cache::new("lmctfy-cache-a");

        let urls = [
            "https://lmctfy.baierschmidtja.com/index.html",
            "https://lmctfy.baierschmidtja.com/lmctfy.js",
        ];
        let batch = urls
            .iter()
            .map(|u| (u.to_string(), entry(u)))
            .collect::<Vec<_>>();

        cache.put_all(batch);

        assert_eq!(cache.len(), 2);
        for url in urls {
            assert!(cache.match_request(url).is_some());
        }
    }

    #[test]
    fn test_cache_delete() {
        let mut cache = Cache::new("v1");

        let url = "https://lmctfy.baierschmidtja.com/lmctfy.css";
        cache.put(url, entry(url));

        assert!(cache.delete(url));
        assert!(!cache.delete(url));
        assert!(cache.match_request(url).is_none());
    }

    #[test]
    fn test_cache_keys() {
        let mut cache = Cache::new("test");
        cache.put("https://a.example/a.js", entry("https://a.example/a.js"));
        cache.put("https://a.example/b.js", entry("https://a.example/b.js"));

        assert_eq!(cache.keys().len(), 2);
    }

    #[test]
    fn test_storage_open_creates() {
        let mut storage = CacheStorage::new();

        assert!(!storage.has("lmctfy-cache-a"));
        storage.open("lmctfy-cache-a");
        assert!(storage.has("lmctfy-cache-a"));
        assert!(storage.get("lmctfy-cache-a").is_some());
    }

    #[test]
    fn test_storage_delete() {
        let mut storage = CacheStorage::new();

        storage.open("lmctfy-cache");
        assert!(storage.delete("lmctfy-cache"));
        assert!(!storage.has("lmctfy-cache"));
        assert!(!storage.delete("lmctfy-cache"));
    }

    #[test]
    fn test_storage_match_searches_all_stores() {
        let mut storage = CacheStorage::new();

        let url = "https://lmctfy.baierschmidtja.com/index.html";
        storage.open("lmctfy-cache").put(url, entry(url));
        storage.open("lmctfy-cache-a");

        // The match is unrestricted by store name.
        assert!(storage.match_request(url).is_some());
        assert!(storage.match_request("https://a.example/missing").is_none());
    }

    #[test]
    fn test_entry_is_stamped() {
        let e = entry("https://a.example/a.js");
        assert!(e.cached_at > 0);
        assert_eq!(e.method, "GET");
        assert_eq!(e.status_text, "OK");
    }
}
