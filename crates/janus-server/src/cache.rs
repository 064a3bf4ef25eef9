//! Response caching for unary HTTP routes.
//!
//! The cache is created once per serve call, shared by every route the
//! `cache` plugin applies to, and closed during teardown after both
//! listeners have stopped.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::StatusCode;
use janus_config::{CacheConfig, CacheKind};
use parking_lot::RwLock;

/// A cached response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// Response status.
    pub status: StatusCode,
    /// `Content-Type` header value.
    pub content_type: String,
    /// Response body.
    pub body: Bytes,
}

/// A response cache backend.
pub trait ResponseCache: Send + Sync + fmt::Debug + 'static {
    /// Looks up a live entry.
    fn get(&self, key: &str) -> Option<CachedResponse>;

    /// Stores an entry. Ignored after [`close`](Self::close).
    fn put(&self, key: String, response: CachedResponse);

    /// Releases the cache. Subsequent lookups miss.
    fn close(&self);
}

/// Creates the cache described by `config`, or `None` when disabled.
pub fn new_cache(config: &CacheConfig) -> Option<Arc<dyn ResponseCache>> {
    match config.kind {
        CacheKind::None => None,
        CacheKind::Memory => Some(Arc::new(MemoryCache::new(config.ttl(), config.max_entries))),
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: CachedResponse,
    created_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub size: usize,
    /// Number of evictions due to capacity.
    pub evictions: u64,
}

/// In-process TTL cache with a bounded number of entries.
#[derive(Debug)]
pub struct MemoryCache {
    ttl: Duration,
    max_entries: usize,
    entries: RwLock<HashMap<String, CacheEntry>>,
    closed: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            entries: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns `true` once closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.entries.read().len(),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn evict_expired(&self, entries: &mut HashMap<String, CacheEntry>) {
        let before = entries.len();
        entries.retain(|_, v| !v.is_expired(self.ttl));
        let evicted = before - entries.len();
        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        }
    }

    fn find_oldest(entries: &HashMap<String, CacheEntry>) -> Option<String> {
        entries
            .iter()
            .min_by_key(|(_, v)| v.created_at)
            .map(|(k, _)| k.clone())
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &str) -> Option<CachedResponse> {
        if !self.is_closed() {
            if let Some(entry) = self.entries.read().get(key) {
                if !entry.is_expired(self.ttl) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.response.clone());
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn put(&self, key: String, response: CachedResponse) {
        if self.max_entries == 0 || self.is_closed() {
            return;
        }

        let mut entries = self.entries.write();

        if entries.len() >= self.max_entries {
            self.evict_expired(&mut entries);
        }

        while entries.len() >= self.max_entries {
            match Self::find_oldest(&entries) {
                Some(oldest) => {
                    entries.remove(&oldest);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }

        entries.insert(
            key,
            CacheEntry {
                response,
                created_at: Instant::now(),
            },
        );
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cached(body: &'static str) -> CachedResponse {
        CachedResponse {
            status: StatusCode::OK,
            content_type: "application/json".to_string(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn test_cache_hit_miss() {
        let cache = MemoryCache::new(Duration::from_secs(60), 10);

        assert!(cache.get("k").is_none());
        cache.put("k".to_string(), cached("{}"));
        assert_eq!(cache.get("k"), Some(cached("{}")));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_cache_expiry() {
        let cache = MemoryCache::new(Duration::from_millis(10), 10);
        cache.put("k".to_string(), cached("{}"));

        std::thread::sleep(Duration::from_millis(25));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_cache_evicts_oldest_at_capacity() {
        let cache = MemoryCache::new(Duration::from_secs(60), 2);
        cache.put("a".to_string(), cached("1"));
        std::thread::sleep(Duration::from_millis(2));
        cache.put("b".to_string(), cached("2"));
        std::thread::sleep(Duration::from_millis(2));
        cache.put("c".to_string(), cached("3"));

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_close_drops_entries_and_refuses_writes() {
        let cache = MemoryCache::new(Duration::from_secs(60), 10);
        cache.put("k".to_string(), cached("{}"));

        cache.close();
        assert!(cache.is_closed());
        assert!(cache.get("k").is_none());

        cache.put("k".to_string(), cached("{}"));
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn test_new_cache_from_config() {
        assert!(new_cache(&CacheConfig::default()).is_none());
        assert!(new_cache(&CacheConfig::memory(Duration::from_secs(5))).is_some());
    }
}
