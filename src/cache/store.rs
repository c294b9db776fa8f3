//! Response storage.

use std::sync::RwLock;
use std::time::Duration;

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;

use super::config::CacheConfig;
use super::keys::ResponseCacheKey;
use super::lock;

pub const METRIC_RESPONSE_HIT: &str = "quill_cache_response_hit_total";
pub const METRIC_RESPONSE_MISS: &str = "quill_cache_response_miss_total";
pub const METRIC_RESPONSE_EXPIRED: &str = "quill_cache_response_expired_total";
pub const METRIC_RESPONSE_EVICT: &str = "quill_cache_response_evict_total";
pub const METRIC_RESPONSE_CLEAR: &str = "quill_cache_response_clear_total";

/// Cached HTTP response.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Keyed storage for rendered responses with per-entry expiry.
pub trait ResponseStore: Send + Sync {
    /// Fresh entry for `key`, if any. Expired entries are never returned.
    fn get(&self, key: &ResponseCacheKey) -> Option<CachedResponse>;

    /// Store `response` under `key` for `ttl`, replacing any previous entry.
    fn set(&self, key: ResponseCacheKey, response: CachedResponse, ttl: Duration);

    /// Drop every entry.
    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct Entry {
    response: CachedResponse,
    expires_at: Instant,
}

/// In-process LRU store. Expiry is checked lazily on read.
pub struct MemoryResponseStore {
    entries: RwLock<LruCache<ResponseCacheKey, Entry>>,
}

impl MemoryResponseStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.capacity)),
        }
    }
}

impl ResponseStore for MemoryResponseStore {
    fn get(&self, key: &ResponseCacheKey) -> Option<CachedResponse> {
        let mut entries = lock::write(&self.entries, "get");

        let fresh = match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.response.clone()),
            Some(_) => {
                entries.pop(key);
                counter!(METRIC_RESPONSE_EXPIRED).increment(1);
                None
            }
            None => None,
        };

        match fresh {
            Some(response) => {
                counter!(METRIC_RESPONSE_HIT).increment(1);
                Some(response)
            }
            None => {
                counter!(METRIC_RESPONSE_MISS).increment(1);
                None
            }
        }
    }

    fn set(&self, key: ResponseCacheKey, response: CachedResponse, ttl: Duration) {
        let entry = Entry {
            response,
            expires_at: Instant::now() + ttl,
        };

        let replaced = lock::write(&self.entries, "set").push(key.clone(), entry);
        if let Some((evicted, _)) = replaced
            && evicted != key
        {
            counter!(METRIC_RESPONSE_EVICT).increment(1);
        }
    }

    fn clear(&self) {
        lock::write(&self.entries, "clear").clear();
        counter!(METRIC_RESPONSE_CLEAR).increment(1);
    }

    fn len(&self) -> usize {
        lock::read(&self.entries, "len").len()
    }
}
