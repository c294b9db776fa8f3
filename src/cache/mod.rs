//! Response cache for the global feed.
//!
//! Rendered `GET /` responses are stored per (page, viewer) for a fixed TTL
//! and served without touching the feed service until they expire or an
//! operator clears the store.
//!
//! ```toml
//! [cache]
//! enabled = true
//! ttl_seconds = 20
//! key_prefix = "index_page"
//! capacity = 256
//! ```

mod config;
mod keys;
mod lock;
mod middleware;
mod store;

pub use config::CacheConfig;
pub use keys::ResponseCacheKey;
pub use middleware::{CacheState, response_cache_layer};
pub use store::{
    CachedResponse, METRIC_RESPONSE_CLEAR, METRIC_RESPONSE_EVICT, METRIC_RESPONSE_EXPIRED,
    METRIC_RESPONSE_HIT, METRIC_RESPONSE_MISS, MemoryResponseStore, ResponseStore,
};
