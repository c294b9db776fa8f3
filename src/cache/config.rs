//! Cache configuration.
//!
//! Built from the `[cache]` section of the deployment settings.

use std::{num::NonZeroUsize, time::Duration};

const DEFAULT_TTL: Duration = Duration::from_secs(20);
const DEFAULT_KEY_PREFIX: &str = "index_page";
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Serve and populate the response cache.
    pub enabled: bool,
    /// Lifetime of a stored response.
    pub ttl: Duration,
    /// Namespace prepended to every key.
    pub key_prefix: String,
    /// Maximum number of stored responses before LRU eviction.
    pub capacity: NonZeroUsize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: DEFAULT_TTL,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            capacity: NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ttl: settings.ttl,
            key_prefix: settings.key_prefix.clone(),
            capacity: settings.capacity,
        }
    }
}

impl CacheConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cache_for_twenty_seconds() {
        let config = CacheConfig::default();
        assert!(config.is_enabled());
        assert_eq!(config.ttl, Duration::from_secs(20));
        assert_eq!(config.key_prefix, "index_page");
        assert_eq!(config.capacity.get(), 256);
    }
}
