//! Configuration for the offline content cache

use std::time::Duration;

/// Default byte ceiling for cached payloads (50 MB)
pub const DEFAULT_MAX_CACHE_BYTES: u64 = 50 * 1024 * 1024;

/// Configuration for the content cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Total payload bytes the cache may hold
    pub max_cache_bytes: u64,

    /// Expiry applied to entries written without an explicit TTL
    pub default_ttl: Option<Duration>,

    /// Number of write stripes (distinct keys in different stripes never block each other)
    pub write_stripes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_bytes: DEFAULT_MAX_CACHE_BYTES,
            default_ttl: None,
            write_stripes: 16,
        }
    }
}

impl CacheConfig {
    /// Set the byte ceiling
    pub fn with_max_bytes(mut self, max_cache_bytes: u64) -> Self {
        self.max_cache_bytes = max_cache_bytes;
        self
    }

    /// Expire entries after `ttl` unless a write says otherwise
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }
}
