//! Configuration for content downloads

use std::time::Duration;

use super::retry::RetryPolicy;

/// Default cap on the items one manifest may name
pub const DEFAULT_MAX_MANIFEST_ITEMS: u64 = 100_000;

/// Configuration for the download manager
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Worker pool size for batch fetches
    pub max_concurrent_downloads: usize,

    /// Timeout applied to each remote request
    pub request_timeout: Duration,

    /// Retry policy for batch items
    pub retry: RetryPolicy,

    /// Most items a single manifest may name
    pub max_manifest_items: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 4,
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            max_manifest_items: DEFAULT_MAX_MANIFEST_ITEMS,
        }
    }
}
