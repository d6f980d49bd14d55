// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Engine Configuration
//!
//! Durations are (de)serialized as fractional seconds so hosts can ship the
//! configuration as JSON:
//!
//! ```json
//! { "storagePath": "/data/agrisync.db", "maxCacheBytes": 104857600,
//!   "retryBaseDelay": 0.25, "autoSyncInterval": 3600 }
//! ```
//!
//! Missing fields take their defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::content::{CacheConfig, DEFAULT_MAX_CACHE_BYTES};
use crate::download::{DownloadConfig, RetryPolicy, DEFAULT_MAX_MANIFEST_ITEMS};

/// Configuration for [`OfflineEngine`](super::OfflineEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// SQLite database file.
    pub storage_path: PathBuf,

    /// Total payload bytes the cache may hold.
    pub max_cache_bytes: u64,

    /// Expiry for entries written without an explicit TTL.
    #[serde(with = "option_secs")]
    pub default_ttl: Option<Duration>,

    /// Worker pool size for batch downloads.
    pub max_concurrent_downloads: usize,

    /// Retries after the first attempt of an item fetch.
    pub max_retries: u32,

    #[serde(with = "secs")]
    pub retry_base_delay: Duration,

    #[serde(with = "secs")]
    pub retry_max_delay: Duration,

    /// Timeout for a single remote request.
    #[serde(with = "secs")]
    pub request_timeout: Duration,

    /// Started automatically by the engine when set.
    #[serde(with = "option_secs")]
    pub auto_sync_interval: Option<Duration>,

    /// Base URL of the content service.
    pub content_url: String,

    /// Proxy URL (http, https or socks5).
    pub proxy_url: Option<String>,

    /// User agent for HTTP requests.
    pub user_agent: Option<String>,

    /// Most items a single update manifest may name.
    pub max_manifest_items: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            storage_path: PathBuf::from("./agrisync.db"),
            max_cache_bytes: DEFAULT_MAX_CACHE_BYTES,
            default_ttl: None,
            max_concurrent_downloads: 4,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            auto_sync_interval: None,
            content_url: "https://content.agrisync.app/v1".to_string(),
            proxy_url: None,
            user_agent: None,
            max_manifest_items: DEFAULT_MAX_MANIFEST_ITEMS,
        }
    }
}

impl EngineConfig {
    /// Sets the storage path.
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = path.into();
        self
    }

    /// Sets the cache byte ceiling.
    pub fn with_max_cache_bytes(mut self, bytes: u64) -> Self {
        self.max_cache_bytes = bytes;
        self
    }

    /// Sets the default entry TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Sets the batch download worker count.
    pub fn with_max_concurrent_downloads(mut self, workers: usize) -> Self {
        self.max_concurrent_downloads = workers;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self.retry_max_delay = max_delay;
        self
    }

    /// Sets the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Starts auto-sync at this interval when the engine opens.
    pub fn with_auto_sync_interval(mut self, interval: Duration) -> Self {
        self.auto_sync_interval = Some(interval);
        self
    }

    /// Sets the content service base URL.
    pub fn with_content_url(mut self, url: impl Into<String>) -> Self {
        self.content_url = url.into();
        self
    }

    /// Caps the number of items an update manifest may name.
    pub fn with_max_manifest_items(mut self, max_items: u64) -> Self {
        self.max_manifest_items = max_items;
        self
    }

    /// Routes HTTP requests through a proxy.
    pub fn with_proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.proxy_url = Some(proxy_url.into());
        self
    }

    /// Parses a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Cache settings.
    pub fn cache_config(&self) -> CacheConfig {
        let config = CacheConfig::default().with_max_bytes(self.max_cache_bytes);
        match self.default_ttl {
            Some(ttl) => config.with_default_ttl(ttl),
            None => config,
        }
    }

    /// Download settings.
    pub fn download_config(&self) -> DownloadConfig {
        DownloadConfig {
            max_concurrent_downloads: self.max_concurrent_downloads.max(1),
            request_timeout: self.request_timeout,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                base_delay: self.retry_base_delay,
                max_delay: self.retry_max_delay,
            },
            max_manifest_items: self.max_manifest_items,
        }
    }

    /// HTTP authority settings.
    #[cfg(feature = "http")]
    pub fn http_config(&self) -> crate::download::HttpAuthorityConfig {
        let defaults = crate::download::HttpAuthorityConfig::default();
        crate::download::HttpAuthorityConfig {
            base_url: self.content_url.clone(),
            timeout: self.request_timeout,
            proxy_url: self.proxy_url.clone(),
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
            ..defaults
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod option_secs {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}
