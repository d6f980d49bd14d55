// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Download manager.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use super::authority::{ContentAuthority, FetchError};
use super::config::DownloadConfig;
use crate::content::{CacheKey, ContentCache, ContentCategory};
use crate::network::NetworkMonitor;

type SharedFetch = Arc<OnceCell<Result<(), DownloadError>>>;

/// Result of a batch fetch.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Items written into the cache.
    pub succeeded: Vec<CacheKey>,
    /// Items that failed after exhausting their retries.
    pub failed: Vec<(CacheKey, DownloadError)>,
    /// Items never started because the batch was cancelled.
    pub skipped: Vec<CacheKey>,
}

impl BatchOutcome {
    /// Returns true if every item succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    /// Total number of items in the batch.
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.skipped.len()
    }
}

enum ItemResult {
    Succeeded,
    Failed(DownloadError),
    Skipped,
}

/// Fetches content items from the authority and writes them into the cache.
///
/// Concurrent requests for the same key share one remote call. Batches run
/// over a fixed-size worker pool; one item's failure never aborts the rest.
pub struct DownloadManager {
    cache: Arc<ContentCache>,
    authority: Arc<dyn ContentAuthority>,
    network: Arc<NetworkMonitor>,
    config: DownloadConfig,
    in_flight: Mutex<HashMap<CacheKey, SharedFetch>>,
}

impl DownloadManager {
    /// Creates a download manager.
    pub fn new(
        cache: Arc<ContentCache>,
        authority: Arc<dyn ContentAuthority>,
        network: Arc<NetworkMonitor>,
        config: DownloadConfig,
    ) -> Self {
        DownloadManager {
            cache,
            authority,
            network,
            config,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Fetches one item and writes it into the cache.
    ///
    /// Fails fast with [`DownloadError::Offline`] when disconnected. If a
    /// fetch for the same key is already running, waits for it and returns
    /// its result instead of issuing a second request.
    pub async fn fetch_one(
        &self,
        category: impl Into<ContentCategory>,
        id: &str,
    ) -> Result<(), DownloadError> {
        self.fetch_key(&CacheKey::new(category, id)).await
    }

    async fn fetch_key(&self, key: &CacheKey) -> Result<(), DownloadError> {
        if !self.network.is_online() {
            return Err(DownloadError::Offline);
        }

        let shared = Arc::clone(
            self.in_flight
                .lock()
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        );

        let result = shared.get_or_init(|| self.materialize(key)).await.clone();

        // Later callers must start a fresh fetch rather than reuse this result.
        let mut in_flight = self.in_flight.lock();
        if in_flight
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, &shared))
        {
            in_flight.remove(key);
        }

        result
    }

    async fn materialize(&self, key: &CacheKey) -> Result<(), DownloadError> {
        let timeout = self.config.request_timeout;
        let payload = tokio::time::timeout(timeout, self.authority.fetch_item(&key.category, &key.id))
            .await
            .map_err(|_| DownloadError::Fetch(FetchError::Timeout(timeout)))??;

        self.cache
            .put(key.category.clone(), &key.id, &payload)
            .map_err(|e| DownloadError::Storage(e.to_string()))?;

        tracing::debug!(key = %key, bytes = payload.len(), "materialized content item");
        Ok(())
    }

    /// Fetches a batch of items with bounded concurrency.
    pub async fn fetch_many(&self, items: Vec<CacheKey>) -> BatchOutcome {
        self.fetch_many_with_cancel(items, &CancellationToken::new())
            .await
    }

    /// Fetches a batch of items, stopping early when `cancel` fires.
    ///
    /// Duplicate keys are fetched once. Each item is retried with
    /// exponential backoff on transient errors. After cancellation, running
    /// fetches are allowed to finish but no new fetch or retry starts;
    /// unstarted items are reported as skipped.
    pub async fn fetch_many_with_cancel(
        &self,
        items: Vec<CacheKey>,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let mut seen = HashSet::new();
        let items: Vec<CacheKey> = items.into_iter().filter(|k| seen.insert(k.clone())).collect();
        let workers = self.config.max_concurrent_downloads.max(1);

        let results: Vec<(CacheKey, ItemResult)> = stream::iter(items)
            .map(|key| async move {
                if cancel.is_cancelled() {
                    return (key, ItemResult::Skipped);
                }
                let result = match self.fetch_with_retry(&key, cancel).await {
                    Ok(()) => ItemResult::Succeeded,
                    Err(e) => ItemResult::Failed(e),
                };
                (key, result)
            })
            .buffer_unordered(workers)
            .collect()
            .await;

        let mut outcome = BatchOutcome::default();
        for (key, result) in results {
            match result {
                ItemResult::Succeeded => outcome.succeeded.push(key),
                ItemResult::Failed(e) => outcome.failed.push((key, e)),
                ItemResult::Skipped => outcome.skipped.push(key),
            }
        }

        tracing::info!(
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            skipped = outcome.skipped.len(),
            "batch download finished"
        );
        outcome
    }

    async fn fetch_with_retry(
        &self,
        key: &CacheKey,
        cancel: &CancellationToken,
    ) -> Result<(), DownloadError> {
        let policy = &self.config.retry;
        let mut retry = 0;

        loop {
            let error = match self.fetch_key(key).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if !error.is_retryable() || retry >= policy.max_retries {
                tracing::warn!(key = %key, attempts = retry + 1, error = %error, "giving up on item");
                return Err(error);
            }

            retry += 1;
            let delay = policy.delay_for(retry);
            tracing::debug!(key = %key, retry, ?delay, error = %error, "retrying item");

            tokio::select! {
                _ = cancel.cancelled() => return Err(error),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Returns the number of distinct keys currently being fetched.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Returns the download configuration.
    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }
}

/// Errors that can occur while materializing content
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    /// No connectivity
    #[error("offline")]
    Offline,

    /// The authority request failed
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The fetched payload could not be written into the cache
    #[error("storage error: {0}")]
    Storage(String),
}

impl DownloadError {
    /// Returns true if retrying the same item may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Fetch(e) => e.is_transient(),
            DownloadError::Offline | DownloadError::Storage(_) => false,
        }
    }
}
