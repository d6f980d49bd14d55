// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Offline Engine
//!
//! Main entry point: wires storage, cache, network monitor, downloads and
//! sync together and exposes the operations the UI layer calls.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::content::{CacheKey, CacheStats, ContentCache, ContentCategory};
use crate::download::{ContentAuthority, DownloadManager};
use crate::network::{NetworkMonitor, NetworkState, SubscriptionId};
use crate::storage::{open_store, KeyValueStore, MemoryStore};
use crate::sync::{ApplyOutcome, SyncCoordinator, SyncState, UpdateInfo};

use super::config::EngineConfig;
use super::error::{EngineError, EngineResult};
use super::events::{CallbackHandler, EngineEvent, EventDispatcher, EventHandler};

/// Offline content engine.
///
/// One instance per process, constructed explicitly and shared by reference
/// (or behind an `Arc`).
///
/// # Example
///
/// ```ignore
/// use agrisync_core::api::{EngineConfig, OfflineEngine};
///
/// let engine = OfflineEngine::builder()
///     .config(EngineConfig::default().with_storage_path("/data/agrisync.db"))
///     .build()?;
///
/// if !engine.is_content_available_offline("encyclopedia", "maize") {
///     engine.download_for_offline("encyclopedia", "maize").await;
/// }
/// let page = engine.get_offline_content("encyclopedia", "maize");
///
/// if engine.check_for_updates().await? {
///     let outcome = engine.apply_updates().await?;
///     println!("{}", outcome.message);
/// }
/// ```
pub struct OfflineEngine {
    config: EngineConfig,
    network: Arc<NetworkMonitor>,
    cache: Arc<ContentCache>,
    downloads: Arc<DownloadManager>,
    sync: Arc<SyncCoordinator>,
    events: Arc<EventDispatcher>,
    network_subscription: SubscriptionId,
    persistent: bool,
}

impl OfflineEngine {
    /// Opens the engine on the configured SQLite store.
    ///
    /// If the store cannot be opened the engine runs memory-only; see
    /// [`is_persistent`](Self::is_persistent).
    pub fn open(config: EngineConfig, authority: Arc<dyn ContentAuthority>) -> EngineResult<Self> {
        let opened = open_store(&config.storage_path);
        Self::with_store(config, opened.store, authority)
    }

    /// Creates an engine backed by memory only.
    pub fn in_memory(authority: Arc<dyn ContentAuthority>) -> EngineResult<Self> {
        Self::with_store(
            EngineConfig::default(),
            Arc::new(MemoryStore::new()),
            authority,
        )
    }

    /// Creates a builder.
    pub fn builder() -> OfflineEngineBuilder {
        OfflineEngineBuilder::new()
    }

    /// Creates an engine over an existing store.
    pub fn with_store(
        config: EngineConfig,
        store: Arc<dyn KeyValueStore>,
        authority: Arc<dyn ContentAuthority>,
    ) -> EngineResult<Self> {
        Self::assemble(config, store, authority, NetworkState::Online)
    }

    fn assemble(
        config: EngineConfig,
        store: Arc<dyn KeyValueStore>,
        authority: Arc<dyn ContentAuthority>,
        initial_network: NetworkState,
    ) -> EngineResult<Self> {
        let persistent = store.is_persistent();
        let events = Arc::new(EventDispatcher::new());
        let network = Arc::new(NetworkMonitor::new(initial_network));

        let cache = Arc::new(ContentCache::open(Arc::clone(&store), config.cache_config())?);
        let downloads = Arc::new(DownloadManager::new(
            Arc::clone(&cache),
            Arc::clone(&authority),
            Arc::clone(&network),
            config.download_config(),
        ));
        let sync = Arc::new(SyncCoordinator::new(
            Arc::clone(&network),
            Arc::clone(&cache),
            Arc::clone(&downloads),
            authority,
            store,
            Arc::clone(&events),
            config.request_timeout,
        )?);

        let forward = Arc::clone(&events);
        let network_subscription = network.subscribe_fn(move |state| {
            forward.dispatch(EngineEvent::NetworkChanged { state });
        });

        let engine = OfflineEngine {
            config,
            network,
            cache,
            downloads,
            sync,
            events,
            network_subscription,
            persistent,
        };

        if let Some(interval) = engine.config.auto_sync_interval {
            engine.sync.start_auto_sync(interval)?;
        }

        tracing::info!(
            persistent,
            entries = engine.cache.stats().entry_count,
            version = engine.sync.get_sync_info().current_version,
            "offline engine ready"
        );
        Ok(engine)
    }

    // === Content ===

    /// Returns true if the item can be read without connectivity.
    pub fn is_content_available_offline(
        &self,
        category: impl Into<ContentCategory>,
        id: &str,
    ) -> bool {
        self.cache.has(category, id)
    }

    /// Downloads one item into the cache.
    ///
    /// Returns false (and logs why) on any failure, including being offline.
    pub async fn download_for_offline(&self, category: impl Into<ContentCategory>, id: &str) -> bool {
        let category = category.into();
        match self.downloads.fetch_one(category.clone(), id).await {
            Ok(()) => {
                self.events.dispatch(EngineEvent::ContentDownloaded {
                    key: CacheKey::new(category, id),
                });
                true
            }
            Err(e) => {
                tracing::warn!(category = %category, id, error = %e, "download for offline failed");
                false
            }
        }
    }

    /// Returns a cached item's payload.
    ///
    /// Missing, expired and corrupt entries all read as `None`.
    pub fn get_offline_content(&self, category: impl Into<ContentCategory>, id: &str) -> Option<Vec<u8>> {
        let category = category.into();
        match self.cache.get(category.clone(), id) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(category = %category, id, error = %e, "failed to read offline content");
                None
            }
        }
    }

    /// Writes an item directly into the cache.
    pub fn store_content(
        &self,
        category: impl Into<ContentCategory>,
        id: &str,
        payload: &[u8],
    ) -> EngineResult<()> {
        Ok(self.cache.put(category, id, payload)?)
    }

    /// Returns cache statistics.
    pub fn get_cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Removes every cached item. Sync state and history are kept.
    ///
    /// Refused with `SyncError::InProgress` while a check or apply runs.
    pub fn clear_cache(&self) -> EngineResult<()> {
        self.sync.run_exclusive(|| self.cache.clear())??;
        self.events.dispatch(EngineEvent::CacheCleared);
        Ok(())
    }

    // === Sync ===

    /// Returns the last known sync state.
    pub fn get_sync_info(&self) -> SyncState {
        self.sync.get_sync_info()
    }

    /// Asks the content service whether a newer version exists.
    pub async fn check_for_updates(&self) -> EngineResult<bool> {
        Ok(self.sync.check_for_updates().await?)
    }

    /// Downloads and applies the available update.
    pub async fn apply_updates(&self) -> EngineResult<ApplyOutcome> {
        Ok(self.sync.apply_updates().await?)
    }

    /// Downloads and applies the available update, stopping early when `cancel` fires.
    pub async fn apply_updates_with_cancel(
        &self,
        cancel: &CancellationToken,
    ) -> EngineResult<ApplyOutcome> {
        Ok(self.sync.apply_updates_with_cancel(cancel).await?)
    }

    /// Returns applied updates, newest first.
    pub fn get_update_history(&self) -> Vec<UpdateInfo> {
        self.sync.get_update_history()
    }

    /// Checks for updates every `interval_minutes`, replacing any running timer.
    pub fn start_auto_sync(&self, interval_minutes: u64) -> EngineResult<()> {
        if interval_minutes == 0 {
            return Err(EngineError::Configuration(
                "auto-sync interval must be at least one minute".to_string(),
            ));
        }
        let secs = interval_minutes.checked_mul(60).ok_or_else(|| {
            EngineError::Configuration(format!(
                "auto-sync interval of {} minutes is out of range",
                interval_minutes
            ))
        })?;
        self.start_auto_sync_every(Duration::from_secs(secs))
    }

    /// Checks for updates at an arbitrary interval.
    pub fn start_auto_sync_every(&self, interval: Duration) -> EngineResult<()> {
        Ok(self.sync.start_auto_sync(interval)?)
    }

    /// Stops periodic checks.
    pub fn stop_auto_sync(&self) {
        self.sync.stop_auto_sync();
    }

    /// Returns true while periodic checks are scheduled.
    pub fn is_auto_sync_running(&self) -> bool {
        self.sync.is_auto_sync_running()
    }

    // === Network ===

    /// Returns the network monitor.
    pub fn network(&self) -> &Arc<NetworkMonitor> {
        &self.network
    }

    /// Reports a connectivity change from the platform.
    pub fn set_network_state(&self, state: NetworkState) -> bool {
        self.network.set_state(state)
    }

    // === Events ===

    /// Adds an event handler.
    pub fn add_event_handler(&self, handler: Arc<dyn EventHandler>) {
        self.events.add_handler(handler);
    }

    /// Adds a closure as an event handler.
    pub fn on_event<F>(&self, callback: F)
    where
        F: Fn(EngineEvent) + Send + Sync + 'static,
    {
        self.events.add_handler(Arc::new(CallbackHandler::new(callback)));
    }

    // === Accessors ===

    /// Returns false if the engine runs memory-only.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the content cache.
    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    /// Returns the sync coordinator.
    pub fn sync(&self) -> &Arc<SyncCoordinator> {
        &self.sync
    }
}

impl Drop for OfflineEngine {
    fn drop(&mut self) {
        self.sync.stop_auto_sync();
        self.network.unsubscribe(self.network_subscription);
    }
}

/// Builder for creating [`OfflineEngine`] instances.
pub struct OfflineEngineBuilder {
    config: EngineConfig,
    authority: Option<Arc<dyn ContentAuthority>>,
    store: Option<Arc<dyn KeyValueStore>>,
    initial_network: NetworkState,
}

impl OfflineEngineBuilder {
    /// Creates a new builder with default configuration.
    pub fn new() -> Self {
        OfflineEngineBuilder {
            config: EngineConfig::default(),
            authority: None,
            store: None,
            initial_network: NetworkState::Online,
        }
    }

    /// Sets the configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the storage path.
    pub fn storage_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config.storage_path = path.into();
        self
    }

    /// Sets the content authority.
    ///
    /// Defaults to an HTTP client for `content_url` when the `http` feature
    /// is enabled.
    pub fn authority(mut self, authority: Arc<dyn ContentAuthority>) -> Self {
        self.authority = Some(authority);
        self
    }

    /// Uses the given store instead of opening `storage_path`.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses a memory-only store.
    pub fn in_memory(self) -> Self {
        self.store(Arc::new(MemoryStore::new()))
    }

    /// Sets the connectivity assumed until the platform reports otherwise.
    pub fn initial_network(mut self, state: NetworkState) -> Self {
        self.initial_network = state;
        self
    }

    /// Builds the engine.
    pub fn build(self) -> EngineResult<OfflineEngine> {
        let authority = match self.authority {
            Some(authority) => authority,
            None => default_authority(&self.config)?,
        };
        let store = match self.store {
            Some(store) => store,
            None => open_store(&self.config.storage_path).store,
        };
        OfflineEngine::assemble(self.config, store, authority, self.initial_network)
    }
}

impl Default for OfflineEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "http")]
fn default_authority(config: &EngineConfig) -> EngineResult<Arc<dyn ContentAuthority>> {
    let authority = crate::download::HttpAuthority::new(&config.http_config())?;
    Ok(Arc::new(authority))
}

#[cfg(not(feature = "http"))]
fn default_authority(_config: &EngineConfig) -> EngineResult<Arc<dyn ContentAuthority>> {
    Err(EngineError::Configuration(
        "no content authority set and the http feature is disabled".to_string(),
    ))
}
