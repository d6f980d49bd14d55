// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync Coordinator
//!
//! Negotiates content versions with the authority and drives downloads:
//! - compares the local version with the authority's manifest
//! - materializes every item of a newer manifest through the download manager
//! - advances the version and appends history only when every item succeeded
//! - optionally polls on a timer
//!
//! At most one check or apply runs at a time; a second concurrent call fails
//! fast with [`SyncError::InProgress`].

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::manifest::{UpdateInfo, UpdateManifest};
use super::persistence::SyncStore;
use super::state::{ApplyOutcome, SyncError, SyncPhase, SyncState};
use crate::api::events::{EngineEvent, EventDispatcher};
use crate::content::{CacheKey, ContentCache};
use crate::download::{ContentAuthority, DownloadManager, FetchError};
use crate::network::NetworkMonitor;
use crate::now_millis;
use crate::storage::KeyValueStore;

/// Running auto-sync timer.
struct AutoSyncHandle {
    token: CancellationToken,
    interval: Duration,
}

impl Drop for AutoSyncHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Coordinates version checks and update application.
pub struct SyncCoordinator {
    network: Arc<NetworkMonitor>,
    cache: Arc<ContentCache>,
    downloads: Arc<DownloadManager>,
    authority: Arc<dyn ContentAuthority>,
    store: SyncStore,
    events: Arc<EventDispatcher>,
    manifest_timeout: Duration,
    state: RwLock<SyncState>,
    phase: RwLock<SyncPhase>,
    pending: Mutex<Option<UpdateManifest>>,
    history: RwLock<Vec<UpdateInfo>>,
    operation: tokio::sync::Mutex<()>,
    auto_sync: Mutex<Option<AutoSyncHandle>>,
}

impl SyncCoordinator {
    /// Creates a coordinator, restoring persisted state, pending manifest and history.
    pub fn new(
        network: Arc<NetworkMonitor>,
        cache: Arc<ContentCache>,
        downloads: Arc<DownloadManager>,
        authority: Arc<dyn ContentAuthority>,
        store: Arc<dyn KeyValueStore>,
        events: Arc<EventDispatcher>,
        manifest_timeout: Duration,
    ) -> Result<Self, SyncError> {
        let store = SyncStore::new(store);
        let state = store.load_state()?.unwrap_or_default();

        // A pending manifest at or below the current version was already applied.
        let pending = store
            .load_pending()?
            .filter(|m| m.version > state.current_version);
        let history = store.load_history(state.current_version)?;

        tracing::debug!(
            current_version = state.current_version,
            update_available = state.update_available,
            history = history.len(),
            "sync state restored"
        );

        Ok(SyncCoordinator {
            network,
            cache,
            downloads,
            authority,
            store,
            events,
            manifest_timeout,
            state: RwLock::new(state),
            phase: RwLock::new(SyncPhase::Idle),
            pending: Mutex::new(pending),
            history: RwLock::new(history),
            operation: tokio::sync::Mutex::new(()),
            auto_sync: Mutex::new(None),
        })
    }

    /// Returns the last known sync state. Never blocks on I/O.
    pub fn get_sync_info(&self) -> SyncState {
        self.state.read().clone()
    }

    /// Returns the current phase.
    pub fn phase(&self) -> SyncPhase {
        *self.phase.read()
    }

    /// Returns applied updates, newest first.
    pub fn get_update_history(&self) -> Vec<UpdateInfo> {
        self.history.read().clone()
    }

    /// Returns the manifest of the available-but-unapplied update, if any.
    pub fn pending_manifest(&self) -> Option<UpdateManifest> {
        self.pending.lock().clone()
    }

    /// Runs `f` while holding the operation lock, so no check or apply
    /// overlaps it.
    ///
    /// Fails with [`SyncError::InProgress`] instead of waiting.
    pub fn run_exclusive<T>(&self, f: impl FnOnce() -> T) -> Result<T, SyncError> {
        let _operation = self
            .operation
            .try_lock()
            .map_err(|_| SyncError::InProgress)?;
        Ok(f())
    }

    /// Asks the authority whether a newer version exists.
    ///
    /// Performs one manifest round trip and downloads nothing. Returns true
    /// if an update is available.
    pub async fn check_for_updates(&self) -> Result<bool, SyncError> {
        if !self.network.is_online() {
            return Err(SyncError::Offline);
        }
        let _operation = self
            .operation
            .try_lock()
            .map_err(|_| SyncError::InProgress)?;

        self.check_locked().await
    }

    async fn check_locked(&self) -> Result<bool, SyncError> {
        self.set_phase(SyncPhase::Checking);

        let current = self.state.read().current_version;
        let result = match self.fetch_manifest(current).await {
            Ok(manifest) => self.record_manifest(manifest),
            Err(e) => Err(e),
        };

        match result {
            Ok(available) => {
                self.set_phase(SyncPhase::Idle);
                Ok(available)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    async fn fetch_manifest(&self, current: u64) -> Result<UpdateManifest, SyncError> {
        let timeout = self.manifest_timeout;
        let manifest = tokio::time::timeout(timeout, self.authority.fetch_manifest(current))
            .await
            .map_err(|_| FetchError::Timeout(timeout))??;
        Ok(manifest)
    }

    /// Compares a fetched manifest with local state and persists the outcome.
    fn record_manifest(&self, manifest: UpdateManifest) -> Result<bool, SyncError> {
        let max_items = self.downloads.config().max_manifest_items;
        let items = manifest.item_count();
        if items > max_items {
            tracing::warn!(
                version = manifest.version,
                items,
                max_items,
                "rejecting oversized manifest"
            );
            return Err(FetchError::InvalidResponse(format!(
                "manifest {} names {} items, limit is {}",
                manifest.version, items, max_items
            ))
            .into());
        }

        let mut next = self.state.read().clone();
        next.last_sync_timestamp = Some(now_millis());

        if manifest.version > next.current_version {
            if let Some(previous) = next.available_version {
                if manifest.version < previous {
                    tracing::warn!(
                        previous,
                        offered = manifest.version,
                        "authority withdrew a previously offered version"
                    );
                }
            }

            tracing::info!(
                current = next.current_version,
                available = manifest.version,
                "content update available"
            );
            next.update_available = true;
            next.available_version = Some(manifest.version);
            self.store.save_pending(&manifest)?;
            self.commit_state(next)?;
            *self.pending.lock() = Some(manifest);
            return Ok(true);
        }

        if manifest.version < next.current_version {
            let conflict = SyncError::VersionConflict {
                local: next.current_version,
                remote: manifest.version,
            };
            tracing::warn!(error = %conflict, "ignoring manifest older than local content");
        }

        next.update_available = false;
        next.available_version = None;
        self.store.clear_pending()?;
        self.commit_state(next)?;
        self.pending.lock().take();
        Ok(false)
    }

    /// Downloads and applies the available update.
    pub async fn apply_updates(&self) -> Result<ApplyOutcome, SyncError> {
        self.apply_updates_with_cancel(&CancellationToken::new())
            .await
    }

    /// Downloads and applies the available update, stopping early if `cancel` fires.
    ///
    /// Checks first when no update is pending. The version advances to exactly
    /// the manifest's version only if every item was materialized; otherwise
    /// the outcome reports `success = false` and the update stays available.
    pub async fn apply_updates_with_cancel(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ApplyOutcome, SyncError> {
        if !self.network.is_online() {
            return Err(SyncError::Offline);
        }
        let _operation = self
            .operation
            .try_lock()
            .map_err(|_| SyncError::InProgress)?;

        let pending = self.pending.lock().clone();
        let manifest = match pending {
            Some(manifest) => manifest,
            None => {
                self.check_locked().await?;
                let checked = self.pending.lock().clone();
                match checked {
                    Some(manifest) => manifest,
                    None => return Ok(self.up_to_date()),
                }
            }
        };

        self.set_phase(SyncPhase::Downloading);

        let items = manifest.items();
        let existing: HashSet<CacheKey> = items
            .iter()
            .filter(|key| self.cache.contains_key(key))
            .cloned()
            .collect();

        let batch = self
            .downloads
            .fetch_many_with_cancel(items, cancel)
            .await;

        let updated_items = batch
            .succeeded
            .iter()
            .filter(|key| existing.contains(*key))
            .count();
        let new_items = batch.succeeded.len() - updated_items;
        let failed_items = batch.failed.len() + batch.skipped.len();

        if !batch.is_complete() {
            let message = if batch.skipped.is_empty() {
                format!(
                    "Update to version {} incomplete: {} of {} items downloaded, {} failed",
                    manifest.version,
                    batch.succeeded.len(),
                    batch.total(),
                    batch.failed.len()
                )
            } else {
                format!(
                    "Update to version {} cancelled: {} of {} items downloaded, {} failed, {} not started",
                    manifest.version,
                    batch.succeeded.len(),
                    batch.total(),
                    batch.failed.len(),
                    batch.skipped.len()
                )
            };
            tracing::warn!(version = manifest.version, %message, "update not applied");

            self.set_phase(SyncPhase::Idle);
            self.events.dispatch(EngineEvent::UpdateIncomplete {
                version: manifest.version,
                message: message.clone(),
            });
            return Ok(ApplyOutcome {
                success: false,
                message,
                updated_items,
                new_items,
                failed_items,
            });
        }

        self.set_phase(SyncPhase::Applying);
        if let Err(e) = self.commit_update(&manifest) {
            self.fail(&e);
            return Err(e);
        }
        self.set_phase(SyncPhase::Idle);

        tracing::info!(
            version = manifest.version,
            new_items,
            updated_items,
            "content update applied"
        );
        self.events.dispatch(EngineEvent::UpdateApplied {
            version: manifest.version,
            new_items,
            updated_items,
        });

        Ok(ApplyOutcome {
            success: true,
            message: format!(
                "Updated to version {}: {} new, {} updated",
                manifest.version, new_items, updated_items
            ),
            updated_items,
            new_items,
            failed_items: 0,
        })
    }

    /// Commits a fully downloaded manifest: history, then version.
    fn commit_update(&self, manifest: &UpdateManifest) -> Result<(), SyncError> {
        let now = now_millis();
        let info = UpdateInfo::from_manifest(manifest, now);
        self.store.append_history(&info)?;

        let mut next = self.state.read().clone();
        next.current_version = next.current_version.max(manifest.version);
        next.last_sync_timestamp = Some(now);
        next.update_available = false;
        next.available_version = None;
        self.commit_state(next)?;

        self.pending.lock().take();
        if let Err(e) = self.store.clear_pending() {
            // Ignored at next start: the record's version is no longer ahead.
            tracing::warn!(error = %e, "failed to clear applied manifest");
        }
        self.history.write().insert(0, info);
        Ok(())
    }

    /// Persists `next` and then publishes it.
    fn commit_state(&self, next: SyncState) -> Result<(), SyncError> {
        debug_assert!(next.current_version >= self.state.read().current_version);
        self.store.save_state(&next)?;
        *self.state.write() = next;
        Ok(())
    }

    fn up_to_date(&self) -> ApplyOutcome {
        ApplyOutcome {
            success: true,
            message: format!(
                "Already up to date (version {})",
                self.state.read().current_version
            ),
            ..Default::default()
        }
    }

    fn set_phase(&self, phase: SyncPhase) {
        let previous = std::mem::replace(&mut *self.phase.write(), phase);
        if previous != phase {
            tracing::debug!(?previous, ?phase, "sync phase changed");
            self.events.dispatch(EngineEvent::SyncPhaseChanged { phase });
        }
    }

    fn fail(&self, error: &SyncError) {
        tracing::warn!(%error, "sync operation failed");
        self.set_phase(SyncPhase::Error);
        self.events.dispatch(EngineEvent::SyncFailed {
            message: error.to_string(),
        });
        self.set_phase(SyncPhase::Idle);
    }

    // === Auto Sync ===

    /// Starts (or restarts) periodic update checks.
    ///
    /// A running timer is cancelled first, so intervals never overlap. Each
    /// tick runs [`check_for_updates`](Self::check_for_updates) and, when an
    /// update is available, dispatches [`EngineEvent::UpdateAvailable`]. Nothing
    /// is applied automatically. Must be called from within a tokio runtime.
    pub fn start_auto_sync(self: &Arc<Self>, interval: Duration) -> Result<(), SyncError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        let interval = interval.max(Duration::from_secs(1));
        let first_tick = Instant::now()
            .checked_add(interval)
            .ok_or(SyncError::InvalidInterval(interval))?;

        let mut slot = self.auto_sync.lock();
        if let Some(previous) = slot.take() {
            tracing::debug!(interval = ?previous.interval, "replacing auto-sync timer");
        }

        let token = CancellationToken::new();
        let task_token = token.clone();
        let coordinator: Weak<SyncCoordinator> = Arc::downgrade(self);

        runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(coordinator) = coordinator.upgrade() else {
                    break;
                };
                coordinator.auto_sync_tick().await;
            }
        });

        *slot = Some(AutoSyncHandle { token, interval });
        tracing::info!(?interval, "auto-sync started");
        Ok(())
    }

    /// Stops periodic checks. Safe to call when not running.
    pub fn stop_auto_sync(&self) {
        if self.auto_sync.lock().take().is_some() {
            tracing::info!("auto-sync stopped");
        }
    }

    /// Returns true while a timer is scheduled.
    pub fn is_auto_sync_running(&self) -> bool {
        self.auto_sync.lock().is_some()
    }

    /// Returns the running timer's interval, if any.
    pub fn auto_sync_interval(&self) -> Option<Duration> {
        self.auto_sync.lock().as_ref().map(|h| h.interval)
    }

    async fn auto_sync_tick(&self) {
        if !self.network.is_online() {
            tracing::debug!("auto-sync tick skipped while offline");
            return;
        }

        match self.check_for_updates().await {
            Ok(true) => {
                let available = self.state.read().available_version;
                if let Some(version) = available {
                    self.events
                        .dispatch(EngineEvent::UpdateAvailable { version });
                }
            }
            Ok(false) => tracing::debug!("auto-sync: content up to date"),
            Err(SyncError::InProgress) => {
                tracing::debug!("auto-sync tick skipped, operation in progress")
            }
            Err(e) => tracing::warn!(error = %e, "auto-sync check failed"),
        }
    }
}
