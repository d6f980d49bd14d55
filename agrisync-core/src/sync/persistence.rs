// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Durable records of the sync coordinator.

use std::sync::Arc;

use super::manifest::{UpdateInfo, UpdateManifest};
use super::state::SyncState;
use crate::storage::{KeyValueStore, StorageError};

const STATE_KEY: &str = "sync:state";
const PENDING_KEY: &str = "sync:pending";
const HISTORY_PREFIX: &str = "history:";

/// Typed access to the sync namespace of the key/value store.
pub(crate) struct SyncStore {
    store: Arc<dyn KeyValueStore>,
}

impl SyncStore {
    pub(crate) fn new(store: Arc<dyn KeyValueStore>) -> Self {
        SyncStore { store }
    }

    pub(crate) fn load_state(&self) -> Result<Option<SyncState>, StorageError> {
        match self.store.get(STATE_KEY)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn save_state(&self, state: &SyncState) -> Result<(), StorageError> {
        self.store.put(STATE_KEY, &serde_json::to_vec(state)?)
    }

    pub(crate) fn load_pending(&self) -> Result<Option<UpdateManifest>, StorageError> {
        match self.store.get(PENDING_KEY)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn save_pending(&self, manifest: &UpdateManifest) -> Result<(), StorageError> {
        self.store.put(PENDING_KEY, &serde_json::to_vec(manifest)?)
    }

    pub(crate) fn clear_pending(&self) -> Result<(), StorageError> {
        self.store.delete(PENDING_KEY)?;
        Ok(())
    }

    /// Appends a history record.
    ///
    /// Records are keyed by version, so re-applying the same version after a
    /// failed commit overwrites instead of duplicating.
    pub(crate) fn append_history(&self, info: &UpdateInfo) -> Result<(), StorageError> {
        let key = format!("{}{:020}", HISTORY_PREFIX, info.version);
        self.store.put(&key, &serde_json::to_vec(info)?)
    }

    /// Loads history up to and including `max_version`, newest first.
    ///
    /// Unreadable records are skipped with a warning.
    pub(crate) fn load_history(&self, max_version: u64) -> Result<Vec<UpdateInfo>, StorageError> {
        let mut history: Vec<UpdateInfo> = self
            .store
            .list_by_prefix(HISTORY_PREFIX)?
            .into_iter()
            .filter_map(|(key, bytes)| match serde_json::from_slice::<UpdateInfo>(&bytes) {
                Ok(info) => Some(info),
                Err(e) => {
                    tracing::warn!(%key, error = %e, "skipping unreadable history record");
                    None
                }
            })
            .filter(|info| info.version <= max_version)
            .collect();
        history.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(history)
    }
}
