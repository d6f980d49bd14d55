// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync State
//!
//! The persisted version state, the coordinator's phase machine, and the
//! results and errors of sync operations.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::download::FetchError;
use crate::storage::StorageError;

/// Sync error types.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The operation needs connectivity.
    #[error("offline")]
    Offline,

    /// Another check or apply is running.
    #[error("a sync operation is already in progress")]
    InProgress,

    /// The manifest could not be fetched.
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The authority reported a version older than the local one.
    #[error("Version conflict: local {local}, remote {remote}")]
    VersionConflict { local: u64, remote: u64 },

    /// Auto-sync needs a tokio runtime to spawn its timer on.
    #[error("no async runtime available")]
    NoRuntime,

    /// The auto-sync interval cannot be scheduled.
    #[error("auto-sync interval {0:?} is out of range")]
    InvalidInterval(Duration),
}

/// Process-wide version state, persisted across restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Content version fully applied on this device. Never decreases.
    pub current_version: u64,
    /// Unix milliseconds of the last successful check or apply.
    pub last_sync_timestamp: Option<u64>,
    /// Whether the authority has offered a newer version.
    pub update_available: bool,
    /// The offered version, if any.
    pub available_version: Option<u64>,
}

/// Phase of the sync coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    /// Nothing running.
    #[default]
    Idle,
    /// Fetching the manifest.
    Checking,
    /// Materializing the items of an update.
    Downloading,
    /// Committing the new version and history.
    Applying,
    /// An operation failed; returns to idle once reported.
    Error,
}

impl SyncPhase {
    /// Returns true while an operation is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncPhase::Checking | SyncPhase::Downloading | SyncPhase::Applying
        )
    }
}

/// Result of applying an update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    /// True only if every item was materialized and the version advanced.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    /// Items that already existed locally and were refreshed.
    pub updated_items: usize,
    /// Items that did not exist locally before.
    pub new_items: usize,
    /// Items that failed or were not started.
    pub failed_items: usize,
}
