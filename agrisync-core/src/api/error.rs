// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! API Error Types
//!
//! Unified error type for the engine facade.

use thiserror::Error;

use crate::content::CacheError;
use crate::download::{DownloadError, FetchError};
use crate::storage::StorageError;
use crate::sync::SyncError;

/// Unified error type for engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Cache operation failed.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Download failed.
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Remote request failed.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Sync operation failed.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    /// Returns true if the operation failed only because the device is offline.
    pub fn is_offline(&self) -> bool {
        matches!(
            self,
            EngineError::Download(DownloadError::Offline) | EngineError::Sync(SyncError::Offline)
        )
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
