// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Remote content authority interface.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::content::ContentCategory;
use crate::sync::UpdateManifest;

/// The remote source of truth for manifests and item payloads.
///
/// Implementations only move bytes; timeouts, retries and caching are
/// applied by the engine around them.
#[async_trait]
pub trait ContentAuthority: Send + Sync {
    /// Fetches the current manifest. `current_version` lets the authority
    /// answer with a delta relative to what the client already has.
    async fn fetch_manifest(&self, current_version: u64) -> Result<UpdateManifest, FetchError>;

    /// Fetches the opaque payload of one item.
    async fn fetch_item(&self, category: &ContentCategory, id: &str)
        -> Result<Vec<u8>, FetchError>;
}

/// Errors that can occur while talking to the content authority
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// HTTP error with status code
    #[error("HTTP error: {0}")]
    HttpError(u16),

    /// Network/request error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The request did not complete in time
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The authority has no such item
    #[error("Not found: {0}")]
    NotFound(String),

    /// Content too large
    #[error("Content too large: {size} bytes (max {max})")]
    TooLarge {
        /// Actual size in bytes
        size: u64,
        /// Maximum allowed size in bytes
        max: u64,
    },

    /// Response could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl FetchError {
    /// Returns true if trying again later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::HttpError(status) => *status == 408 || *status == 429 || *status >= 500,
            FetchError::NetworkError(_) | FetchError::Timeout(_) => true,
            FetchError::NotFound(_) | FetchError::TooLarge { .. } | FetchError::InvalidResponse(_) => {
                false
            }
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::InvalidResponse(err.to_string())
    }
}
