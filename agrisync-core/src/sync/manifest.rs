// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Update manifests and history records
//!
//! Wire format of a manifest (JSON):
//!
//! ```json
//! {
//!   "version": 2,
//!   "releaseDate": "2026-03-01",
//!   "updateType": "minor",
//!   "description": "New pest control entries",
//!   "contentUpdates": [
//!     { "category": "encyclopedia", "itemCount": 3, "description": "Pests" }
//!   ]
//! }
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::content::{CacheKey, ContentCategory};

/// Severity of an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    /// Must be applied as soon as possible
    Critical,
    /// Significant content additions
    Major,
    /// Routine refresh
    #[default]
    Minor,
}

/// Changes to one content category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateManifestEntry {
    /// Category that changed
    pub category: ContentCategory,
    /// Number of added or changed items
    pub item_count: u32,
    /// Human-readable summary
    #[serde(default)]
    pub description: String,
    /// Identifiers of the changed items; synthesized when omitted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item_ids: Vec<String>,
}

impl UpdateManifestEntry {
    /// Number of items this entry covers, without expanding them.
    pub fn len(&self) -> u64 {
        if self.item_ids.is_empty() {
            u64::from(self.item_count)
        } else {
            self.item_ids.len() as u64
        }
    }

    /// Returns true if the entry names no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of the items this entry covers.
    ///
    /// Uses `item_ids` when present; otherwise the authority's positional
    /// naming `{category}-{n}` for n in `1..=item_count`.
    pub fn items(&self) -> Vec<CacheKey> {
        if self.item_ids.is_empty() {
            (1..=self.item_count)
                .map(|n| CacheKey::new(self.category.clone(), format!("{}-{}", self.category, n)))
                .collect()
        } else {
            self.item_ids
                .iter()
                .map(|id| CacheKey::new(self.category.clone(), id.clone()))
                .collect()
        }
    }
}

/// Manifest served by the content authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateManifest {
    /// Content version this manifest brings the client to
    pub version: u64,
    /// Release date as published by the authority
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    /// Severity of the update
    #[serde(default)]
    pub update_type: UpdateType,
    /// Human-readable summary
    #[serde(default)]
    pub description: String,
    /// Per-category changes
    #[serde(default)]
    pub content_updates: Vec<UpdateManifestEntry>,
}

impl UpdateManifest {
    /// Upper bound on the items named by the manifest, counting duplicates.
    pub fn item_count(&self) -> u64 {
        self.content_updates
            .iter()
            .map(UpdateManifestEntry::len)
            .fold(0, u64::saturating_add)
    }

    /// Every item named by the manifest, without duplicates, in manifest order.
    pub fn items(&self) -> Vec<CacheKey> {
        let mut seen = HashSet::new();
        self.content_updates
            .iter()
            .flat_map(UpdateManifestEntry::items)
            .filter(|key| seen.insert(key.clone()))
            .collect()
    }
}

/// Record of an applied update. Immutable once appended to history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    /// Version that was applied
    pub version: u64,
    /// Release date as published by the authority
    pub release_date: Option<String>,
    /// Severity of the update
    pub update_type: UpdateType,
    /// Human-readable summary
    pub description: String,
    /// Per-category changes
    pub content_updates: Vec<UpdateManifestEntry>,
    /// Unix milliseconds when the update was applied on this device
    pub applied_at: u64,
}

impl UpdateInfo {
    /// Builds the history record for a fully applied manifest.
    pub fn from_manifest(manifest: &UpdateManifest, applied_at: u64) -> Self {
        UpdateInfo {
            version: manifest.version,
            release_date: manifest.release_date.clone(),
            update_type: manifest.update_type,
            description: manifest.description.clone(),
            content_updates: manifest.content_updates.clone(),
            applied_at,
        }
    }
}
