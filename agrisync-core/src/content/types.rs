// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Content type definitions for the offline cache
//!
//! These types describe what the cache stores and how it is keyed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Prefix of every cache record in the key/value store.
pub(crate) const CACHE_KEY_PREFIX: &str = "cache:";

/// Category of offline content.
///
/// Unknown categories from the content authority are kept verbatim in
/// [`ContentCategory::Other`] so new server-side categories do not break
/// older clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentCategory {
    /// Crop and livestock encyclopedia entries
    Encyclopedia,
    /// Marketplace listings
    Marketplace,
    /// Weather bulletins
    Weather,
    /// Expert consultations
    Consultations,
    /// Forum threads
    Forum,
    /// Farm log entries
    Logs,
    /// Any category this build does not know about
    Other(String),
}

impl ContentCategory {
    /// Get the canonical string name for this category
    pub fn as_str(&self) -> &str {
        match self {
            ContentCategory::Encyclopedia => "encyclopedia",
            ContentCategory::Marketplace => "marketplace",
            ContentCategory::Weather => "weather",
            ContentCategory::Consultations => "consultations",
            ContentCategory::Forum => "forum",
            ContentCategory::Logs => "logs",
            ContentCategory::Other(name) => name,
        }
    }
}

impl From<&str> for ContentCategory {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "encyclopedia" => ContentCategory::Encyclopedia,
            "marketplace" => ContentCategory::Marketplace,
            "weather" => ContentCategory::Weather,
            "consultations" => ContentCategory::Consultations,
            "forum" => ContentCategory::Forum,
            "logs" => ContentCategory::Logs,
            other => ContentCategory::Other(other.to_string()),
        }
    }
}

impl From<String> for ContentCategory {
    fn from(value: String) -> Self {
        ContentCategory::from(value.as_str())
    }
}

impl From<ContentCategory> for String {
    fn from(value: ContentCategory) -> Self {
        value.as_str().to_string()
    }
}

impl FromStr for ContentCategory {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ContentCategory::from(s))
    }
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a cache entry: `(category, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    /// Content category
    pub category: ContentCategory,
    /// Identifier, unique within the category
    pub id: String,
}

impl CacheKey {
    /// Creates a key.
    pub fn new(category: impl Into<ContentCategory>, id: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            id: id.into(),
        }
    }

    /// Key under which the entry is persisted.
    pub fn storage_key(&self) -> String {
        format!("{}{}", CACHE_KEY_PREFIX, self)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.id)
    }
}

/// A materialized content entry as persisted by the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Content category
    pub category: ContentCategory,
    /// Identifier within the category
    pub id: String,
    /// Opaque serialized content
    pub payload: Vec<u8>,
    /// Payload size in bytes
    pub size_bytes: u64,
    /// Unix milliseconds when the entry was first stored
    pub created_at: u64,
    /// Unix milliseconds of the last write
    pub updated_at: u64,
    /// Unix milliseconds after which the entry is stale
    pub expires_at: Option<u64>,
    /// SHA-256 checksum of `payload` in format "sha256:hexstring"
    pub checksum: String,
}

impl CacheEntry {
    /// Returns the entry's key.
    pub fn key(&self) -> CacheKey {
        CacheKey::new(self.category.clone(), self.id.clone())
    }

    /// Returns true if the entry has expired at `now` (unix ms).
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Aggregate statistics over the cache index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Total payload bytes held by the cache
    pub total_size: u64,
    /// Number of entries
    pub entry_count: usize,
    /// `updated_at` of the least recently written entry
    pub oldest_entry: Option<u64>,
    /// `updated_at` of the most recently written entry
    pub newest_entry: Option<u64>,
    /// Bytes that survive a restart (0 when running memory-only)
    pub persisted_size: u64,
    /// Whether the cache is backed by durable storage
    pub is_persistent: bool,
    /// Entry count per category name
    pub by_category: BTreeMap<String, usize>,
}
