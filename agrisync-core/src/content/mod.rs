// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Offline content cache
//!
//! Stores materialized content (encyclopedia entries, listings, log
//! entries, ...) keyed by category and identifier so it can be read while
//! disconnected. The cache enforces a byte ceiling with LRU eviction and
//! quarantines records that fail to decode or verify.

mod cache;
mod config;
mod integrity;
mod types;

pub use cache::{CacheError, ContentCache};
pub use config::{CacheConfig, DEFAULT_MAX_CACHE_BYTES};
pub use integrity::{compute_checksum, verify_checksum, IntegrityError};
pub use types::{CacheEntry, CacheKey, CacheStats, ContentCategory};
