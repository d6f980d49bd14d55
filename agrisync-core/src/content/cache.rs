// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Content cache for storing downloaded content locally
//!
//! Entries are persisted through a [`KeyValueStore`] and tracked in an
//! in-memory index used for size accounting, expiry and LRU eviction.
//!
//! Locking:
//! - writes take the stripe lock of their key, so writes to the same key are
//!   serialized and writes to distinct keys run in parallel;
//! - the index lock is held only for bookkeeping, never across storage I/O;
//! - reads never wait on a stripe lock and always return an owned copy; the
//!   cleanup a read triggers (expiry, missing or corrupt records) only runs
//!   if the key's stripe is free and the entry is still the one it saw.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard, RwLock};
use thiserror::Error;

use super::config::CacheConfig;
use super::integrity::{compute_checksum, verify_checksum, IntegrityError};
use super::types::{CacheEntry, CacheKey, CacheStats, ContentCategory, CACHE_KEY_PREFIX};
use crate::now_millis;
use crate::storage::{KeyValueStore, StorageError};

/// Bookkeeping for one entry; the payload itself stays in the store.
#[derive(Debug, Clone)]
struct IndexEntry {
    size_bytes: u64,
    created_at: u64,
    updated_at: u64,
    expires_at: Option<u64>,
    /// Logical access clock value; smallest is least recently used.
    last_access: u64,
}

impl IndexEntry {
    fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct Index {
    entries: HashMap<CacheKey, IndexEntry>,
    total_size: u64,
}

impl Index {
    fn insert(&mut self, key: CacheKey, entry: IndexEntry) -> Option<IndexEntry> {
        self.total_size += entry.size_bytes;
        let previous = self.entries.insert(key, entry);
        if let Some(prev) = &previous {
            self.total_size -= prev.size_bytes;
        }
        previous
    }

    fn remove(&mut self, key: &CacheKey) -> Option<IndexEntry> {
        let removed = self.entries.remove(key);
        if let Some(entry) = &removed {
            self.total_size -= entry.size_bytes;
        }
        removed
    }
}

/// Local persistent cache of materialized content
pub struct ContentCache {
    store: Arc<dyn KeyValueStore>,
    config: CacheConfig,
    index: RwLock<Index>,
    stripes: Box<[Mutex<()>]>,
    access_clock: AtomicU64,
}

impl ContentCache {
    /// Open the cache over `store`, rebuilding the index from persisted records
    ///
    /// Records that cannot be decoded are quarantined, expired records are
    /// dropped, and if the persisted total exceeds the configured ceiling the
    /// least recently written entries are evicted.
    pub fn open(store: Arc<dyn KeyValueStore>, config: CacheConfig) -> Result<Self, CacheError> {
        let stripe_count = config.write_stripes.max(1);
        let cache = Self {
            store,
            config,
            index: RwLock::new(Index::default()),
            stripes: (0..stripe_count).map(|_| Mutex::new(())).collect(),
            access_clock: AtomicU64::new(0),
        };
        cache.load_index()?;
        Ok(cache)
    }

    fn load_index(&self) -> Result<(), CacheError> {
        let now = now_millis();
        let mut records = Vec::new();

        for (storage_key, bytes) in self.store.list_by_prefix(CACHE_KEY_PREFIX)? {
            match decode_record(&storage_key, &bytes) {
                Ok(entry) if entry.is_expired(now) => {
                    self.store.delete(&storage_key)?;
                }
                Ok(entry) => records.push(entry),
                Err(e) => {
                    tracing::warn!(key = %storage_key, error = %e, "quarantining unreadable cache record");
                    self.store.delete(&storage_key)?;
                }
            }
        }

        // Oldest writes get the oldest access stamps so LRU order survives restarts.
        records.sort_by_key(|e| e.updated_at);

        let mut index = self.index.write();
        for entry in records {
            let key = entry.key();
            index.insert(
                key,
                IndexEntry {
                    size_bytes: entry.size_bytes,
                    created_at: entry.created_at,
                    updated_at: entry.updated_at,
                    expires_at: entry.expires_at,
                    last_access: self.tick(),
                },
            );
        }

        let mut victims = Vec::new();
        while index.total_size > self.config.max_cache_bytes {
            let Some(victim) = lru_candidate(&index, None, &[]) else {
                break;
            };
            index.remove(&victim);
            victims.push(victim);
        }
        drop(index);

        for victim in victims {
            tracing::debug!(key = %victim, "evicting entry over ceiling at load");
            self.store.delete(&victim.storage_key())?;
        }

        Ok(())
    }

    /// Insert or replace an entry
    ///
    /// Uses the configured default TTL.
    pub fn put(
        &self,
        category: impl Into<ContentCategory>,
        id: &str,
        payload: &[u8],
    ) -> Result<(), CacheError> {
        self.put_with_ttl(category, id, payload, self.config.default_ttl)
    }

    /// Insert or replace an entry with an explicit expiry
    ///
    /// `created_at` of an existing entry is preserved. Least recently used
    /// entries are evicted before the write so the ceiling is never exceeded.
    /// Storage failures are returned, never swallowed.
    pub fn put_with_ttl(
        &self,
        category: impl Into<ContentCategory>,
        id: &str,
        payload: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let key = CacheKey::new(category, id);
        let size = payload.len() as u64;
        if size > self.config.max_cache_bytes {
            return Err(CacheError::EntryTooLarge {
                size,
                max: self.config.max_cache_bytes,
            });
        }

        let own_stripe = self.stripe_of(&key);
        let _write_guard = self.stripes[own_stripe].lock();

        let now = now_millis();
        let created_at = self
            .index
            .read()
            .entries
            .get(&key)
            .map(|e| e.created_at)
            .unwrap_or(now);
        let expires_at = ttl.map(|ttl| now.saturating_add(ttl.as_millis() as u64));

        let entry = CacheEntry {
            category: key.category.clone(),
            id: key.id.clone(),
            payload: payload.to_vec(),
            size_bytes: size,
            created_at,
            updated_at: now,
            expires_at,
            checksum: compute_checksum(payload),
        };
        let bytes = bincode::serialize(&entry).map_err(StorageError::from)?;

        // Reserve space in the index first so concurrent writers cannot
        // overshoot the ceiling together.
        let (previous, victims) = {
            let mut index = self.index.write();
            let existing = index.entries.get(&key).map(|e| e.size_bytes).unwrap_or(0);
            let mut victims: Vec<(CacheKey, IndexEntry, Option<MutexGuard<'_, ()>>)> = Vec::new();
            let mut skipped = Vec::new();

            while index.total_size - existing + size > self.config.max_cache_bytes {
                let Some(victim) = lru_candidate(&index, Some(&key), &skipped) else {
                    // Roll back the evictions made so far; nothing was deleted yet.
                    let needed = index.total_size - existing + size;
                    for (victim_key, victim_entry, _) in victims {
                        index.insert(victim_key, victim_entry);
                    }
                    return Err(CacheError::CacheFull {
                        needed,
                        max: self.config.max_cache_bytes,
                    });
                };

                let victim_stripe = self.stripe_of(&victim);
                let guard = if victim_stripe == own_stripe {
                    None
                } else {
                    match self.stripes[victim_stripe].try_lock() {
                        Some(guard) => Some(guard),
                        None => {
                            // Being written right now; leave it alone.
                            skipped.push(victim);
                            continue;
                        }
                    }
                };
                if let Some(removed) = index.remove(&victim) {
                    victims.push((victim, removed, guard));
                }
            }

            let previous = index.insert(
                key.clone(),
                IndexEntry {
                    size_bytes: size,
                    created_at,
                    updated_at: now,
                    expires_at,
                    last_access: self.tick(),
                },
            );
            (previous, victims)
        };

        for (victim, _, _guard) in &victims {
            tracing::debug!(key = %victim, "evicting least recently used entry");
            if let Err(e) = self.store.delete(&victim.storage_key()) {
                tracing::warn!(key = %victim, error = %e, "failed to delete evicted record");
            }
        }
        drop(victims);

        if let Err(e) = self.store.put(&key.storage_key(), &bytes) {
            let mut index = self.index.write();
            index.remove(&key);
            if let Some(prev) = previous {
                index.insert(key, prev);
            }
            return Err(e.into());
        }

        Ok(())
    }

    /// Read an entry's payload
    ///
    /// Returns `Ok(None)` for missing or expired entries, and for entries
    /// that fail to decode or verify; those are quarantined on the way out.
    pub fn get(
        &self,
        category: impl Into<ContentCategory>,
        id: &str,
    ) -> Result<Option<Vec<u8>>, CacheError> {
        let key = CacheKey::new(category, id);
        let now = now_millis();

        let Some(meta) = self.index.read().entries.get(&key).cloned() else {
            return Ok(None);
        };
        if meta.is_expired(now) {
            self.drop_expired_entry(&key, &meta)?;
            return Ok(None);
        }

        let storage_key = key.storage_key();
        let Some(bytes) = self.store.get(&storage_key)? else {
            self.drop_orphaned_index_entry(&key, &meta)?;
            return Ok(None);
        };

        let entry = match decode_record(&storage_key, &bytes) {
            Ok(entry) if entry.key() == key => entry,
            Ok(_) => {
                self.quarantine(&key, &bytes, "record key does not match storage key")?;
                return Ok(None);
            }
            Err(e) => {
                self.quarantine(&key, &bytes, &e.to_string())?;
                return Ok(None);
            }
        };

        self.touch(&key);
        Ok(Some(entry.payload))
    }

    /// Check whether an unexpired entry exists
    ///
    /// Counts as an access for LRU ordering; does not read the payload.
    pub fn has(&self, category: impl Into<ContentCategory>, id: &str) -> bool {
        let key = CacheKey::new(category, id);
        let present = self.contains_key(&key);
        if present {
            self.touch(&key);
        }
        present
    }

    /// Check whether an unexpired entry exists without touching LRU order
    pub fn contains_key(&self, key: &CacheKey) -> bool {
        let now = now_millis();
        self.index
            .read()
            .entries
            .get(key)
            .is_some_and(|e| !e.is_expired(now))
    }

    /// Remove an entry. Returns true if it existed.
    pub fn remove(&self, category: impl Into<ContentCategory>, id: &str) -> Result<bool, CacheError> {
        self.remove_key(&CacheKey::new(category, id))
    }

    /// True if the index still holds the entry a reader looked at
    fn is_current(&self, key: &CacheKey, seen: &IndexEntry) -> bool {
        self.index
            .read()
            .entries
            .get(key)
            .is_some_and(|e| e.updated_at == seen.updated_at && e.size_bytes == seen.size_bytes)
    }

    fn drop_expired_entry(&self, key: &CacheKey, seen: &IndexEntry) -> Result<(), CacheError> {
        let Some(_guard) = self.stripes[self.stripe_of(key)].try_lock() else {
            return Ok(());
        };
        if self.is_current(key, seen) {
            self.index.write().remove(key);
            self.store.delete(&key.storage_key())?;
        }
        Ok(())
    }

    /// Drop an index entry whose record is missing from the store
    ///
    /// A busy stripe means a write for this key is in progress and its record
    /// is about to land, so the index is left alone.
    fn drop_orphaned_index_entry(
        &self,
        key: &CacheKey,
        seen: &IndexEntry,
    ) -> Result<(), CacheError> {
        let Some(_guard) = self.stripes[self.stripe_of(key)].try_lock() else {
            return Ok(());
        };
        if self.is_current(key, seen) && self.store.get(&key.storage_key())?.is_none() {
            tracing::warn!(key = %key, "index entry has no stored record; dropping it");
            self.index.write().remove(key);
        }
        Ok(())
    }

    fn remove_key(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let _guard = self.stripes[self.stripe_of(key)].lock();
        let removed = self.index.write().remove(key).is_some();
        let deleted = self.store.delete(&key.storage_key())?;
        Ok(removed || deleted)
    }

    /// Remove every entry
    pub fn clear(&self) -> Result<(), CacheError> {
        let _guards: Vec<_> = self.stripes.iter().map(|s| s.lock()).collect();
        *self.index.write() = Index::default();
        let removed = self.store.delete_by_prefix(CACHE_KEY_PREFIX)?;
        tracing::info!(removed, "content cache cleared");
        Ok(())
    }

    /// Remove every entry of one category. Returns the number removed.
    pub fn clear_category(&self, category: impl Into<ContentCategory>) -> Result<usize, CacheError> {
        let category = category.into();
        let keys: Vec<CacheKey> = self
            .index
            .read()
            .entries
            .keys()
            .filter(|k| k.category == category)
            .cloned()
            .collect();

        let mut removed = 0;
        for key in keys {
            if self.remove_key(&key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Aggregate statistics over the index
    pub fn stats(&self) -> CacheStats {
        let index = self.index.read();
        let mut stats = CacheStats {
            total_size: index.total_size,
            entry_count: index.entries.len(),
            is_persistent: self.store.is_persistent(),
            ..Default::default()
        };
        for (key, entry) in &index.entries {
            stats.oldest_entry = Some(
                stats
                    .oldest_entry
                    .map_or(entry.updated_at, |t| t.min(entry.updated_at)),
            );
            stats.newest_entry = Some(
                stats
                    .newest_entry
                    .map_or(entry.updated_at, |t| t.max(entry.updated_at)),
            );
            *stats
                .by_category
                .entry(key.category.as_str().to_string())
                .or_default() += 1;
        }
        if stats.is_persistent {
            stats.persisted_size = stats.total_size;
        }
        stats
    }

    /// Keys of all entries, in no particular order
    pub fn keys(&self) -> Vec<CacheKey> {
        self.index.read().entries.keys().cloned().collect()
    }

    /// The configured byte ceiling
    pub fn max_bytes(&self) -> u64 {
        self.config.max_cache_bytes
    }

    /// Whether entries survive a restart
    pub fn is_persistent(&self) -> bool {
        self.store.is_persistent()
    }

    fn quarantine(&self, key: &CacheKey, corrupt: &[u8], reason: &str) -> Result<(), CacheError> {
        let Some(_guard) = self.stripes[self.stripe_of(key)].try_lock() else {
            return Ok(());
        };
        let storage_key = key.storage_key();

        // A writer may have replaced the record since it was read.
        if self.store.get(&storage_key)?.as_deref() != Some(corrupt) {
            return Ok(());
        }

        tracing::warn!(key = %key, reason, "quarantining corrupt cache entry");
        self.index.write().remove(key);
        self.store.delete(&storage_key)?;
        Ok(())
    }

    fn touch(&self, key: &CacheKey) {
        let stamp = self.tick();
        if let Some(entry) = self.index.write().entries.get_mut(key) {
            entry.last_access = stamp;
        }
    }

    fn tick(&self) -> u64 {
        self.access_clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn stripe_of(&self, key: &CacheKey) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }
}

/// Least recently used key that is neither `protect` nor in `skipped`.
fn lru_candidate(
    index: &Index,
    protect: Option<&CacheKey>,
    skipped: &[CacheKey],
) -> Option<CacheKey> {
    index
        .entries
        .iter()
        .filter(|(k, _)| Some(*k) != protect && !skipped.contains(k))
        .min_by_key(|(_, e)| (e.last_access, e.updated_at))
        .map(|(k, _)| k.clone())
}

/// Decode and verify a persisted record.
fn decode_record(storage_key: &str, bytes: &[u8]) -> Result<CacheEntry, CacheError> {
    let entry: CacheEntry = bincode::deserialize(bytes)
        .map_err(|e| CacheError::Corrupt(format!("{}: {}", storage_key, e)))?;
    if entry.size_bytes != entry.payload.len() as u64 {
        return Err(CacheError::Corrupt(format!(
            "{}: size {} does not match payload length {}",
            storage_key,
            entry.size_bytes,
            entry.payload.len()
        )));
    }
    verify_checksum(&entry.payload, &entry.checksum)?;
    Ok(entry)
}

/// Errors that can occur with the content cache
#[derive(Debug, Error)]
pub enum CacheError {
    /// Underlying storage failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A single payload is larger than the whole cache
    #[error("Entry too large: {size} bytes (max {max})")]
    EntryTooLarge {
        /// Payload size in bytes
        size: u64,
        /// Configured ceiling in bytes
        max: u64,
    },

    /// Not enough evictable space (every other entry is being written)
    #[error("Cache full: need {needed} bytes (max {max})")]
    CacheFull {
        /// Bytes the write would bring the cache to
        needed: u64,
        /// Configured ceiling in bytes
        max: u64,
    },

    /// A persisted record could not be decoded
    #[error("Corrupt entry: {0}")]
    Corrupt(String),

    /// A persisted payload failed checksum verification
    #[error("Integrity error: {0}")]
    Integrity(#[from] IntegrityError),
}
