// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Persistent Storage Module
//!
//! Key/value persistence used by the content cache and the sync coordinator.
//! The engine only ever talks to a [`KeyValueStore`]; SQLite backs it on
//! device and [`MemoryStore`] backs it in tests or when the database cannot
//! be opened.
//!
//! Key namespaces:
//! - `cache:{category}:{id}` - materialized content entries
//! - `sync:state` - the persisted sync state record
//! - `sync:pending` - the manifest of an update that is available but not applied
//! - `history:{seq}` - append-only update history

mod error;
mod memory;
pub mod migration;
mod sqlite;

pub use error::StorageError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::path::Path;
use std::sync::Arc;

/// Minimal key/value interface the engine persists through.
///
/// Implementations must make `put` atomic per key: a concurrent `get` sees
/// either the previous or the new value.
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Inserts or replaces the value stored under `key`.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Deletes `key`. Returns true if it existed.
    fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Lists all entries whose key starts with `prefix`, ordered by key.
    fn list_by_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError>;

    /// Deletes all entries whose key starts with `prefix`. Returns the count.
    fn delete_by_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let mut removed = 0;
        for (key, _) in self.list_by_prefix(prefix)? {
            if self.delete(&key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Returns true if data written here survives a restart.
    fn is_persistent(&self) -> bool;
}

/// Result of opening the engine's store.
pub struct OpenedStore {
    /// The store to use.
    pub store: Arc<dyn KeyValueStore>,
    /// Set when the durable store failed to open and memory is used instead.
    pub degraded: Option<StorageError>,
}

/// Opens the SQLite store at `path`, degrading to memory-only storage if the
/// database cannot be created.
///
/// Failure to initialize the durable store is the only fatal storage
/// condition; it is logged once here and the engine keeps working without
/// persistence.
pub fn open_store(path: &Path) -> OpenedStore {
    match SqliteStore::open(path) {
        Ok(store) => OpenedStore {
            store: Arc::new(store),
            degraded: None,
        },
        Err(e) => {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "failed to open content store, falling back to memory-only caching"
            );
            OpenedStore {
                store: Arc::new(MemoryStore::new()),
                degraded: Some(e),
            }
        }
    }
}
