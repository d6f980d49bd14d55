//! Agrisync Core Library
//!
//! Offline content cache and sync engine for the Agrisync mobile client.
//! Previously fetched content (encyclopedia entries, marketplace listings,
//! weather, consultations, logs) stays readable while disconnected, and the
//! engine reconciles it with the content service when connectivity returns.
//!
//! The [`OfflineEngine`] facade is the entry point; the component modules are
//! public for hosts that wire things differently.

pub mod api;
pub mod content;
pub mod download;
pub mod network;
pub mod storage;
pub mod sync;

pub use api::{
    EngineConfig, EngineError, EngineEvent, EngineResult, OfflineEngine, OfflineEngineBuilder,
};
pub use content::{CacheError, CacheKey, CacheStats, ContentCache, ContentCategory};
#[cfg(feature = "http")]
pub use download::HttpAuthority;
pub use download::{ContentAuthority, DownloadError, DownloadManager, FetchError};
pub use network::{NetworkMonitor, NetworkState};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore, StorageError};
pub use sync::{
    ApplyOutcome, SyncCoordinator, SyncError, SyncPhase, SyncState, UpdateInfo, UpdateManifest,
    UpdateManifestEntry, UpdateType,
};

/// Current Unix time in milliseconds.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
