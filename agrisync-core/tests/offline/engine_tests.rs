//! Tests for the offline engine facade
//!
//! Scenarios from offline-content.feature:
//! - Save content for offline reading
//! - Clear cached content
//! - Engine keeps working without durable storage

use std::sync::Arc;
use std::time::Duration;

use agrisync_core::api::{EngineConfig, EngineError, EngineEvent, OfflineEngine};
use agrisync_core::content::CacheKey;
use agrisync_core::download::ContentAuthority;
use agrisync_core::network::NetworkState;
use agrisync_core::sync::SyncError;
use tempfile::TempDir;

use crate::common::{engine_with, init_tracing, manifest, record_events, MockAuthority};

#[test]
fn test_store_then_clear() {
    // Scenario C through the facade
    let engine = engine_with(&MockAuthority::empty(), EngineConfig::default());
    let events = record_events(&engine);

    engine
        .store_content("encyclopedia", "breed-1", b"Sahiwal")
        .unwrap();
    assert!(engine.is_content_available_offline("encyclopedia", "breed-1"));

    engine.clear_cache().unwrap();

    assert!(!engine.is_content_available_offline("encyclopedia", "breed-1"));
    assert_eq!(engine.get_offline_content("encyclopedia", "breed-1"), None);
    assert_eq!(*events.lock(), vec![EngineEvent::CacheCleared]);
}

#[tokio::test(start_paused = true)]
async fn test_clear_cache_is_refused_during_apply() {
    let authority = MockAuthority::new(manifest(2, &[("encyclopedia", 3)]));
    authority.delay_items(Duration::from_millis(200));
    let engine = engine_with(&authority, EngineConfig::default());
    engine.store_content("weather", "today", b"dry").unwrap();

    let (outcome, cleared) = tokio::join!(engine.apply_updates(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.clear_cache()
    });

    assert!(matches!(
        cleared,
        Err(EngineError::Sync(SyncError::InProgress))
    ));
    let outcome = outcome.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.new_items, 3);
    assert_eq!(engine.get_cache_stats().entry_count, 4);

    engine.clear_cache().unwrap();
    assert_eq!(engine.get_cache_stats().entry_count, 0);
    assert_eq!(engine.get_sync_info().current_version, 2);
}

#[tokio::test]
async fn test_download_for_offline() {
    let authority = MockAuthority::empty();
    authority.set_payload("consultations", "vet-42", b"deworming schedule");
    let engine = engine_with(&authority, EngineConfig::default());
    let events = record_events(&engine);

    assert!(engine.download_for_offline("consultations", "vet-42").await);

    assert_eq!(
        engine.get_offline_content("consultations", "vet-42"),
        Some(b"deworming schedule".to_vec())
    );
    assert_eq!(
        *events.lock(),
        vec![EngineEvent::ContentDownloaded {
            key: CacheKey::new("consultations", "vet-42"),
        }]
    );
}

#[tokio::test]
async fn test_failed_download_returns_false() {
    let authority = MockAuthority::empty();
    authority.fail_item(
        "forum",
        "missing",
        agrisync_core::FetchError::NotFound("forum:missing".to_string()),
    );
    let engine = engine_with(&authority, EngineConfig::default());

    assert!(!engine.download_for_offline("forum", "missing").await);
    assert!(!engine.is_content_available_offline("forum", "missing"));
}

#[test]
fn test_network_changes_are_forwarded_as_events() {
    let engine = engine_with(&MockAuthority::empty(), EngineConfig::default());
    let events = record_events(&engine);

    assert!(engine.set_network_state(NetworkState::Offline));
    assert!(!engine.set_network_state(NetworkState::Offline));
    assert!(engine.network().set_state(NetworkState::Online));

    assert_eq!(
        *events.lock(),
        vec![
            EngineEvent::NetworkChanged {
                state: NetworkState::Offline
            },
            EngineEvent::NetworkChanged {
                state: NetworkState::Online
            },
        ]
    );
}

#[test]
fn test_dropped_engine_unsubscribes_from_monitor() {
    let engine = engine_with(&MockAuthority::empty(), EngineConfig::default());
    let network = Arc::clone(engine.network());
    assert_eq!(network.listener_count(), 1);

    drop(engine);

    assert_eq!(network.listener_count(), 0);
}

#[test]
fn test_cache_stats_by_category() {
    let engine = engine_with(&MockAuthority::empty(), EngineConfig::default());
    engine.store_content("weather", "a", b"12345").unwrap();
    engine.store_content("weather", "b", b"123").unwrap();
    engine.store_content("logs", "a", b"1").unwrap();

    let stats = engine.get_cache_stats();

    assert_eq!(stats.entry_count, 3);
    assert_eq!(stats.total_size, 9);
    assert_eq!(stats.by_category.get("weather"), Some(&2));
    assert_eq!(stats.by_category.get("logs"), Some(&1));
    assert!(!stats.is_persistent);
}

#[test]
fn test_store_respects_configured_ceiling() {
    let engine = engine_with(
        &MockAuthority::empty(),
        EngineConfig::default().with_max_cache_bytes(10),
    );

    assert!(engine.store_content("logs", "big", &[0u8; 11]).is_err());
    engine.store_content("logs", "a", &[0u8; 6]).unwrap();
    engine.store_content("logs", "b", &[0u8; 6]).unwrap();

    assert_eq!(engine.get_cache_stats().entry_count, 1);
    assert!(engine.get_cache_stats().total_size <= 10);
}

#[tokio::test]
async fn test_open_persists_content_and_version() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let config = EngineConfig::default().with_storage_path(temp.path().join("agrisync.db"));
    let authority = MockAuthority::new(manifest(2, &[("encyclopedia", 2)]));

    {
        let engine = OfflineEngine::open(
            config.clone(),
            Arc::clone(&authority) as Arc<dyn ContentAuthority>,
        )
        .unwrap();
        assert!(engine.is_persistent());
        assert!(engine.apply_updates().await.unwrap().success);
    }

    let engine =
        OfflineEngine::open(config, Arc::clone(&authority) as Arc<dyn ContentAuthority>).unwrap();

    assert_eq!(engine.get_sync_info().current_version, 2);
    assert_eq!(engine.get_update_history().len(), 1);
    assert!(engine.is_content_available_offline("encyclopedia", "encyclopedia-1"));
    let stats = engine.get_cache_stats();
    assert!(stats.is_persistent);
    assert_eq!(stats.persisted_size, stats.total_size);
}

#[test]
fn test_unopenable_store_runs_memory_only() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("file");
    std::fs::write(&blocker, b"x").unwrap();
    let config = EngineConfig::default().with_storage_path(blocker.join("agrisync.db"));

    let engine = OfflineEngine::open(config, MockAuthority::empty()).unwrap();

    assert!(!engine.is_persistent());
    engine.store_content("weather", "today", b"dry").unwrap();
    assert_eq!(
        engine.get_offline_content("weather", "today"),
        Some(b"dry".to_vec())
    );
    assert_eq!(engine.get_cache_stats().persisted_size, 0);
}

#[test]
fn test_builder_starts_offline_when_told() {
    let engine = OfflineEngine::builder()
        .in_memory()
        .authority(MockAuthority::empty())
        .initial_network(NetworkState::Offline)
        .build()
        .unwrap();

    assert_eq!(engine.network().current(), NetworkState::Offline);
}

#[tokio::test(start_paused = true)]
async fn test_configured_auto_sync_starts_on_open() {
    let authority = MockAuthority::new(manifest(3, &[]));
    let config =
        EngineConfig::from_json(r#"{"autoSyncInterval": 120, "maxConcurrentDownloads": 2}"#)
            .unwrap();
    let engine = engine_with(&authority, config);

    assert!(engine.is_auto_sync_running());
    assert_eq!(engine.config().max_concurrent_downloads, 2);

    tokio::time::sleep(std::time::Duration::from_secs(121)).await;
    assert_eq!(authority.manifest_requests(), 1);
    assert!(engine.get_sync_info().update_available);
}

#[test]
fn test_in_memory_engine() {
    let engine = OfflineEngine::in_memory(MockAuthority::empty()).unwrap();

    assert!(!engine.is_persistent());
    assert_eq!(engine.get_sync_info().current_version, 0);
    assert!(engine.get_update_history().is_empty());
}
