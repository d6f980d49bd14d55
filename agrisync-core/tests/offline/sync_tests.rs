//! Tests for version negotiation and update application
//!
//! Scenarios from offline-content.feature:
//! - Detect and apply a newer content version
//! - Partial downloads never advance the version
//! - Sync operations are refused while offline
//! - Periodic checks announce updates without applying them

use std::sync::Arc;
use std::time::Duration;

use agrisync_core::api::{EngineConfig, EngineError, EngineEvent};
use agrisync_core::download::FetchError;
use agrisync_core::network::NetworkState;
use agrisync_core::storage::KeyValueStore;
use agrisync_core::sync::{SyncError, SyncPhase};
use tokio_util::sync::CancellationToken;

use crate::common::{
    engine_on, engine_with, manifest, manifest_with_ids, memory_store, record_events, seed_version,
    MockAuthority,
};

fn test_config() -> EngineConfig {
    EngineConfig::default()
        .with_retry(0, Duration::from_millis(10), Duration::from_millis(100))
        .with_request_timeout(Duration::from_secs(5))
}

fn assert_sync_error(result: Result<impl std::fmt::Debug, EngineError>, expected: SyncError) {
    match result {
        Err(EngineError::Sync(actual)) => assert_eq!(actual.to_string(), expected.to_string()),
        other => panic!("expected {:?}, got {:?}", expected, other),
    }
}

#[tokio::test]
async fn test_scenario_detect_and_apply_update() {
    // Scenario A
    let store = memory_store();
    seed_version(&*store, 1);
    let authority = MockAuthority::new(manifest(2, &[("encyclopedia", 3)]));
    let engine = engine_on(store, &authority, test_config());

    assert_eq!(engine.get_sync_info().current_version, 1);
    assert!(engine.check_for_updates().await.unwrap());

    let info = engine.get_sync_info();
    assert!(info.update_available);
    assert_eq!(info.available_version, Some(2));

    let outcome = engine.apply_updates().await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.new_items, 3);
    assert_eq!(outcome.updated_items, 0);
    assert_eq!(outcome.failed_items, 0);

    let info = engine.get_sync_info();
    assert_eq!(info.current_version, 2);
    assert!(!info.update_available);
    assert_eq!(info.available_version, None);
    assert!(info.last_sync_timestamp.is_some());

    let history = engine.get_update_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].version, 2);

    for n in 1..=3 {
        let id = format!("encyclopedia-{}", n);
        assert_eq!(
            engine.get_offline_content("encyclopedia", &id),
            Some(authority.expected_payload("encyclopedia", &id))
        );
    }
    // apply used the manifest fetched by the check
    assert_eq!(authority.manifest_requests(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_scenario_partial_failure_keeps_version() {
    // Scenario B
    let store = memory_store();
    seed_version(&*store, 1);
    let authority = MockAuthority::new(manifest(2, &[("encyclopedia", 3)]));
    authority.delay_item("encyclopedia", "encyclopedia-2", Duration::from_secs(60));
    let engine = engine_on(store, &authority, test_config());

    engine.check_for_updates().await.unwrap();
    let outcome = engine.apply_updates().await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.updated_items + outcome.new_items, 2);
    assert_eq!(outcome.failed_items, 1);
    assert!(!outcome.message.is_empty());

    let info = engine.get_sync_info();
    assert_eq!(info.current_version, 1);
    assert!(info.update_available);
    assert_eq!(info.available_version, Some(2));
    assert!(engine.get_update_history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_partial_failure_completes_update() {
    let authority = MockAuthority::new(manifest(3, &[("weather", 2)]));
    authority.fail_item("weather", "weather-2", FetchError::HttpError(500));
    let engine = engine_with(&authority, test_config());

    let first = engine.apply_updates().await.unwrap();
    assert!(!first.success);
    assert_eq!(engine.get_sync_info().current_version, 0);

    authority.heal_item("weather", "weather-2");
    let second = engine.apply_updates().await.unwrap();

    assert!(second.success);
    assert_eq!(second.updated_items, 1);
    assert_eq!(second.new_items, 1);
    assert_eq!(engine.get_sync_info().current_version, 3);
}

#[tokio::test]
async fn test_apply_without_pending_checks_first() {
    let authority = MockAuthority::new(manifest_with_ids(4, "marketplace", &["tomato", "onion"]));
    let engine = engine_with(&authority, test_config());
    engine.store_content("marketplace", "tomato", b"old listing").unwrap();

    let outcome = engine.apply_updates().await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.updated_items, 1);
    assert_eq!(outcome.new_items, 1);
    assert_eq!(authority.manifest_requests(), 1);
    assert_eq!(
        engine.get_offline_content("marketplace", "tomato"),
        Some(authority.expected_payload("marketplace", "tomato"))
    );
}

#[tokio::test]
async fn test_apply_when_up_to_date_changes_nothing() {
    let store = memory_store();
    seed_version(&*store, 5);
    let authority = MockAuthority::new(manifest(5, &[("logs", 2)]));
    let engine = engine_on(store, &authority, test_config());

    let outcome = engine.apply_updates().await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.new_items + outcome.updated_items, 0);
    assert_eq!(engine.get_sync_info().current_version, 5);
    assert_eq!(authority.total_item_requests(), 0);
    assert!(engine.get_update_history().is_empty());
}

#[tokio::test]
async fn test_equal_version_is_not_an_update() {
    let store = memory_store();
    seed_version(&*store, 7);
    let authority = MockAuthority::new(manifest(7, &[("weather", 1)]));
    let engine = engine_on(store, &authority, test_config());

    assert!(!engine.check_for_updates().await.unwrap());
    assert!(!engine.get_sync_info().update_available);
    assert!(engine.get_sync_info().last_sync_timestamp.is_some());
}

#[tokio::test]
async fn test_older_remote_version_is_ignored() {
    let store = memory_store();
    seed_version(&*store, 5);
    let authority = MockAuthority::new(manifest(3, &[("weather", 1)]));
    let engine = engine_on(store, &authority, test_config());

    assert!(!engine.check_for_updates().await.unwrap());

    let info = engine.get_sync_info();
    assert_eq!(info.current_version, 5);
    assert!(!info.update_available);
    assert_eq!(info.available_version, None);
}

#[tokio::test]
async fn test_withdrawn_update_clears_availability() {
    let authority = MockAuthority::new(manifest(2, &[("forum", 1)]));
    let engine = engine_with(&authority, test_config());
    assert!(engine.check_for_updates().await.unwrap());

    authority.set_manifest(manifest(0, &[]));

    assert!(!engine.check_for_updates().await.unwrap());
    assert!(!engine.get_sync_info().update_available);
    assert!(engine.sync().pending_manifest().is_none());
}

#[tokio::test]
async fn test_offline_refuses_sync_operations() {
    let authority = MockAuthority::new(manifest(2, &[("encyclopedia", 2)]));
    let engine = engine_with(&authority, test_config());
    engine.set_network_state(NetworkState::Offline);
    let before = engine.get_sync_info();

    assert_sync_error(engine.check_for_updates().await, SyncError::Offline);
    assert_sync_error(engine.apply_updates().await, SyncError::Offline);
    assert!(!engine.download_for_offline("encyclopedia", "encyclopedia-1").await);

    assert_eq!(engine.get_sync_info(), before);
    assert_eq!(authority.manifest_requests(), 0);
    assert_eq!(authority.total_item_requests(), 0);
    assert_eq!(engine.get_cache_stats().entry_count, 0);
}

#[tokio::test]
async fn test_manifest_failure_reports_error_and_returns_to_idle() {
    let authority = MockAuthority::empty();
    authority.fail_manifest(FetchError::HttpError(502));
    let engine = engine_with(&authority, test_config());
    let events = record_events(&engine);

    let result = engine.check_for_updates().await;

    assert!(matches!(
        result,
        Err(EngineError::Sync(SyncError::Fetch(FetchError::HttpError(502))))
    ));
    assert_eq!(engine.sync().phase(), SyncPhase::Idle);
    assert_eq!(engine.get_sync_info().current_version, 0);

    let phases: Vec<SyncPhase> = events
        .lock()
        .iter()
        .filter_map(|e| match e {
            EngineEvent::SyncPhaseChanged { phase } => Some(*phase),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![SyncPhase::Checking, SyncPhase::Error, SyncPhase::Idle]
    );
    assert!(events
        .lock()
        .iter()
        .any(|e| matches!(e, EngineEvent::SyncFailed { .. })));
}

#[tokio::test]
async fn test_oversized_manifest_is_rejected_before_download() {
    let store = memory_store();
    let authority = MockAuthority::new(manifest(
        2,
        &[("encyclopedia", 4_000_000_000), ("weather", 2)],
    ));
    let engine = engine_on(
        Arc::clone(&store) as Arc<dyn KeyValueStore>,
        &authority,
        test_config().with_max_manifest_items(1_000),
    );

    let checked = engine.check_for_updates().await;
    let applied = engine.apply_updates().await;

    for result in [checked.map(|_| ()), applied.map(|_| ())] {
        assert!(matches!(
            result,
            Err(EngineError::Sync(SyncError::Fetch(FetchError::InvalidResponse(_))))
        ));
    }
    let info = engine.get_sync_info();
    assert!(!info.update_available);
    assert_eq!(info.current_version, 0);
    assert!(engine.sync().pending_manifest().is_none());
    assert_eq!(store.get("sync:pending").unwrap(), None);
    assert_eq!(authority.total_item_requests(), 0);
    assert_eq!(engine.sync().phase(), SyncPhase::Idle);
}

#[tokio::test]
async fn test_manifest_at_item_cap_is_accepted() {
    let authority = MockAuthority::new(manifest(2, &[("weather", 3), ("forum", 2)]));
    let engine = engine_with(&authority, test_config().with_max_manifest_items(5));

    assert!(engine.check_for_updates().await.unwrap());
    assert!(engine.apply_updates().await.unwrap().success);
    assert_eq!(engine.get_sync_info().current_version, 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_operations_fail_fast() {
    let authority = MockAuthority::new(manifest(2, &[("weather", 1)]));
    authority.delay_manifest(Duration::from_secs(1));
    let engine = engine_with(&authority, test_config());

    let (first, second) = tokio::join!(engine.check_for_updates(), engine.apply_updates());

    assert!(first.unwrap());
    assert_sync_error(second, SyncError::InProgress);
    assert_eq!(authority.manifest_requests(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_apply_keeps_version() {
    let authority = MockAuthority::new(manifest(2, &[("encyclopedia", 6)]));
    authority.delay_items(Duration::from_millis(100));
    let engine = engine_with(
        &authority,
        test_config().with_max_concurrent_downloads(1),
    );
    engine.check_for_updates().await.unwrap();
    let cancel = CancellationToken::new();

    let (outcome, ()) = tokio::join!(engine.apply_updates_with_cancel(&cancel), async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
    });
    let outcome = outcome.unwrap();

    assert!(!outcome.success);
    assert!(outcome.failed_items > 0);
    let info = engine.get_sync_info();
    assert_eq!(info.current_version, 0);
    assert!(info.update_available);
}

#[tokio::test]
async fn test_successful_apply_emits_events() {
    let authority = MockAuthority::new(manifest(2, &[("logs", 2)]));
    let engine = engine_with(&authority, test_config());
    let events = record_events(&engine);

    engine.apply_updates().await.unwrap();

    let events = events.lock();
    assert!(events.contains(&EngineEvent::UpdateApplied {
        version: 2,
        new_items: 2,
        updated_items: 0,
    }));
    assert_eq!(
        events.last(),
        Some(&EngineEvent::UpdateApplied {
            version: 2,
            new_items: 2,
            updated_items: 0,
        })
    );
    // apply does not announce availability; only the timer does
    assert!(!events
        .iter()
        .any(|e| matches!(e, EngineEvent::UpdateAvailable { .. })));
}

#[tokio::test]
async fn test_history_is_newest_first() {
    let authority = MockAuthority::new(manifest(1, &[("weather", 1)]));
    let engine = engine_with(&authority, test_config());

    engine.apply_updates().await.unwrap();
    authority.set_manifest(manifest(2, &[("weather", 1)]));
    engine.apply_updates().await.unwrap();
    authority.set_manifest(manifest(4, &[("forum", 1)]));
    engine.apply_updates().await.unwrap();

    let versions: Vec<u64> = engine
        .get_update_history()
        .iter()
        .map(|u| u.version)
        .collect();
    assert_eq!(versions, vec![4, 2, 1]);
}

#[tokio::test]
async fn test_state_and_history_survive_restart() {
    let store = memory_store();
    let authority = MockAuthority::new(manifest(2, &[("encyclopedia", 1)]));
    {
        let engine = engine_on(store.clone(), &authority, test_config());
        engine.apply_updates().await.unwrap();
        authority.set_manifest(manifest(3, &[("encyclopedia", 1)]));
        assert!(engine.check_for_updates().await.unwrap());
    }

    let engine = engine_on(store.clone(), &authority, test_config());

    let info = engine.get_sync_info();
    assert_eq!(info.current_version, 2);
    assert!(info.update_available);
    assert_eq!(info.available_version, Some(3));
    assert_eq!(engine.get_update_history().len(), 1);
    assert_eq!(
        engine.sync().pending_manifest().map(|m| m.version),
        Some(3)
    );
    assert!(store.get("sync:pending").unwrap().is_some());
}

// === Auto Sync ===

#[tokio::test(start_paused = true)]
async fn test_auto_sync_announces_update_without_applying() {
    let authority = MockAuthority::new(manifest(2, &[("weather", 1)]));
    let engine = engine_with(&authority, test_config());
    let events = record_events(&engine);

    engine.start_auto_sync(60).unwrap();
    assert!(engine.is_auto_sync_running());
    assert_eq!(authority.manifest_requests(), 0);

    tokio::time::sleep(Duration::from_secs(3601)).await;

    assert_eq!(authority.manifest_requests(), 1);
    assert!(events
        .lock()
        .contains(&EngineEvent::UpdateAvailable { version: 2 }));
    assert_eq!(engine.get_sync_info().current_version, 0);
    assert_eq!(authority.total_item_requests(), 0);

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(authority.manifest_requests(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_restarting_auto_sync_replaces_timer() {
    let authority = MockAuthority::empty();
    let engine = engine_with(&authority, test_config());

    engine.start_auto_sync(60).unwrap();
    engine.start_auto_sync(120).unwrap();

    tokio::time::sleep(Duration::from_secs(3601)).await;
    assert_eq!(authority.manifest_requests(), 0);

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(authority.manifest_requests(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_auto_sync_is_idempotent() {
    let authority = MockAuthority::empty();
    let engine = engine_with(&authority, test_config());

    engine.stop_auto_sync();
    engine.start_auto_sync(1).unwrap();
    engine.stop_auto_sync();
    engine.stop_auto_sync();
    assert!(!engine.is_auto_sync_running());

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(authority.manifest_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_auto_sync_skips_ticks_while_offline() {
    let authority = MockAuthority::new(manifest(2, &[("weather", 1)]));
    let engine = engine_with(&authority, test_config());
    engine.start_auto_sync(1).unwrap();
    engine.set_network_state(NetworkState::Offline);

    tokio::time::sleep(Duration::from_secs(181)).await;
    assert_eq!(authority.manifest_requests(), 0);

    engine.set_network_state(NetworkState::Online);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(authority.manifest_requests(), 1);
}

#[tokio::test]
async fn test_zero_minute_interval_is_rejected() {
    let engine = engine_with(&MockAuthority::empty(), test_config());

    assert!(matches!(
        engine.start_auto_sync(0),
        Err(EngineError::Configuration(_))
    ));
    assert!(!engine.is_auto_sync_running());
}

#[tokio::test(start_paused = true)]
async fn test_unschedulable_interval_is_rejected() {
    let engine = engine_with(&MockAuthority::empty(), test_config());

    assert!(matches!(
        engine.start_auto_sync(u64::MAX),
        Err(EngineError::Configuration(_))
    ));
    assert!(matches!(
        engine.start_auto_sync(u64::MAX / 60),
        Err(EngineError::Sync(SyncError::InvalidInterval(_)))
    ));
    assert!(matches!(
        engine.start_auto_sync_every(Duration::MAX),
        Err(EngineError::Sync(SyncError::InvalidInterval(_)))
    ));
    assert!(!engine.is_auto_sync_running());
}

#[test]
fn test_auto_sync_needs_runtime() {
    let engine = engine_with(&MockAuthority::empty(), test_config());

    assert!(matches!(
        engine.start_auto_sync(5),
        Err(EngineError::Sync(SyncError::NoRuntime))
    ));
}

#[tokio::test]
async fn test_check_uses_single_manifest_round_trip() {
    let authority = MockAuthority::new(manifest(9, &[("encyclopedia", 50)]));
    let engine = engine_with(&authority, test_config());

    assert!(engine.check_for_updates().await.unwrap());

    assert_eq!(authority.manifest_requests(), 1);
    assert_eq!(authority.total_item_requests(), 0);
    assert_eq!(engine.get_cache_stats().entry_count, 0);
}

#[tokio::test]
async fn test_coordinator_is_shared_with_engine() {
    let authority = MockAuthority::new(manifest(1, &[]));
    let engine = engine_with(&authority, test_config());
    let coordinator = Arc::clone(engine.sync());

    engine.apply_updates().await.unwrap();

    assert_eq!(coordinator.get_sync_info().current_version, 1);
}
