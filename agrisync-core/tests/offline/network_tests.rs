//! Tests for connectivity monitoring
//!
//! Scenarios from offline-content.feature:
//! - Subscribers learn about every transition exactly once
//! - Repeated identical reports are ignored

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use agrisync_core::network::{NetworkListener, NetworkMonitor, NetworkState};
use parking_lot::Mutex;

struct CountingListener {
    calls: AtomicUsize,
}

impl NetworkListener for CountingListener {
    fn on_network_change(&self, _state: NetworkState) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_initial_state() {
    assert!(NetworkMonitor::default().is_online());
    let monitor = NetworkMonitor::new(NetworkState::Offline);
    assert_eq!(monitor.current(), NetworkState::Offline);
    assert!(!monitor.is_online());
}

#[test]
fn test_transition_notifies_each_subscriber_once_in_order() {
    let monitor = NetworkMonitor::new(NetworkState::Online);
    let log = Arc::new(Mutex::new(Vec::new()));

    for name in ["first", "second", "third"] {
        let log = Arc::clone(&log);
        monitor.subscribe_fn(move |state| log.lock().push((name, state)));
    }

    assert!(monitor.set_state(NetworkState::Offline));

    assert_eq!(
        *log.lock(),
        vec![
            ("first", NetworkState::Offline),
            ("second", NetworkState::Offline),
            ("third", NetworkState::Offline),
        ]
    );
}

#[test]
fn test_repeated_state_notifies_nobody() {
    let monitor = NetworkMonitor::new(NetworkState::Online);
    let listener = Arc::new(CountingListener {
        calls: AtomicUsize::new(0),
    });
    monitor.subscribe(listener.clone());

    assert!(!monitor.set_state(NetworkState::Online));
    assert!(monitor.set_state(NetworkState::Offline));
    assert!(!monitor.set_state(NetworkState::Offline));
    assert!(monitor.set_state(NetworkState::Online));

    assert_eq!(listener.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_unsubscribed_listener_is_not_called() {
    let monitor = NetworkMonitor::new(NetworkState::Online);
    let listener = Arc::new(CountingListener {
        calls: AtomicUsize::new(0),
    });
    let id = monitor.subscribe(listener.clone());
    assert_eq!(monitor.listener_count(), 1);

    assert!(monitor.unsubscribe(id));
    assert!(!monitor.unsubscribe(id));
    monitor.set_state(NetworkState::Offline);

    assert_eq!(listener.calls.load(Ordering::SeqCst), 0);
    assert_eq!(monitor.listener_count(), 0);
}

#[test]
fn test_concurrent_reports_notify_once_per_transition() {
    let monitor = Arc::new(NetworkMonitor::new(NetworkState::Online));
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        monitor.subscribe_fn(move |state| seen.lock().push(state));
    }

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let monitor = Arc::clone(&monitor);
            std::thread::spawn(move || {
                for _ in 0..100 {
                    let state = if i % 2 == 0 {
                        NetworkState::Offline
                    } else {
                        NetworkState::Online
                    };
                    monitor.set_state(state);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let seen = seen.lock();
    // Every notification is a real transition: no two consecutive repeats.
    assert!(seen.windows(2).all(|w| w[0] != w[1]));
    if let Some(first) = seen.first() {
        assert_eq!(*first, NetworkState::Offline);
    }
    if let Some(last) = seen.last() {
        assert_eq!(*last, monitor.current());
    }
}

#[tokio::test]
async fn test_watch_receiver_sees_latest_state() {
    let monitor = NetworkMonitor::new(NetworkState::Online);
    let mut rx = monitor.watch();
    assert_eq!(*rx.borrow(), NetworkState::Online);

    monitor.set_state(NetworkState::Offline);

    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), NetworkState::Offline);
}
