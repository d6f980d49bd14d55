// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Connectivity monitor.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Device connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkState {
    /// The content authority may be reachable.
    Online,
    /// No connectivity.
    Offline,
}

impl NetworkState {
    /// Returns true for [`NetworkState::Online`].
    pub fn is_online(self) -> bool {
        self == NetworkState::Online
    }

    fn from_online(online: bool) -> Self {
        if online {
            NetworkState::Online
        } else {
            NetworkState::Offline
        }
    }
}

/// Receives connectivity transitions.
///
/// Listeners run on the thread that reported the transition and must not
/// report another transition from inside the callback.
pub trait NetworkListener: Send + Sync {
    /// Called once per transition with the new state.
    fn on_network_change(&self, state: NetworkState);
}

/// Closure-based listener.
pub struct CallbackListener<F>
where
    F: Fn(NetworkState) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackListener<F>
where
    F: Fn(NetworkState) + Send + Sync,
{
    /// Wraps a closure.
    pub fn new(callback: F) -> Self {
        CallbackListener { callback }
    }
}

impl<F> NetworkListener for CallbackListener<F>
where
    F: Fn(NetworkState) + Send + Sync,
{
    fn on_network_change(&self, state: NetworkState) {
        (self.callback)(state);
    }
}

/// Handle returned by [`NetworkMonitor::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Two-state connectivity monitor.
///
/// `current()` never blocks. Transitions are serialized: every subscriber
/// registered when a transition is reported is notified exactly once, in
/// subscription order, before the next transition is processed.
pub struct NetworkMonitor {
    online: AtomicBool,
    transition: Mutex<()>,
    listeners: RwLock<Vec<(SubscriptionId, Arc<dyn NetworkListener>)>>,
    next_id: AtomicU64,
    watch_tx: watch::Sender<NetworkState>,
}

impl NetworkMonitor {
    /// Creates a monitor starting in `initial`.
    pub fn new(initial: NetworkState) -> Self {
        let (watch_tx, _) = watch::channel(initial);
        NetworkMonitor {
            online: AtomicBool::new(initial.is_online()),
            transition: Mutex::new(()),
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            watch_tx,
        }
    }

    /// Returns the current state.
    pub fn current(&self) -> NetworkState {
        NetworkState::from_online(self.online.load(Ordering::Acquire))
    }

    /// Returns true if currently online.
    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    /// Reports a connectivity signal from the platform.
    ///
    /// Returns true if this was a transition. Repeating the current state
    /// notifies nobody.
    pub fn set_state(&self, state: NetworkState) -> bool {
        let _transition = self.transition.lock();

        let was_online = self.online.swap(state.is_online(), Ordering::AcqRel);
        if was_online == state.is_online() {
            return false;
        }

        tracing::info!(?state, "network state changed");
        self.watch_tx.send_replace(state);

        // Snapshot so listeners may unsubscribe from inside the callback.
        let listeners: Vec<Arc<dyn NetworkListener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener.on_network_change(state);
        }

        true
    }

    /// Registers a listener for future transitions.
    pub fn subscribe(&self, listener: Arc<dyn NetworkListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// Registers a closure for future transitions.
    pub fn subscribe_fn<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(NetworkState) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(CallbackListener::new(callback)))
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Returns a receiver that always holds the latest state, for async consumers.
    pub fn watch(&self) -> watch::Receiver<NetworkState> {
        self.watch_tx.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        NetworkMonitor::new(NetworkState::Online)
    }
}
