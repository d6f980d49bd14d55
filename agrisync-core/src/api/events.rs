//! Event System
//!
//! Callbacks for engine events. The UI layer adapts these into whatever
//! reactive binding its framework offers.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::content::CacheKey;
use crate::network::NetworkState;
use crate::sync::SyncPhase;

/// Events emitted by the offline engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Connectivity changed.
    NetworkChanged {
        /// The new state.
        state: NetworkState,
    },

    /// The sync coordinator moved to another phase.
    SyncPhaseChanged {
        /// The new phase.
        phase: SyncPhase,
    },

    /// The periodic check found a newer content version.
    UpdateAvailable {
        /// The offered version.
        version: u64,
    },

    /// An update was fully applied.
    UpdateApplied {
        /// The version now current.
        version: u64,
        /// Items that did not exist locally before.
        new_items: usize,
        /// Items that were refreshed.
        updated_items: usize,
    },

    /// An update was only partially downloaded and remains available.
    UpdateIncomplete {
        /// The version that was attempted.
        version: u64,
        /// Summary for display.
        message: String,
    },

    /// A check or apply failed.
    SyncFailed {
        /// Error description.
        message: String,
    },

    /// An item was downloaded on demand.
    ContentDownloaded {
        /// The item.
        key: CacheKey,
    },

    /// The cache was cleared.
    CacheCleared,
}

/// Event handler trait.
///
/// Implement this trait to receive engine events.
pub trait EventHandler: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: EngineEvent);
}

/// Simple callback-based event handler.
///
/// Wraps a closure for easy event handling.
pub struct CallbackHandler<F>
where
    F: Fn(EngineEvent) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: Fn(EngineEvent) + Send + Sync,
{
    /// Creates a new callback handler.
    pub fn new(callback: F) -> Self {
        CallbackHandler { callback }
    }
}

impl<F> EventHandler for CallbackHandler<F>
where
    F: Fn(EngineEvent) + Send + Sync,
{
    fn on_event(&self, event: EngineEvent) {
        (self.callback)(event);
    }
}

/// Event dispatcher for managing multiple handlers.
///
/// Shared behind an `Arc`; handlers can be added at any time and are
/// invoked in registration order.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventDispatcher {
    /// Creates a new event dispatcher.
    pub fn new() -> Self {
        EventDispatcher::default()
    }

    /// Adds an event handler.
    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().push(handler);
    }

    /// Removes all handlers.
    pub fn clear_handlers(&self) {
        self.handlers.write().clear();
    }

    /// Returns the number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Dispatches an event to all handlers.
    pub fn dispatch(&self, event: EngineEvent) {
        let handlers = self.handlers.read().clone();
        for handler in &handlers {
            handler.on_event(event.clone());
        }
    }
}
