// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Engine API Layer
//!
//! High-level interface for the UI layer.
//!
//! # Module Structure
//!
//! - [`error`] - Error types for the API layer
//! - [`config`] - Configuration types
//! - [`events`] - Event system for callbacks
//! - [`engine`] - The offline engine facade

pub mod config;
pub mod engine;
pub mod error;
pub mod events;

// Error types
pub use error::{EngineError, EngineResult};

// Configuration
pub use config::EngineConfig;

// Events
pub use events::{CallbackHandler, EngineEvent, EventDispatcher, EventHandler};

// Engine
pub use engine::{OfflineEngine, OfflineEngineBuilder};
