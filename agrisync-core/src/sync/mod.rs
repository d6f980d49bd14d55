// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync Module
//!
//! Version negotiation with the content authority, update application,
//! auto-sync scheduling, and update history.

pub mod coordinator;
pub mod manifest;
mod persistence;
pub mod state;

pub use coordinator::SyncCoordinator;
pub use manifest::{UpdateInfo, UpdateManifest, UpdateManifestEntry, UpdateType};
pub use state::{ApplyOutcome, SyncError, SyncPhase, SyncState};
