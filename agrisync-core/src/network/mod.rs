// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Network Module
//!
//! Tracks device connectivity. The platform layer feeds connectivity
//! signals into [`NetworkMonitor`]; the rest of the engine reads the current
//! state synchronously and gates every remote operation on it.

mod monitor;

pub use monitor::{
    CallbackListener, NetworkListener, NetworkMonitor, NetworkState, SubscriptionId,
};
