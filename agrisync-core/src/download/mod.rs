// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Content downloads
//!
//! Materializes remote items into the [`ContentCache`](crate::content::ContentCache):
//! - on-demand single-item fetches with duplicate-request coalescing
//! - batch fetches over a bounded worker pool with per-item retry
//! - per-request timeouts
//!
//! The remote side is abstracted by [`ContentAuthority`]; [`HttpAuthority`]
//! is the production implementation.

mod authority;
mod config;
#[cfg(feature = "http")]
mod http;
mod manager;
mod retry;

pub use authority::{ContentAuthority, FetchError};
pub use config::{DownloadConfig, DEFAULT_MAX_MANIFEST_ITEMS};
#[cfg(feature = "http")]
pub use http::{HttpAuthority, HttpAuthorityConfig};
pub use manager::{BatchOutcome, DownloadError, DownloadManager};
pub use retry::RetryPolicy;
