// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Payload integrity checks
//!
//! Every cached payload is stored with its SHA-256 checksum. A record whose
//! payload no longer matches is treated as corrupt and quarantined.

use ring::digest::{digest, SHA256};
use thiserror::Error;

const CHECKSUM_PREFIX: &str = "sha256:";

/// Compute the checksum of a payload
///
/// # Example
/// ```
/// use agrisync_core::content::compute_checksum;
///
/// let checksum = compute_checksum(b"maize planting guide");
/// assert!(checksum.starts_with("sha256:"));
/// ```
pub fn compute_checksum(data: &[u8]) -> String {
    format!(
        "{}{}",
        CHECKSUM_PREFIX,
        hex::encode(digest(&SHA256, data).as_ref())
    )
}

/// Verify a payload against a checksum produced by [`compute_checksum`]
pub fn verify_checksum(data: &[u8], expected: &str) -> Result<(), IntegrityError> {
    let expected_hex = expected
        .strip_prefix(CHECKSUM_PREFIX)
        .ok_or(IntegrityError::InvalidFormat)?;

    let actual = compute_checksum(data);
    let actual_hex = &actual[CHECKSUM_PREFIX.len()..];
    if actual_hex.eq_ignore_ascii_case(expected_hex) {
        Ok(())
    } else {
        Err(IntegrityError::ChecksumMismatch {
            expected: expected_hex.to_string(),
            actual: actual_hex.to_string(),
        })
    }
}

/// Errors that can occur during integrity verification
#[derive(Debug, Error)]
pub enum IntegrityError {
    /// Checksum format is invalid (missing "sha256:" prefix)
    #[error("Invalid checksum format, expected 'sha256:...'")]
    InvalidFormat,

    /// Computed checksum doesn't match expected checksum
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Expected checksum (hex string without prefix)
        expected: String,
        /// Actual computed checksum (hex string without prefix)
        actual: String,
    },
}
