// SPDX-License-Identifier: MIT OR Apache-2.0
//! The HMAC keyring: current + previous 32-byte keys with rotation.
//!
//! Tokens are signed with the current key and verified against current
//! then previous, so a rotation never invalidates tokens already in
//! flight. The persisted form is the JSON of [`Keyring`]; anything that
//! cannot be read back as exactly 32 raw bytes per key is reported as
//! corruption through the port boundary, never thrown.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod fs_store;

pub use fs_store::FsKeyringStore;

use serde::{Deserialize, Serialize};
use wr_codec::base64url;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from keyring loading, validation, and rotation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyringError {
    /// The persisted keyring is unreadable as a valid keyring record.
    #[error("keyring corruption detected: {detail}")]
    CorruptionDetected {
        /// What failed to validate.
        detail: String,
    },

    /// Filesystem or entropy failure while loading or persisting.
    #[error("keyring io failed: {detail}")]
    Io {
        /// The underlying failure, rendered.
        detail: String,
    },
}

impl KeyringError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CorruptionDetected { .. } => "KEYRING_CORRUPTION_DETECTED",
            Self::Io { .. } => "KEYRING_IO_FAILED",
        }
    }
}

// ---------------------------------------------------------------------------
// Keyring record
// ---------------------------------------------------------------------------

/// Signing algorithm tag. Closed set with a single member today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAlg {
    /// HMAC with SHA-256.
    HmacSha256,
}

/// One key slot: algorithm plus 32 raw bytes carried as base64url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KeyMaterial {
    /// Signing algorithm.
    pub alg: KeyAlg,
    /// Unpadded base64url of exactly 32 raw key bytes.
    pub key_base64_url: String,
}

impl KeyMaterial {
    /// Wrap raw key bytes.
    #[must_use]
    pub fn from_raw(raw: &[u8; 32]) -> Self {
        Self {
            alg: KeyAlg::HmacSha256,
            key_base64_url: base64url::encode(raw),
        }
    }

    /// Decode the raw key bytes, enforcing the 32-byte length.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::CorruptionDetected`] on bad base64url or a
    /// wrong decoded length.
    pub fn raw(&self) -> Result<[u8; 32], KeyringError> {
        let bytes =
            base64url::decode(&self.key_base64_url).map_err(|e| KeyringError::CorruptionDetected {
                detail: format!("key material is not base64url: {e}"),
            })?;
        let len = bytes.len();
        bytes
            .try_into()
            .map_err(|_| KeyringError::CorruptionDetected {
                detail: format!("key material is {len} bytes, expected 32"),
            })
    }
}

/// Schema version of the persisted keyring record.
pub const KEYRING_VERSION: u8 = 1;

/// The keyring: a current key and at most one previous key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Keyring {
    /// Record schema version, always `1`.
    pub v: u8,
    /// Key used for signing and tried first for verification.
    pub current: KeyMaterial,
    /// Key retired by the last rotation, tried second for verification.
    pub previous: Option<KeyMaterial>,
}

impl Keyring {
    /// Build a keyring around a fresh current key.
    #[must_use]
    pub fn new(current: KeyMaterial) -> Self {
        Self {
            v: KEYRING_VERSION,
            current,
            previous: None,
        }
    }

    /// Validate version and decode both keys.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::CorruptionDetected`] on a version mismatch
    /// or undecodable key material.
    pub fn validate(&self) -> Result<(), KeyringError> {
        if self.v != KEYRING_VERSION {
            return Err(KeyringError::CorruptionDetected {
                detail: format!("unsupported keyring version {}", self.v),
            });
        }
        self.current.raw()?;
        if let Some(previous) = &self.previous {
            previous.raw()?;
        }
        Ok(())
    }

    /// The rotated successor: previous ← current, current ← `fresh`.
    #[must_use]
    pub fn rotated(&self, fresh: KeyMaterial) -> Self {
        Self {
            v: KEYRING_VERSION,
            current: fresh,
            previous: Some(self.current.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// Persistence port for the keyring.
///
/// Absence is not an error: `load_or_create` mints a fresh keyring when
/// none is stored. Corruption is surfaced as data, never thrown.
#[async_trait::async_trait]
pub trait KeyringStore: Send + Sync {
    /// Load the stored keyring, creating and persisting one if absent.
    async fn load_or_create(&self) -> Result<Keyring, KeyringError>;

    /// Rotate: previous ← current, current ← fresh 32 bytes; persist.
    async fn rotate(&self) -> Result<Keyring, KeyringError>;
}
