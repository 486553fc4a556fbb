// SPDX-License-Identifier: MIT OR Apache-2.0

//! SHA-256 digest literals of the form `sha256:<64 lowercase hex>`.

use crate::CodecError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A validated `sha256:<hex>` digest literal.
///
/// The inner bytes are the raw 32-byte digest; the string form is produced
/// on demand. Digests order lexicographically, which matches the ordering
/// of their string forms.
///
/// # Examples
///
/// ```
/// let d = wr_codec::sha256_digest(b"hello");
/// assert!(d.to_string().starts_with("sha256:2cf24dba"));
/// assert_eq!(d.to_string().parse::<wr_codec::Sha256Digest>().unwrap(), d);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha256Digest([u8; 32]);

/// Digest of a compiled workflow, used to key the pinned workflow store.
pub type WorkflowHash = Sha256Digest;

/// Content address of an execution snapshot.
pub type SnapshotRef = Sha256Digest;

impl Sha256Digest {
    /// Wrap raw digest bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw 32 digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex of the digest, without the `sha256:` prefix.
    #[must_use]
    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The two-character shard prefix used for on-disk fan-out.
    #[must_use]
    pub fn shard(&self) -> String {
        hex::encode(&self.0[..1])
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.hex())
    }
}

impl FromStr for Sha256Digest {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CodecError::DigestInvalidFormat {
            literal: s.to_string(),
        };
        let hex_part = s.strip_prefix("sha256:").ok_or_else(invalid)?;
        if hex_part.len() != 64 || !hex_part.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            return Err(invalid());
        }
        let raw = hex::decode(hex_part).map_err(|_| invalid())?;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&raw);
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for Sha256Digest {
    type Error = CodecError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Sha256Digest> for String {
    fn from(d: Sha256Digest) -> Self {
        d.to_string()
    }
}

/// Hash bytes with SHA-256 and return the digest literal.
#[must_use]
pub fn sha256_digest(bytes: &[u8]) -> Sha256Digest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Sha256Digest(hasher.finalize().into())
}
