// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical byte encodings for the WorkRail core.
//!
//! Everything that is hashed, signed, or content-addressed flows through
//! this crate: canonical JSON serialization, SHA-256 digests, base32-lower
//! identifiers, bech32m token strings, base64url key material, and bounded
//! binary reads for fixed-width payloads.
//!
//! Every function here is pure and deterministic: equal inputs produce
//! byte-identical outputs on every platform.
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod base32;
pub mod base64url;
pub mod bech32m;
pub mod binary;
mod canonical;
mod digest;

pub use binary::ByteReader;
pub use canonical::{canonical_json, canonical_json_string};
pub use digest::{Sha256Digest, SnapshotRef, WorkflowHash, sha256_digest};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the canonical codec layer.
///
/// Each variant carries a stable code retrievable via [`CodecError::code`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// A number in the value is NaN or infinite and cannot be canonicalized.
    #[error("non-finite number cannot be canonicalized")]
    CanonicalNonFiniteNumber,

    /// A digest string does not match `sha256:<64 lowercase hex>`.
    #[error("invalid digest literal: {literal}")]
    DigestInvalidFormat {
        /// The offending literal.
        literal: String,
    },

    /// A base32 string contains a byte outside the lowercase RFC 4648 alphabet.
    #[error("invalid base32 character at offset {offset}")]
    Base32InvalidCharacter {
        /// Byte offset of the offending character.
        offset: usize,
    },

    /// A base32 string has a length no byte sequence encodes to.
    #[error("invalid base32 length: {len}")]
    Base32InvalidLength {
        /// Length of the rejected input.
        len: usize,
    },

    /// A base32 string carries non-zero bits past the final full byte.
    #[error("base32 trailing bits are not zero")]
    Base32TrailingBits,

    /// The human-readable part is empty or contains invalid characters.
    #[error("invalid bech32m human-readable part: {hrp}")]
    Bech32mInvalidHrp {
        /// The rejected hrp.
        hrp: String,
    },

    /// The string failed bech32m decoding (bad charset, mixed case, or a
    /// checksum mismatch — including any single-character substitution).
    #[error("bech32m checksum verification failed")]
    Bech32mChecksumFailed,

    /// A base64url string contains padding or non-alphabet bytes.
    #[error("invalid base64url input")]
    Base64UrlInvalid,

    /// A bounded read was asked for more bytes than remain.
    #[error("binary read of {needed} bytes exceeds {remaining} remaining")]
    BinaryShortBuffer {
        /// Bytes the caller asked for.
        needed: usize,
        /// Bytes still available.
        remaining: usize,
    },

    /// A fixed-width payload left bytes unconsumed.
    #[error("{remaining} trailing bytes after fixed-width payload")]
    BinaryTrailingBytes {
        /// Bytes left over.
        remaining: usize,
    },
}

impl CodecError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CanonicalNonFiniteNumber => "CANONICAL_NON_FINITE_NUMBER",
            Self::DigestInvalidFormat { .. } => "DIGEST_INVALID_FORMAT",
            Self::Base32InvalidCharacter { .. } => "BASE32_INVALID_CHARACTER",
            Self::Base32InvalidLength { .. } => "BASE32_INVALID_LENGTH",
            Self::Base32TrailingBits => "BASE32_TRAILING_BITS",
            Self::Bech32mInvalidHrp { .. } => "BECH32M_INVALID_HRP",
            Self::Bech32mChecksumFailed => "BECH32M_CHECKSUM_FAILED",
            Self::Base64UrlInvalid => "BASE64URL_INVALID",
            Self::BinaryShortBuffer { .. } => "BINARY_SHORT_BUFFER",
            Self::BinaryTrailingBytes { .. } => "BINARY_TRAILING_BYTES",
        }
    }
}
