// SPDX-License-Identifier: MIT OR Apache-2.0
//! Keyed progress tokens.
//!
//! A token is the externalized position of a workflow: a 66-byte binary
//! payload (version, kind, four 16-byte slots) signed with HMAC-SHA-256
//! and carried as a bech32m string whose human-readable part names the
//! token kind (`st`, `ack`, `chk`). All progress state lives in tokens and
//! the event log — the server keeps nothing else.
//!
//! Signing is deterministic, parsing is pure, and verification compares
//! signatures in constant time against the current key and then the
//! previous one, so rotation never invalidates tokens in flight.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod payload;

pub use payload::{TOKEN_PAYLOAD_LEN, TOKEN_VERSION, TokenKind, TokenPayload};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use wr_keyring::{KeyMaterial, Keyring, KeyringError};

type HmacSha256 = Hmac<Sha256>;

/// Length of the HMAC-SHA-256 signature carried on the wire.
pub const TOKEN_SIGNATURE_LEN: usize = 32;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from token signing, parsing, and verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The string is not a structurally valid token: unknown prefix, failed
    /// bech32m checksum, or a malformed payload.
    #[error("invalid token format: {detail}")]
    InvalidFormat {
        /// What failed structurally.
        detail: String,
    },

    /// The payload is well-formed but no keyring key authenticates it.
    #[error("token signature verification failed")]
    BadSignature,

    /// The human-readable part and the payload kind byte disagree.
    #[error("token kind mismatch between prefix and payload")]
    KindMismatch,

    /// The keyring itself could not provide usable key material.
    #[error(transparent)]
    Keyring(#[from] KeyringError),
}

impl TokenError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFormat { .. } => "TOKEN_INVALID_FORMAT",
            Self::BadSignature => "TOKEN_BAD_SIGNATURE",
            Self::KindMismatch => "TOKEN_KIND_MISMATCH",
            Self::Keyring(e) => e.code(),
        }
    }

    fn invalid(detail: impl Into<String>) -> Self {
        Self::InvalidFormat {
            detail: detail.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parsed token
// ---------------------------------------------------------------------------

/// A token split into its verified-shape parts, before any signature check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedToken {
    /// Kind named by the human-readable part (already cross-checked
    /// against the payload kind byte).
    pub kind: TokenKind,
    /// The 66 payload bytes.
    pub payload: Vec<u8>,
    /// The 32 signature bytes.
    pub signature: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Sign / parse / verify
// ---------------------------------------------------------------------------

/// Sign a payload with the keyring's current key.
///
/// Deterministic: the same payload under the same keyring yields a
/// byte-identical token.
///
/// # Errors
///
/// Returns [`TokenError::Keyring`] if the current key material is
/// unusable, or [`TokenError::InvalidFormat`] if encoding fails.
pub fn sign(payload: &TokenPayload, keyring: &Keyring) -> Result<String, TokenError> {
    let packed = payload.pack();
    let signature = mac_bytes(&keyring.current, &packed)?;
    let mut wire = Vec::with_capacity(packed.len() + signature.len());
    wire.extend_from_slice(&packed);
    wire.extend_from_slice(&signature);
    wr_codec::bech32m::encode(payload.kind().hrp(), &wire)
        .map_err(|e| TokenError::invalid(e.to_string()))
}

/// Parse a token string into its payload and signature parts.
///
/// Pure: no keys are consulted. Shape violations (unknown prefix, checksum
/// failure — including any single-character substitution — or a malformed
/// payload) are [`TokenError::InvalidFormat`]; a prefix that disagrees
/// with the payload kind byte is [`TokenError::KindMismatch`].
///
/// # Errors
///
/// See above; this function never panics on arbitrary input.
pub fn parse(token: &str) -> Result<ParsedToken, TokenError> {
    let (hrp, bytes) =
        wr_codec::bech32m::decode(token).map_err(|e| TokenError::invalid(e.to_string()))?;
    let kind = TokenKind::from_hrp(&hrp)
        .ok_or_else(|| TokenError::invalid(format!("unknown token prefix '{hrp}1'")))?;

    let expected = TOKEN_PAYLOAD_LEN + TOKEN_SIGNATURE_LEN;
    if bytes.len() != expected {
        return Err(TokenError::invalid(format!(
            "token carries {} bytes, expected {expected}",
            bytes.len()
        )));
    }
    let (payload, signature) = bytes.split_at(TOKEN_PAYLOAD_LEN);

    if payload[0] != TOKEN_VERSION {
        return Err(TokenError::invalid(format!(
            "unsupported token version {}",
            payload[0]
        )));
    }
    let payload_kind = TokenKind::from_byte(payload[1])
        .ok_or_else(|| TokenError::invalid(format!("unknown token kind byte {}", payload[1])))?;
    if payload_kind != kind {
        return Err(TokenError::KindMismatch);
    }

    Ok(ParsedToken {
        kind,
        payload: payload.to_vec(),
        signature: signature.to_vec(),
    })
}

/// Verify a parsed token against the keyring and decode its payload.
///
/// The recomputed HMAC is compared in constant time, first with the
/// current key and then with the previous one if present. The error never
/// says which key failed.
///
/// # Errors
///
/// [`TokenError::BadSignature`] if no key authenticates the payload;
/// [`TokenError::Keyring`] if key material is unusable;
/// [`TokenError::InvalidFormat`] if the authenticated payload does not
/// unpack.
pub fn verify(parsed: &ParsedToken, keyring: &Keyring) -> Result<TokenPayload, TokenError> {
    let mut authenticated = signature_matches(&keyring.current, parsed)?;
    if !authenticated {
        if let Some(previous) = &keyring.previous {
            authenticated = signature_matches(previous, parsed)?;
        }
    }
    if !authenticated {
        return Err(TokenError::BadSignature);
    }
    TokenPayload::unpack(&parsed.payload)
}

fn signature_matches(key: &KeyMaterial, parsed: &ParsedToken) -> Result<bool, TokenError> {
    let expected = mac_bytes(key, &parsed.payload)?;
    Ok(expected.ct_eq(parsed.signature.as_slice()).into())
}

fn mac_bytes(key: &KeyMaterial, payload: &[u8]) -> Result<[u8; TOKEN_SIGNATURE_LEN], TokenError> {
    let raw = key.raw()?;
    let mut mac = HmacSha256::new_from_slice(&raw).map_err(|_| KeyringError::CorruptionDetected {
        detail: "hmac rejected key material".to_string(),
    })?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().into())
}
