// SPDX-License-Identifier: MIT OR Apache-2.0

//! Idempotency keys for append plans.

use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum dedupe key length in bytes.
pub const MAX_DEDUPE_KEY_LEN: usize = 256;

/// A caller-constructed idempotency key.
///
/// Grammar: ASCII `[a-z0-9_:>-]+`, at most 256 characters, composed as
/// `kind ':' part…` from identifiers that are stable at replay time. The
/// server-minted event id is deliberately not part of the grammar's
/// inputs: a replayed plan must produce the same key even though it would
/// mint a different event id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DedupeKey(String);

impl DedupeKey {
    /// Validate a raw key.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DedupeKeyInvalid`] on an empty key, a key
    /// over 256 bytes, or any character outside `[a-z0-9_:>-]`.
    pub fn parse(raw: &str) -> Result<Self, SchemaError> {
        if raw.is_empty() {
            return Err(SchemaError::DedupeKeyInvalid {
                detail: "key is empty".to_string(),
            });
        }
        if raw.len() > MAX_DEDUPE_KEY_LEN {
            return Err(SchemaError::DedupeKeyInvalid {
                detail: format!("key is {} bytes, max {MAX_DEDUPE_KEY_LEN}", raw.len()),
            });
        }
        if let Some(bad) = raw
            .bytes()
            .find(|b| !matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'_' | b':' | b'>' | b'-'))
        {
            return Err(SchemaError::DedupeKeyInvalid {
                detail: format!("character {:?} outside [a-z0-9_:>-]", bad as char),
            });
        }
        Ok(Self(raw.to_string()))
    }

    /// Compose `kind ':' part…` from stable identifier parts.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DedupeKeyInvalid`] if the composed key
    /// violates the grammar (e.g. a part carries uppercase).
    ///
    /// # Examples
    ///
    /// ```
    /// use wr_event::DedupeKey;
    ///
    /// let key = DedupeKey::compose("advance_recorded", &["run_a", "node_b"]).unwrap();
    /// assert_eq!(key.as_str(), "advance_recorded:run_a:node_b");
    /// ```
    pub fn compose(kind: &str, parts: &[&str]) -> Result<Self, SchemaError> {
        let mut raw = String::from(kind);
        for part in parts {
            raw.push(':');
            raw.push_str(part);
        }
        Self::parse(&raw)
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DedupeKey {
    type Error = SchemaError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<DedupeKey> for String {
    fn from(key: DedupeKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_full_charset() {
        DedupeKey::parse("gap_recorded:run-1:a>b_c").unwrap();
    }

    #[test]
    fn rejects_uppercase_and_spaces() {
        assert!(DedupeKey::parse("Advance:x").is_err());
        assert!(DedupeKey::parse("advance :x").is_err());
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert!(DedupeKey::parse("").is_err());
        assert!(DedupeKey::parse(&"a".repeat(257)).is_err());
        DedupeKey::parse(&"a".repeat(256)).unwrap();
    }

    #[test]
    fn compose_joins_with_colons() {
        let key = DedupeKey::compose("context_set", &["run_x"]).unwrap();
        assert_eq!(key.as_str(), "context_set:run_x");
    }
}
