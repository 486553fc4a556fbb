// SPDX-License-Identifier: MIT OR Apache-2.0
//! Branded identifiers for the WorkRail core.
//!
//! Every identifier follows the grammar `<prefix>_<base32-lower>{26}` and
//! carries 128 bits of entropy. Each id kind is its own type, so passing a
//! [`RunId`] where a [`NodeId`] is expected fails at compile time rather
//! than at replay time.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod factory;
mod index;

pub use factory::{EntropySource, IdFactory, OsEntropy};
pub use index::{EventIndex, ManifestIndex};

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from identifier parsing and minting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The literal does not match `<prefix>_<base32-lower>{26}`.
    #[error("invalid {expected_prefix} identifier: {literal}")]
    InvalidFormat {
        /// Prefix the caller expected.
        expected_prefix: &'static str,
        /// The rejected literal.
        literal: String,
    },

    /// The entropy source returned fewer than 16 bytes, or stalled.
    #[error("entropy source exhausted")]
    EntropyExhausted,
}

impl IdError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFormat { .. } => "ID_INVALID_FORMAT",
            Self::EntropyExhausted => "ENTROPY_EXHAUSTED",
        }
    }
}

// ---------------------------------------------------------------------------
// Branded id trait + macro
// ---------------------------------------------------------------------------

/// Common surface of every branded identifier type.
pub trait BrandedId: Sized + Clone + fmt::Display {
    /// The semantic prefix, e.g. `"run"`.
    const PREFIX: &'static str;

    /// Build an identifier from 16 bytes of entropy.
    fn from_entropy(entropy: [u8; 16]) -> Self;

    /// Parse a literal, validating prefix and suffix grammar.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidFormat`] on any grammar violation.
    fn parse(literal: &str) -> Result<Self, IdError>;

    /// The identifier as a string slice.
    fn as_str(&self) -> &str;

    /// Decode the 16 entropy bytes back out of the suffix.
    fn entropy(&self) -> [u8; 16];
}

/// Length of the base32 suffix carrying 128 bits of entropy.
const SUFFIX_LEN: usize = 26;

fn validate_literal(literal: &str, prefix: &'static str) -> Result<(), IdError> {
    let invalid = || IdError::InvalidFormat {
        expected_prefix: prefix,
        literal: literal.to_string(),
    };
    let suffix = literal
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('_'))
        .ok_or_else(invalid)?;
    if suffix.len() != SUFFIX_LEN {
        return Err(invalid());
    }
    let decoded = wr_codec::base32::decode(suffix).map_err(|_| invalid())?;
    if decoded.len() != 16 {
        return Err(invalid());
    }
    Ok(())
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl BrandedId for $name {
            const PREFIX: &'static str = $prefix;

            fn from_entropy(entropy: [u8; 16]) -> Self {
                Self(format!("{}_{}", $prefix, wr_codec::base32::encode(&entropy)))
            }

            fn parse(literal: &str) -> Result<Self, IdError> {
                validate_literal(literal, $prefix)?;
                Ok(Self(literal.to_string()))
            }

            fn as_str(&self) -> &str {
                &self.0
            }

            fn entropy(&self) -> [u8; 16] {
                // The suffix was validated on construction.
                let suffix = &self.0[$prefix.len() + 1..];
                let decoded = wr_codec::base32::decode(suffix).unwrap_or_default();
                let mut out = [0u8; 16];
                if decoded.len() == 16 {
                    out.copy_from_slice(&decoded);
                }
                out
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$name as BrandedId>::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                <$name as BrandedId>::parse(&s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Identifier of a session (one durable event log).
    SessionId,
    "sess"
);
define_id!(
    /// Identifier of a run inside a session.
    RunId,
    "run"
);
define_id!(
    /// Identifier of a node in a run's DAG.
    NodeId,
    "node"
);
define_id!(
    /// Server-minted identifier of a single event.
    EventId,
    "evt"
);
define_id!(
    /// Identifier of one advance attempt at a node.
    AttemptId,
    "att"
);
define_id!(
    /// Identifier of an appended node output.
    OutputId,
    "out"
);
