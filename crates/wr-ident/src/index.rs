// SPDX-License-Identifier: MIT OR Apache-2.0

//! Monotonic per-session indices.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of an event within a session log. Contiguous from zero.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EventIndex(u64);

/// Position of a record within a session manifest. Contiguous from zero.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ManifestIndex(u64);

macro_rules! index_impl {
    ($name:ident) => {
        impl $name {
            /// Index zero.
            pub const ZERO: Self = Self(0);

            /// Wrap a raw index value.
            #[must_use]
            pub fn new(value: u64) -> Self {
                Self(value)
            }

            /// The raw index value.
            #[must_use]
            pub fn value(&self) -> u64 {
                self.0
            }

            /// The next index in sequence.
            #[must_use]
            pub fn next(&self) -> Self {
                Self(self.0 + 1)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

index_impl!(EventIndex);
index_impl!(ManifestIndex);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_is_monotonic() {
        let idx = EventIndex::ZERO;
        assert_eq!(idx.next().value(), 1);
        assert!(idx < idx.next());
    }

    #[test]
    fn serde_is_transparent() {
        let idx = ManifestIndex::new(5);
        assert_eq!(serde_json::to_string(&idx).unwrap(), "5");
    }
}
