// SPDX-License-Identifier: MIT OR Apache-2.0
//! Durable per-session storage for the WorkRail core.
//!
//! Three stores share one data directory:
//!
//! - the session event-log store: append-only JSONL segments attested by
//!   a manifest, guarded by an exclusive lock file;
//! - the snapshot store: execution snapshots addressed by content hash;
//! - the pinned workflow store: compiled workflows keyed by their hash.
//!
//! Every mutation is temp-file + rename with fsync, so a crash leaves
//! either the old state or the new state, never a torn one. Reads come in
//! two strengths: strict (any defect is corruption) and validated-prefix
//! (return the longest good prefix plus a reason for the truncated tail).
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod lock;
mod pinned;
mod session;
mod snapshot_store;

pub use lock::{LockError, LockWitness, SessionLockGuard};
pub use pinned::PinnedWorkflowStore;
pub use session::{
    DEFAULT_SEGMENT_ROTATION_EVENTS, SessionStamp, SessionStore, ValidatedPrefix,
};
pub use snapshot_store::SnapshotStore;

use serde::{Deserialize, Serialize};
use wr_event::{DomainEvent, ManifestRecord};
use wr_ident::EventIndex;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the session event-log store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// An append violated a store invariant (bad witness, index gap,
    /// partial dedupe overlap). The log was not mutated.
    #[error("session store invariant violation: {detail}")]
    InvariantViolation {
        /// What was violated.
        detail: String,
    },

    /// The on-disk log is damaged: missing attested segment, digest
    /// mismatch, non-contiguous indices, or a schema violation.
    #[error("session store corruption detected: {detail}")]
    CorruptionDetected {
        /// What is damaged.
        detail: String,
    },

    /// A filesystem operation failed.
    #[error("session store io failed: {detail}")]
    Io {
        /// The underlying failure, rendered.
        detail: String,
    },
}

impl StoreError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvariantViolation { .. } => "SESSION_STORE_INVARIANT_VIOLATION",
            Self::CorruptionDetected { .. } => "SESSION_STORE_CORRUPTION_DETECTED",
            Self::Io { .. } => "SESSION_STORE_IO_FAILED",
        }
    }

    pub(crate) fn io(e: std::io::Error) -> Self {
        Self::Io {
            detail: e.to_string(),
        }
    }
}

/// Errors from the snapshot store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotStoreError {
    /// Stored bytes do not hash to the address they live under, or do not
    /// parse as a snapshot.
    #[error("snapshot store corruption detected: {detail}")]
    CorruptionDetected {
        /// What is damaged.
        detail: String,
    },

    /// The snapshot being stored violates its own invariants.
    #[error("snapshot rejected: {detail}")]
    InvalidSnapshot {
        /// What was violated.
        detail: String,
    },

    /// A filesystem operation failed.
    #[error("snapshot store io failed: {detail}")]
    Io {
        /// The underlying failure, rendered.
        detail: String,
    },
}

impl SnapshotStoreError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CorruptionDetected { .. } => "SNAPSHOT_STORE_CORRUPTION_DETECTED",
            Self::InvalidSnapshot { .. } => "SNAPSHOT_STORE_INVALID_SNAPSHOT",
            Self::Io { .. } => "SNAPSHOT_STORE_IO_FAILED",
        }
    }
}

/// Errors from the pinned workflow store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PinnedStoreError {
    /// Stored bytes do not hash to the key they live under, or do not
    /// parse as a compiled workflow.
    #[error("pinned workflow store corruption detected: {detail}")]
    CorruptionDetected {
        /// What is damaged.
        detail: String,
    },

    /// A filesystem operation failed.
    #[error("pinned workflow store io failed: {detail}")]
    Io {
        /// The underlying failure, rendered.
        detail: String,
    },
}

impl PinnedStoreError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CorruptionDetected { .. } => "PINNED_STORE_CORRUPTION_DETECTED",
            Self::Io { .. } => "PINNED_STORE_IO_FAILED",
        }
    }
}

// ---------------------------------------------------------------------------
// Tail reasons + loaded log
// ---------------------------------------------------------------------------

/// Why a validated prefix stops short of the full log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TailReason {
    /// The manifest attests a segment whose file is gone.
    MissingAttestedSegment,
    /// Event indices skip or repeat.
    NonContiguousIndices,
    /// Segment bytes do not hash to the attested digest.
    DigestMismatch,
    /// A line does not parse as a valid record.
    SchemaViolation,
}

impl TailReason {
    /// The wire tag, e.g. `"digest_mismatch"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingAttestedSegment => "missing_attested_segment",
            Self::NonContiguousIndices => "non_contiguous_indices",
            Self::DigestMismatch => "digest_mismatch",
            Self::SchemaViolation => "schema_violation",
        }
    }
}

/// The loaded truth of a session: events plus manifest.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionLog {
    /// All events, ordered by index.
    pub events: Vec<DomainEvent>,
    /// All manifest records, ordered by index.
    pub manifest: Vec<ManifestRecord>,
}

impl SessionLog {
    /// Index of the last event, if any.
    #[must_use]
    pub fn last_event_index(&self) -> Option<EventIndex> {
        self.events.last().map(|e| e.event_index)
    }

    /// All dedupe keys already in the log.
    #[must_use]
    pub fn dedupe_keys(&self) -> std::collections::BTreeSet<&wr_event::DedupeKey> {
        self.events.iter().map(|e| &e.dedupe_key).collect()
    }
}
