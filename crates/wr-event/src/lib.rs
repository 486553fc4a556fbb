// SPDX-License-Identifier: MIT OR Apache-2.0
//! Closed-set schemas for everything the WorkRail core persists.
//!
//! Domain events, blockers, execution snapshots, manifest records, append
//! plans, and compiled-workflow snapshots all live here as validated
//! types. Wire forms are camelCase JSON; every record and per-kind data
//! payload rejects unknown keys, so a schema drift is caught at the
//! boundary instead of surfacing as replay divergence later.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod blocker;
mod dedupe;
mod event;
mod manifest;
pub mod schema;
mod snapshot;
mod workflow;

pub use blocker::{BlockReason, BlockedSnapshot, Blocker, BlockerCode, BlockerPointer};
pub use dedupe::DedupeKey;
pub use event::{
    AdvanceOutcome, AdvanceRecordedData, ContextSetData, DecisionTraceAppendedData, DomainEvent,
    EVENT_SCHEMA_VERSION, EdgeCreatedData, EdgeKind, EventBody, EventKind, EventScope,
    FunctionDef, GapCategory, GapRecordedData, GapSeverity, GapStatus, NodeCreatedData,
    NodeOutputAppendedData, ObservationRecordedData, OutputChannel, PreferenceAutonomy,
    PreferenceSet, PreferencesChangedData, RiskPolicy, RunStartedData, SessionCreatedData,
};
pub use manifest::{AppendPlan, ManifestRecord};
pub use snapshot::{
    CompletedSet, EnginePayload, EngineState, ExecutionSnapshot, LoopFrame, LoopPathFrame,
    PendingStep, SetTag, SnapshotKindTag, StepInstanceKey,
};
pub use workflow::{CompiledStep, CompiledWorkflow};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from schema validation of persisted values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// A record carries an unsupported schema version.
    #[error("unsupported schema version {found} for {record}")]
    VersionUnsupported {
        /// Record family, e.g. `"domain_event"`.
        record: &'static str,
        /// The rejected version.
        found: u8,
    },

    /// An event data payload does not match its kind's schema.
    #[error("event data does not match kind '{kind}': {detail}")]
    DataMismatch {
        /// The event kind whose schema was violated.
        kind: String,
        /// Underlying serde detail.
        detail: String,
    },

    /// A dedupe key violates the grammar `[a-z0-9_:>-]+` (≤ 256 chars).
    #[error("invalid dedupe key: {detail}")]
    DedupeKeyInvalid {
        /// What was violated.
        detail: String,
    },

    /// A bounded text field exceeds its byte budget.
    #[error("{field} is {actual} bytes, budget {budget}")]
    TextBoundExceeded {
        /// The field name.
        field: &'static str,
        /// Allowed bytes.
        budget: usize,
        /// Observed bytes.
        actual: usize,
    },

    /// A blocked snapshot mixes retryable and terminal shape.
    #[error("invalid blocked snapshot: {detail}")]
    BlockedSnapshotInvalid {
        /// What was violated.
        detail: String,
    },

    /// An execution snapshot violates its engine-state invariants.
    #[error("invalid execution snapshot: {detail}")]
    SnapshotStateInvalid {
        /// What was violated.
        detail: String,
    },

    /// A manifest record mixes fields across kinds.
    #[error("invalid manifest record: {detail}")]
    ManifestRecordInvalid {
        /// What was violated.
        detail: String,
    },

    /// A step instance key violates its grammar.
    #[error("invalid step instance key: {literal}")]
    StepKeyInvalid {
        /// The rejected literal.
        literal: String,
    },
}

impl SchemaError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::VersionUnsupported { .. } => "SCHEMA_VERSION_UNSUPPORTED",
            Self::DataMismatch { .. } => "SCHEMA_DATA_MISMATCH",
            Self::DedupeKeyInvalid { .. } => "DEDUPE_KEY_INVALID",
            Self::TextBoundExceeded { .. } => "TEXT_BOUND_EXCEEDED",
            Self::BlockedSnapshotInvalid { .. } => "BLOCKED_SNAPSHOT_INVALID",
            Self::SnapshotStateInvalid { .. } => "SNAPSHOT_STATE_INVALID",
            Self::ManifestRecordInvalid { .. } => "MANIFEST_RECORD_INVALID",
            Self::StepKeyInvalid { .. } => "STEP_KEY_INVALID",
        }
    }
}
