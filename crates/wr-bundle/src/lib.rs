// SPDX-License-Identifier: MIT OR Apache-2.0
//! Session export bundles.
//!
//! A bundle round-trips an entire session — events, manifest, snapshots,
//! pinned workflows — as one deterministic JSON document with an
//! integrity table over every content-addressed part. Building is
//! deterministic in field order and integrity-entry order; validation is
//! a single function whose four phases (schema, integrity, ordering,
//! references) run in locked order with the first failure winning.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod build;
mod validate;

pub use build::{BundleParams, build_bundle, serialize_bundle};
pub use validate::validate_bundle;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use wr_event::{CompiledWorkflow, DomainEvent, ExecutionSnapshot, ManifestRecord};
use wr_ident::SessionId;

/// The only supported bundle schema version.
pub const BUNDLE_SCHEMA_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from bundle validation, one per phase outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BundleError {
    /// Phase 1: the input is not a bundle-shaped object.
    #[error("bundle format invalid: {detail}")]
    InvalidFormat {
        /// What failed to parse.
        detail: String,
    },

    /// Phase 1: the schema version is not supported.
    #[error("unsupported bundle schema version {found}")]
    UnsupportedVersion {
        /// The version found.
        found: u64,
    },

    /// Phase 2: a digest or byte length does not match, a referenced path
    /// is unknown, or a component is not covered.
    #[error("bundle integrity failed: {detail}")]
    IntegrityFailed {
        /// What failed.
        detail: String,
    },

    /// Phase 3: event indices are not strictly monotonic from zero.
    #[error("bundle event order invalid: {detail}")]
    EventOrderInvalid {
        /// What failed.
        detail: String,
    },

    /// Phase 3: manifest indices are not strictly monotonic from zero.
    #[error("bundle manifest order invalid: {detail}")]
    ManifestOrderInvalid {
        /// What failed.
        detail: String,
    },

    /// Phase 4: an event references a snapshot the bundle does not carry.
    #[error("bundle is missing snapshot {snapshot_ref}")]
    MissingSnapshot {
        /// The missing ref.
        snapshot_ref: String,
    },

    /// Phase 4: an event references a workflow the bundle does not carry.
    #[error("bundle is missing pinned workflow {workflow_hash}")]
    MissingPinnedWorkflow {
        /// The missing hash.
        workflow_hash: String,
    },
}

impl BundleError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFormat { .. } => "BUNDLE_INVALID_FORMAT",
            Self::UnsupportedVersion { .. } => "BUNDLE_UNSUPPORTED_VERSION",
            Self::IntegrityFailed { .. } => "BUNDLE_INTEGRITY_FAILED",
            Self::EventOrderInvalid { .. } => "BUNDLE_EVENT_ORDER_INVALID",
            Self::ManifestOrderInvalid { .. } => "BUNDLE_MANIFEST_ORDER_INVALID",
            Self::MissingSnapshot { .. } => "BUNDLE_MISSING_SNAPSHOT",
            Self::MissingPinnedWorkflow { .. } => "BUNDLE_MISSING_PINNED_WORKFLOW",
        }
    }
}

// ---------------------------------------------------------------------------
// Bundle document
// ---------------------------------------------------------------------------

/// Who produced a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Producer {
    /// Application version string.
    pub app_version: String,
}

/// The exported session: events plus manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BundleSession {
    /// The exported session's id (import mints a fresh one).
    pub session_id: SessionId,
    /// All events in index order.
    pub events: Vec<DomainEvent>,
    /// All manifest records in index order.
    pub manifest: Vec<ManifestRecord>,
}

/// One integrity table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IntegrityEntry {
    /// Component path, `/`-separated (e.g. `snapshots/sha256:…`).
    pub path: String,
    /// Digest of the component's canonical bytes.
    pub sha256: wr_codec::Sha256Digest,
    /// Length of the canonical bytes.
    pub bytes: u64,
}

/// The integrity table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Integrity {
    /// Entries sorted by path.
    pub entries: Vec<IntegrityEntry>,
}

/// A full session export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Bundle {
    /// Always `1`.
    pub bundle_schema_version: u8,
    /// Caller-supplied bundle identifier.
    pub bundle_id: String,
    /// Producer stamp.
    pub producer: Producer,
    /// The exported session.
    pub session: BundleSession,
    /// Execution snapshots keyed by their `sha256:<hex>` ref.
    pub snapshots: BTreeMap<String, ExecutionSnapshot>,
    /// Compiled workflows keyed by their `sha256:<hex>` hash.
    pub pinned_workflows: BTreeMap<String, CompiledWorkflow>,
    /// Integrity table over every component above.
    pub integrity: Integrity,
}
