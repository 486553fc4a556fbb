// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic bundle assembly.

use crate::{
    BUNDLE_SCHEMA_VERSION, Bundle, BundleError, BundleSession, Integrity, IntegrityEntry,
    Producer,
};
use std::collections::BTreeMap;
use wr_event::{CompiledWorkflow, DomainEvent, ExecutionSnapshot, ManifestRecord};
use wr_ident::SessionId;

/// Everything a bundle is built from.
#[derive(Debug, Clone)]
pub struct BundleParams {
    /// Caller-supplied bundle identifier.
    pub bundle_id: String,
    /// The exported session.
    pub session_id: SessionId,
    /// All events in index order.
    pub events: Vec<DomainEvent>,
    /// All manifest records in index order.
    pub manifest: Vec<ManifestRecord>,
    /// Snapshots referenced by the events.
    pub snapshots: BTreeMap<String, ExecutionSnapshot>,
    /// Workflows referenced by the events.
    pub pinned_workflows: BTreeMap<String, CompiledWorkflow>,
    /// Producer stamp.
    pub producer: Producer,
}

fn canonical_of<T: serde::Serialize>(value: &T, what: &str) -> Result<Vec<u8>, BundleError> {
    let value = serde_json::to_value(value).map_err(|e| BundleError::InvalidFormat {
        detail: format!("serialize {what}: {e}"),
    })?;
    wr_codec::canonical_json(&value).map_err(|e| BundleError::InvalidFormat {
        detail: format!("canonicalize {what}: {e}"),
    })
}

fn entry_for(path: String, bytes: &[u8]) -> IntegrityEntry {
    IntegrityEntry {
        path,
        sha256: wr_codec::sha256_digest(bytes),
        bytes: bytes.len() as u64,
    }
}

/// Assemble a bundle with a complete, path-sorted integrity table.
///
/// The output is deterministic: equal inputs produce an equal bundle,
/// byte for byte once serialized with [`serialize_bundle`].
///
/// # Errors
///
/// [`BundleError::InvalidFormat`] only if a component fails to serialize,
/// which no validated component does.
pub fn build_bundle(params: BundleParams) -> Result<Bundle, BundleError> {
    let mut entries = Vec::with_capacity(2 + params.snapshots.len() + params.pinned_workflows.len());

    entries.push(entry_for(
        "session/events".to_string(),
        &canonical_of(&params.events, "events")?,
    ));
    entries.push(entry_for(
        "session/manifest".to_string(),
        &canonical_of(&params.manifest, "manifest")?,
    ));
    for (snapshot_ref, snapshot) in &params.snapshots {
        entries.push(entry_for(
            format!("snapshots/{snapshot_ref}"),
            &snapshot.canonical_bytes(),
        ));
    }
    for (hash, workflow) in &params.pinned_workflows {
        entries.push(entry_for(
            format!("pinnedWorkflows/{hash}"),
            &workflow.canonical_bytes(),
        ));
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(Bundle {
        bundle_schema_version: BUNDLE_SCHEMA_VERSION,
        bundle_id: params.bundle_id,
        producer: params.producer,
        session: BundleSession {
            session_id: params.session_id,
            events: params.events,
            manifest: params.manifest,
        },
        snapshots: params.snapshots,
        pinned_workflows: params.pinned_workflows,
        integrity: Integrity { entries },
    })
}

/// The canonical byte serialization of a bundle document.
///
/// # Errors
///
/// [`BundleError::InvalidFormat`] only on a serialization failure.
pub fn serialize_bundle(bundle: &Bundle) -> Result<Vec<u8>, BundleError> {
    canonical_of(bundle, "bundle")
}
