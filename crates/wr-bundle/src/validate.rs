// SPDX-License-Identifier: MIT OR Apache-2.0

//! Four-phase bundle validation.
//!
//! Phases run in locked order and the first failure wins:
//! 1. schema (shape and version),
//! 2. integrity (recomputed digests, path coverage),
//! 3. ordering (event and manifest indices),
//! 4. references (every snapshot ref and workflow hash resolves).

use crate::{BUNDLE_SCHEMA_VERSION, Bundle, BundleError};
use std::collections::BTreeMap;
use wr_event::{AdvanceOutcome, EventBody, ManifestRecord};

/// Validate a raw JSON document as a bundle.
///
/// # Errors
///
/// The phase-specific [`BundleError`]; see the module docs for the
/// ordering guarantee.
pub fn validate_bundle(value: &serde_json::Value) -> Result<Bundle, BundleError> {
    // -- Phase 1: schema -------------------------------------------------
    let object = value.as_object().ok_or_else(|| BundleError::InvalidFormat {
        detail: "bundle is not a JSON object".to_string(),
    })?;
    let version = object
        .get("bundleSchemaVersion")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| BundleError::InvalidFormat {
            detail: "bundleSchemaVersion is missing or not a number".to_string(),
        })?;
    if version != u64::from(BUNDLE_SCHEMA_VERSION) {
        return Err(BundleError::UnsupportedVersion { found: version });
    }
    let bundle: Bundle =
        serde_json::from_value(value.clone()).map_err(|e| BundleError::InvalidFormat {
            detail: e.to_string(),
        })?;

    // -- Phase 2: integrity ----------------------------------------------
    verify_integrity(&bundle)?;

    // -- Phase 3: ordering -----------------------------------------------
    for (i, event) in bundle.session.events.iter().enumerate() {
        if event.event_index.value() != i as u64 {
            return Err(BundleError::EventOrderInvalid {
                detail: format!(
                    "event at position {i} has index {}",
                    event.event_index
                ),
            });
        }
    }
    for (i, record) in bundle.session.manifest.iter().enumerate() {
        if record.manifest_index().value() != i as u64 {
            return Err(BundleError::ManifestOrderInvalid {
                detail: format!(
                    "manifest record at position {i} has index {}",
                    record.manifest_index()
                ),
            });
        }
    }

    // -- Phase 4: references ---------------------------------------------
    verify_references(&bundle)?;

    Ok(bundle)
}

fn verify_integrity(bundle: &Bundle) -> Result<(), BundleError> {
    // Canonical bytes of every component the table may reference.
    let mut components: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    components.insert(
        "session/events".to_string(),
        canonical_of(&bundle.session.events)?,
    );
    components.insert(
        "session/manifest".to_string(),
        canonical_of(&bundle.session.manifest)?,
    );
    for (snapshot_ref, snapshot) in &bundle.snapshots {
        components.insert(
            format!("snapshots/{snapshot_ref}"),
            snapshot.canonical_bytes(),
        );
    }
    for (hash, workflow) in &bundle.pinned_workflows {
        components.insert(
            format!("pinnedWorkflows/{hash}"),
            workflow.canonical_bytes(),
        );
    }

    let mut covered: BTreeMap<&str, bool> =
        components.keys().map(|k| (k.as_str(), false)).collect();

    for entry in &bundle.integrity.entries {
        let Some(bytes) = components.get(&entry.path) else {
            return Err(BundleError::IntegrityFailed {
                detail: format!("entry references unknown path '{}'", entry.path),
            });
        };
        if wr_codec::sha256_digest(bytes) != entry.sha256 {
            return Err(BundleError::IntegrityFailed {
                detail: format!("digest mismatch at '{}'", entry.path),
            });
        }
        if bytes.len() as u64 != entry.bytes {
            return Err(BundleError::IntegrityFailed {
                detail: format!("byte length mismatch at '{}'", entry.path),
            });
        }
        covered.insert(entry.path.as_str(), true);
    }

    if let Some((path, _)) = covered.iter().find(|(_, seen)| !**seen) {
        return Err(BundleError::IntegrityFailed {
            detail: format!("component '{path}' has no integrity entry"),
        });
    }
    Ok(())
}

fn verify_references(bundle: &Bundle) -> Result<(), BundleError> {
    let has_snapshot = |r: &wr_codec::SnapshotRef| bundle.snapshots.contains_key(&r.to_string());
    let missing_snapshot = |r: &wr_codec::SnapshotRef| BundleError::MissingSnapshot {
        snapshot_ref: r.to_string(),
    };

    for event in &bundle.session.events {
        match &event.body {
            EventBody::RunStarted(data) => {
                if !bundle
                    .pinned_workflows
                    .contains_key(&data.workflow_hash.to_string())
                {
                    return Err(BundleError::MissingPinnedWorkflow {
                        workflow_hash: data.workflow_hash.to_string(),
                    });
                }
            }
            EventBody::NodeCreated(data) => {
                if !has_snapshot(&data.snapshot_ref) {
                    return Err(missing_snapshot(&data.snapshot_ref));
                }
            }
            EventBody::AdvanceRecorded(data) => {
                if let AdvanceOutcome::Advanced { snapshot_ref, .. } = &data.outcome {
                    if !has_snapshot(snapshot_ref) {
                        return Err(missing_snapshot(snapshot_ref));
                    }
                }
            }
            _ => {}
        }
    }
    for record in &bundle.session.manifest {
        if let ManifestRecord::SnapshotPinned { snapshot_ref, .. } = record {
            if !has_snapshot(snapshot_ref) {
                return Err(missing_snapshot(snapshot_ref));
            }
        }
    }
    Ok(())
}

fn canonical_of<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, BundleError> {
    let value = serde_json::to_value(value).map_err(|e| BundleError::IntegrityFailed {
        detail: format!("component does not serialize: {e}"),
    })?;
    wr_codec::canonical_json(&value).map_err(|e| BundleError::IntegrityFailed {
        detail: format!("component does not canonicalize: {e}"),
    })
}
