// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session export and import-as-new.

use crate::{Engine, EngineError};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::info;
use wr_bundle::{Bundle, BundleParams, Producer, build_bundle, validate_bundle};
use wr_codec::SnapshotRef;
use wr_event::{
    AdvanceOutcome, AppendPlan, CompiledWorkflow, EventBody, ExecutionSnapshot, ManifestRecord,
};
use wr_ident::SessionId;
use wr_store::{SessionLog, SnapshotStoreError};
use wr_telemetry::OpKind;

/// The result of an import: the fresh session plus the validated bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedSession {
    /// The freshly minted session id (never the exported one).
    pub session_id: SessionId,
    /// The validated bundle, for callers that need the source material.
    pub bundle: Bundle,
}

fn referenced_snapshots(log: &SessionLog) -> Vec<SnapshotRef> {
    let mut refs = std::collections::BTreeSet::new();
    for event in &log.events {
        match &event.body {
            EventBody::NodeCreated(data) => {
                refs.insert(data.snapshot_ref);
            }
            EventBody::AdvanceRecorded(data) => {
                if let AdvanceOutcome::Advanced { snapshot_ref, .. } = &data.outcome {
                    refs.insert(*snapshot_ref);
                }
            }
            _ => {}
        }
    }
    for record in &log.manifest {
        if let ManifestRecord::SnapshotPinned { snapshot_ref, .. } = record {
            refs.insert(*snapshot_ref);
        }
    }
    refs.into_iter().collect()
}

impl Engine {
    /// Export a session as a deterministic bundle.
    ///
    /// # Errors
    ///
    /// Store corruption, a referenced-but-absent snapshot or workflow,
    /// or bundle assembly failure, verbatim.
    pub async fn export_session(
        &self,
        session_id: &SessionId,
        bundle_id: impl Into<String>,
    ) -> Result<Bundle, EngineError> {
        let log = self.store.load(session_id).await?;

        let mut snapshots: BTreeMap<String, ExecutionSnapshot> = BTreeMap::new();
        for snapshot_ref in referenced_snapshots(&log) {
            let snapshot = self.snapshots.get(&snapshot_ref).await?.ok_or_else(|| {
                SnapshotStoreError::CorruptionDetected {
                    detail: format!("referenced snapshot {snapshot_ref} is absent"),
                }
            })?;
            snapshots.insert(snapshot_ref.to_string(), snapshot);
        }

        let mut pinned_workflows: BTreeMap<String, CompiledWorkflow> = BTreeMap::new();
        for event in &log.events {
            if let EventBody::RunStarted(data) = &event.body {
                let workflow = self.pinned.get(&data.workflow_hash).await?.ok_or_else(|| {
                    wr_store::PinnedStoreError::CorruptionDetected {
                        detail: format!(
                            "referenced pinned workflow {} is absent",
                            data.workflow_hash
                        ),
                    }
                })?;
                pinned_workflows.insert(data.workflow_hash.to_string(), workflow);
            }
        }

        Ok(build_bundle(BundleParams {
            bundle_id: bundle_id.into(),
            session_id: session_id.clone(),
            events: log.events,
            manifest: log.manifest,
            snapshots,
            pinned_workflows,
            producer: Producer {
                app_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        })?)
    }

    /// Import a bundle as a brand-new session.
    ///
    /// Validation runs first (all four phases); then a fresh session id
    /// is minted — the exported id is never reused — snapshots and
    /// pinned workflows are written, and the re-keyed events are
    /// persisted through the gate.
    ///
    /// # Errors
    ///
    /// [`EngineError::Bundle`] from validation, or any store failure
    /// during persistence, verbatim.
    pub async fn import_session(
        &self,
        bundle_document: &serde_json::Value,
    ) -> Result<ImportedSession, EngineError> {
        let started = Instant::now();
        let result = self.import_inner(bundle_document).await;
        self.metrics
            .record(OpKind::Import, started.elapsed(), result.is_ok());
        result
    }

    async fn import_inner(
        &self,
        bundle_document: &serde_json::Value,
    ) -> Result<ImportedSession, EngineError> {
        let bundle = validate_bundle(bundle_document)?;
        let fresh_session: SessionId = self.mint()?;

        for snapshot in bundle.snapshots.values() {
            self.snapshots.put(snapshot).await?;
        }
        for workflow in bundle.pinned_workflows.values() {
            self.pinned.put(&workflow.content_hash(), workflow).await?;
        }

        // Re-key: same events, same dedupe keys, fresh session identity.
        let mut events = bundle.session.events.clone();
        for event in &mut events {
            event.session_id = fresh_session.clone();
        }
        let snapshot_pins: Vec<SnapshotRef> = bundle
            .session
            .manifest
            .iter()
            .filter_map(|record| match record {
                ManifestRecord::SnapshotPinned { snapshot_ref, .. } => Some(*snapshot_ref),
                _ => None,
            })
            .collect();
        let plan = AppendPlan {
            events,
            snapshot_pins,
        };

        let store = self.store.clone();
        self.gate
            .with_healthy_session_lock::<_, EngineError, _, _>(&fresh_session, |witness, _log| {
                let plan = plan.clone();
                let store = store.clone();
                async move { Ok(store.append(&witness, &plan).await?) }
            })
            .await?;

        info!(
            target: "wr.engine",
            exported = %bundle.session.session_id,
            imported = %fresh_session,
            events = bundle.session.events.len(),
            "session imported as new"
        );
        Ok(ImportedSession {
            session_id: fresh_session,
            bundle,
        })
    }
}
