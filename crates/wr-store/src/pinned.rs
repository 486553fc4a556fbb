// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hash-keyed pinned workflow store.
//!
//! Identical in shape to the snapshot store but keyed by the
//! caller-supplied workflow hash: `put` is write-once, a repeat put of a
//! present hash is a no-op, and `get` verifies the stored bytes still
//! hash to the key.

use crate::PinnedStoreError;
use crate::snapshot_store::write_content;
use std::path::{Path, PathBuf};
use tracing::debug;
use wr_codec::WorkflowHash;
use wr_event::CompiledWorkflow;

/// Pinned workflow store rooted at `<dataDir>/pinnedWorkflows/`.
#[derive(Debug, Clone)]
pub struct PinnedWorkflowStore {
    root: PathBuf,
}

impl PinnedWorkflowStore {
    /// Build a store under the given data directory.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            root: data_dir.as_ref().join("pinnedWorkflows"),
        }
    }

    fn path_of(&self, hash: &WorkflowHash) -> PathBuf {
        self.root
            .join(hash.shard())
            .join(format!("{}.json", hash.hex()))
    }

    /// Pin a compiled workflow under `hash`. No-op when already present.
    ///
    /// # Errors
    ///
    /// [`PinnedStoreError::CorruptionDetected`] if `hash` is not the
    /// workflow's content hash; [`PinnedStoreError::Io`] on filesystem
    /// failure.
    pub async fn put(
        &self,
        hash: &WorkflowHash,
        workflow: &CompiledWorkflow,
    ) -> Result<(), PinnedStoreError> {
        if &workflow.content_hash() != hash {
            return Err(PinnedStoreError::CorruptionDetected {
                detail: format!("workflow does not hash to supplied key {hash}"),
            });
        }
        let path = self.path_of(hash);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }
        write_content(&path, &workflow.canonical_bytes())
            .await
            .map_err(|e| PinnedStoreError::Io {
                detail: e.to_string(),
            })?;
        debug!(target: "wr.pinned", workflow = %hash, "workflow pinned");
        Ok(())
    }

    /// Fetch a pinned workflow; `None` when absent.
    ///
    /// # Errors
    ///
    /// [`PinnedStoreError::CorruptionDetected`] when the stored bytes do
    /// not hash to the key or do not parse.
    pub async fn get(
        &self,
        hash: &WorkflowHash,
    ) -> Result<Option<CompiledWorkflow>, PinnedStoreError> {
        let path = self.path_of(hash);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PinnedStoreError::Io {
                    detail: e.to_string(),
                });
            }
        };
        let workflow: CompiledWorkflow = serde_json::from_slice(&bytes).map_err(|e| {
            PinnedStoreError::CorruptionDetected {
                detail: format!("pinned workflow {hash} does not parse: {e}"),
            }
        })?;
        if &workflow.content_hash() != hash {
            return Err(PinnedStoreError::CorruptionDetected {
                detail: format!("pinned workflow bytes do not hash to {hash}"),
            });
        }
        Ok(Some(workflow))
    }
}
