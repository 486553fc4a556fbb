// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content-addressed execution snapshot store.
//!
//! `put` is idempotent by construction: equal snapshots canonicalize to
//! equal bytes, hash to the same ref, and land on the same path. A late
//! concurrent writer of the same content is a no-op.

use crate::SnapshotStoreError;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use wr_codec::SnapshotRef;
use wr_event::ExecutionSnapshot;

/// Snapshot store rooted at `<dataDir>/snapshots/`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    /// Build a store under the given data directory.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            root: data_dir.as_ref().join("snapshots"),
        }
    }

    fn path_of(&self, snapshot_ref: &SnapshotRef) -> PathBuf {
        self.root
            .join(snapshot_ref.shard())
            .join(format!("{}.json", snapshot_ref.hex()))
    }

    /// Store a snapshot, returning its content address.
    ///
    /// Writing content that is already present is a successful no-op.
    ///
    /// # Errors
    ///
    /// [`SnapshotStoreError::InvalidSnapshot`] if the snapshot violates
    /// its own invariants; [`SnapshotStoreError::Io`] on filesystem
    /// failure.
    pub async fn put(
        &self,
        snapshot: &ExecutionSnapshot,
    ) -> Result<SnapshotRef, SnapshotStoreError> {
        snapshot
            .validate()
            .map_err(|e| SnapshotStoreError::InvalidSnapshot {
                detail: e.to_string(),
            })?;
        let bytes = snapshot.canonical_bytes();
        let snapshot_ref = wr_codec::sha256_digest(&bytes);
        let path = self.path_of(&snapshot_ref);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(snapshot_ref);
        }
        write_content(&path, &bytes)
            .await
            .map_err(|e| SnapshotStoreError::Io {
                detail: e.to_string(),
            })?;
        debug!(target: "wr.snapshots", snapshot = %snapshot_ref, "snapshot stored");
        Ok(snapshot_ref)
    }

    /// Fetch a snapshot by content address; `None` when absent.
    ///
    /// # Errors
    ///
    /// [`SnapshotStoreError::CorruptionDetected`] when the stored bytes
    /// no longer hash to the requested address or do not parse.
    pub async fn get(
        &self,
        snapshot_ref: &SnapshotRef,
    ) -> Result<Option<ExecutionSnapshot>, SnapshotStoreError> {
        let path = self.path_of(snapshot_ref);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SnapshotStoreError::Io {
                    detail: e.to_string(),
                });
            }
        };
        let snapshot: ExecutionSnapshot = serde_json::from_slice(&bytes).map_err(|e| {
            SnapshotStoreError::CorruptionDetected {
                detail: format!("snapshot {snapshot_ref} does not parse: {e}"),
            }
        })?;
        if &snapshot.content_ref() != snapshot_ref {
            return Err(SnapshotStoreError::CorruptionDetected {
                detail: format!("snapshot bytes do not hash to {snapshot_ref}"),
            });
        }
        Ok(Some(snapshot))
    }
}

pub(crate) async fn write_content(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wr_event::EngineState;

    fn snapshot() -> ExecutionSnapshot {
        ExecutionSnapshot::new(EngineState::Init)
    }

    #[tokio::test]
    async fn put_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let r = store.put(&snapshot()).await.unwrap();
        assert_eq!(store.get(&r).await.unwrap(), Some(snapshot()));
    }

    #[tokio::test]
    async fn put_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let a = store.put(&snapshot()).await.unwrap();
        let b = store.put(&snapshot()).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn absent_ref_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let r = wr_codec::sha256_digest(b"never stored");
        assert_eq!(store.get(&r).await.unwrap(), None);
    }

    #[tokio::test]
    async fn doctored_bytes_are_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let r = store.put(&snapshot()).await.unwrap();

        let path = store.path_of(&r);
        let other = ExecutionSnapshot::new(EngineState::Complete);
        tokio::fs::write(&path, other.canonical_bytes()).await.unwrap();

        let err = store.get(&r).await.unwrap_err();
        assert_eq!(err.code(), "SNAPSHOT_STORE_CORRUPTION_DETECTED");
    }
}
