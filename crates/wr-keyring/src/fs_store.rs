// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filesystem-backed keyring store.
//!
//! Persists `<dataDir>/keys/keyring.json` with temp-file + rename writes
//! and owner-only permissions on Unix. Rotation rewrites the whole record.

use crate::{KeyMaterial, Keyring, KeyringError, KeyringStore};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};
use wr_ident::EntropySource;

/// Keyring store rooted at `<dataDir>/keys/keyring.json`.
pub struct FsKeyringStore {
    path: PathBuf,
    entropy: Mutex<Box<dyn EntropySource>>,
}

impl std::fmt::Debug for FsKeyringStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsKeyringStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl FsKeyringStore {
    /// Build a store under the given data directory.
    pub fn new(data_dir: impl AsRef<Path>, entropy: impl EntropySource + 'static) -> Self {
        Self {
            path: data_dir.as_ref().join("keys").join("keyring.json"),
            entropy: Mutex::new(Box::new(entropy)),
        }
    }

    /// Path of the persisted keyring file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn fresh_key(&self) -> Result<KeyMaterial, KeyringError> {
        let mut raw = [0u8; 32];
        let mut entropy = self.entropy.lock().await;
        let written = entropy.fill(&mut raw).map_err(|e| KeyringError::Io {
            detail: format!("entropy draw failed: {e}"),
        })?;
        if written < raw.len() {
            return Err(KeyringError::Io {
                detail: format!("entropy source returned {written} of 32 bytes"),
            });
        }
        Ok(KeyMaterial::from_raw(&raw))
    }

    async fn persist(&self, keyring: &Keyring) -> Result<(), KeyringError> {
        let io = |e: std::io::Error| KeyringError::Io {
            detail: e.to_string(),
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io)?;
        }

        let json = serde_json::to_vec_pretty(keyring).map_err(|e| KeyringError::Io {
            detail: format!("serialize keyring: {e}"),
        })?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await.map_err(io)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(io)?;
        }
        let file = tokio::fs::File::open(&tmp).await.map_err(io)?;
        file.sync_all().await.map_err(io)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io)?;
        debug!(target: "wr.keyring", path = %self.path.display(), "keyring persisted");
        Ok(())
    }

    async fn load_existing(&self) -> Result<Option<Keyring>, KeyringError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(KeyringError::Io {
                    detail: e.to_string(),
                });
            }
        };
        let keyring: Keyring =
            serde_json::from_slice(&bytes).map_err(|e| KeyringError::CorruptionDetected {
                detail: format!("keyring file is not a valid record: {e}"),
            })?;
        keyring.validate()?;
        Ok(Some(keyring))
    }
}

#[async_trait::async_trait]
impl KeyringStore for FsKeyringStore {
    async fn load_or_create(&self) -> Result<Keyring, KeyringError> {
        if let Some(existing) = self.load_existing().await? {
            return Ok(existing);
        }
        let keyring = Keyring::new(self.fresh_key().await?);
        self.persist(&keyring).await?;
        info!(target: "wr.keyring", path = %self.path.display(), "fresh keyring created");
        Ok(keyring)
    }

    async fn rotate(&self) -> Result<Keyring, KeyringError> {
        let current = self.load_or_create().await?;
        let rotated = current.rotated(self.fresh_key().await?);
        self.persist(&rotated).await?;
        info!(target: "wr.keyring", "keyring rotated");
        Ok(rotated)
    }
}
