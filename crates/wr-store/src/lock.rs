// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exclusive per-session lock files.
//!
//! The lock is a `create_new` file inside the session directory; holding
//! the open guard is holding the lock. Dropping the guard — normally, on
//! error, or when a future is cancelled — removes the file, so a crashed
//! critical section cannot wedge the session (an unlink on a dead path is
//! the worst case, cleared by the operator removing the stale file).

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};
use wr_ident::SessionId;

/// Retry hint handed to callers that find the lock busy, in milliseconds.
/// Kept inside the 250–3000 band the gate contract promises.
pub const LOCK_RETRY_AFTER_MS: u64 = 500;

/// Errors from lock acquisition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    /// Another writer holds the session lock.
    #[error("session lock is busy, retry after {after_ms} ms")]
    Busy {
        /// Suggested retry delay in milliseconds.
        after_ms: u64,
    },

    /// A filesystem operation failed.
    #[error("session lock io failed: {detail}")]
    Io {
        /// The underlying failure, rendered.
        detail: String,
    },
}

impl LockError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Busy { .. } => "SESSION_LOCK_BUSY",
            Self::Io { .. } => "SESSION_LOCK_IO_FAILED",
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LockOwnerRecord<'a> {
    session_id: &'a str,
    pid: u32,
    acquired_at: String,
}

/// Proof that the holder of this value holds the session lock.
///
/// A witness is scoped to one session and goes stale the moment its guard
/// drops; the session store checks both before writing a byte.
#[derive(Debug, Clone)]
pub struct LockWitness {
    session_id: SessionId,
    held: Arc<AtomicBool>,
}

impl LockWitness {
    /// The session this witness is scoped to.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Whether the backing lock is still held.
    #[must_use]
    pub fn assert_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// The held lock. Dropping releases.
#[derive(Debug)]
pub struct SessionLockGuard {
    path: PathBuf,
    session_id: SessionId,
    held: Arc<AtomicBool>,
}

impl SessionLockGuard {
    /// Acquire the lock file inside `session_dir`.
    ///
    /// # Errors
    ///
    /// [`LockError::Busy`] (with a retry hint) if the file already exists;
    /// [`LockError::Io`] on any other filesystem failure.
    pub async fn acquire(
        session_dir: &Path,
        session_id: &SessionId,
    ) -> Result<Self, LockError> {
        let io = |e: std::io::Error| LockError::Io {
            detail: e.to_string(),
        };
        tokio::fs::create_dir_all(session_dir).await.map_err(io)?;
        let path = session_dir.join("lock");

        let owner = LockOwnerRecord {
            session_id: wr_ident::BrandedId::as_str(session_id),
            pid: std::process::id(),
            acquired_at: chrono::Utc::now().to_rfc3339(),
        };
        let body = serde_json::to_vec(&owner).unwrap_or_default();

        let open = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;
        let mut file = match open {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!(target: "wr.lock", session = %session_id, "lock busy");
                return Err(LockError::Busy {
                    after_ms: LOCK_RETRY_AFTER_MS,
                });
            }
            Err(e) => return Err(io(e)),
        };
        file.write_all(&body).await.map_err(io)?;

        debug!(target: "wr.lock", session = %session_id, "lock acquired");
        Ok(Self {
            path,
            session_id: session_id.clone(),
            held: Arc::new(AtomicBool::new(true)),
        })
    }

    /// A witness scoped to this guard's session.
    #[must_use]
    pub fn witness(&self) -> LockWitness {
        LockWitness {
            session_id: self.session_id.clone(),
            held: Arc::clone(&self.held),
        }
    }
}

impl Drop for SessionLockGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(target: "wr.lock", path = %self.path.display(), error = %e, "lock release failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wr_ident::BrandedId;

    fn session() -> SessionId {
        SessionId::from_entropy([1; 16])
    }

    #[tokio::test]
    async fn acquire_then_busy_then_reacquire() {
        let dir = tempfile::tempdir().unwrap();
        let id = session();

        let guard = SessionLockGuard::acquire(dir.path(), &id).await.unwrap();
        let err = SessionLockGuard::acquire(dir.path(), &id).await.unwrap_err();
        assert_eq!(err.code(), "SESSION_LOCK_BUSY");
        assert!(matches!(err, LockError::Busy { after_ms } if (250..=3000).contains(&after_ms)));

        drop(guard);
        SessionLockGuard::acquire(dir.path(), &id).await.unwrap();
    }

    #[tokio::test]
    async fn witness_goes_stale_on_release() {
        let dir = tempfile::tempdir().unwrap();
        let id = session();

        let guard = SessionLockGuard::acquire(dir.path(), &id).await.unwrap();
        let witness = guard.witness();
        assert!(witness.assert_held());
        assert_eq!(witness.session_id(), &id);

        drop(guard);
        assert!(!witness.assert_held());
    }
}
