// SPDX-License-Identifier: MIT OR Apache-2.0
//! The execution session gate: the only door to an append.
//!
//! [`SessionGate::with_healthy_session_lock`] is the single primitive.
//! It refuses re-entrant use, checks session health *before* taking the
//! lock, acquires the exclusive lock, strictly loads the log, and hands
//! the closure a witness scoped to this session. The lock is released on
//! every exit path — return, error, or a dropped (cancelled) future —
//! because release rides the guard's `Drop`.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::{debug, warn};
use wr_ident::SessionId;
use wr_store::{LockError, LockWitness, SessionLog, SessionStore, StoreError, TailReason};

/// Lower bound of the lock-busy retry hint, in milliseconds.
pub const LOCK_RETRY_FLOOR_MS: u64 = 250;

/// Upper bound of the lock-busy retry hint, in milliseconds.
pub const LOCK_RETRY_CEILING_MS: u64 = 3000;

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Closed set of session health states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionHealth {
    /// The whole on-disk log is valid.
    Healthy,
    /// The log has a damaged tail; writes are refused until recovery.
    CorruptTail {
        /// Why the tail was cut.
        reason: TailReason,
    },
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the session gate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// The same gate already holds this session further up the stack.
    #[error("re-entrant session lock for {session_id}")]
    Reentrant {
        /// The session being re-entered.
        session_id: SessionId,
    },

    /// Another writer holds the session lock.
    #[error("session is locked, retry after {after_ms} ms")]
    Locked {
        /// Suggested retry delay, within [250, 3000] ms.
        after_ms: u64,
    },

    /// The session is not healthy; no lock was (or stays) taken.
    #[error("session is not healthy: {health:?}")]
    NotHealthy {
        /// The diagnosed health state.
        health: SessionHealth,
    },

    /// A store failure unrelated to health classification.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A lock-file io failure (not contention).
    #[error("session lock io failed: {detail}")]
    LockIo {
        /// The underlying failure, rendered.
        detail: String,
    },
}

impl GateError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Reentrant { .. } => "SESSION_LOCK_REENTRANT",
            Self::Locked { .. } => "SESSION_LOCKED",
            Self::NotHealthy { .. } => "SESSION_NOT_HEALTHY",
            Self::Store(e) => e.code(),
            Self::LockIo { .. } => "SESSION_LOCK_IO_FAILED",
        }
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Per-process gate over one session store.
///
/// One gate instance is one logical owner for the re-entrancy rule: a
/// closure running under the gate cannot call back into the gate for the
/// same session.
#[derive(Debug)]
pub struct SessionGate {
    store: SessionStore,
    active: Mutex<HashSet<SessionId>>,
}

impl SessionGate {
    /// Build a gate over a session store.
    #[must_use]
    pub fn new(store: SessionStore) -> Self {
        Self {
            store,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// The underlying store (for read paths that bypass the lock).
    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Classify session health without locking.
    ///
    /// # Errors
    ///
    /// [`GateError::Store`] on io failure.
    pub async fn health(&self, session_id: &SessionId) -> Result<SessionHealth, GateError> {
        let prefix = self.store.load_validated_prefix(session_id).await?;
        Ok(match prefix.tail_reason {
            None => SessionHealth::Healthy,
            Some(reason) => SessionHealth::CorruptTail { reason },
        })
    }

    /// Run `f` with the session lock held over a healthy session.
    ///
    /// Order of operations: re-entrancy check, health check (no lock is
    /// taken for an unhealthy session), lock acquisition, strict load,
    /// then `f(witness, log)`. The witness is scoped to this session and
    /// honored by the store's append.
    ///
    /// # Errors
    ///
    /// [`GateError::Reentrant`], [`GateError::NotHealthy`],
    /// [`GateError::Locked`] (with a retry hint), or whatever `f`
    /// returns; all converted into the caller's error type.
    pub async fn with_healthy_session_lock<T, E, F, Fut>(
        &self,
        session_id: &SessionId,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(LockWitness, SessionLog) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<GateError>,
    {
        let _entry = ReentrancyEntry::register(&self.active, session_id)
            .map_err(E::from)?;

        // Health gates before the lock: an unhealthy session must never
        // even contend.
        let prefix = self
            .store
            .load_validated_prefix(session_id)
            .await
            .map_err(|e| E::from(GateError::from(e)))?;
        if let Some(reason) = prefix.tail_reason {
            warn!(target: "wr.gate", session = %session_id, reason = reason.as_str(), "unhealthy session refused");
            return Err(E::from(GateError::NotHealthy {
                health: SessionHealth::CorruptTail { reason },
            }));
        }

        let guard = match self.store.acquire_lock(session_id).await {
            Ok(guard) => guard,
            Err(LockError::Busy { after_ms }) => {
                return Err(E::from(GateError::Locked {
                    after_ms: after_ms.clamp(LOCK_RETRY_FLOOR_MS, LOCK_RETRY_CEILING_MS),
                }));
            }
            Err(LockError::Io { detail }) => {
                return Err(E::from(GateError::LockIo { detail }));
            }
        };

        // Strict load under the lock; corruption that slipped in between
        // the health check and here still refuses the closure.
        let log = match self.store.load(session_id).await {
            Ok(log) => log,
            Err(StoreError::CorruptionDetected { .. }) => {
                let reason = self
                    .store
                    .load_validated_prefix(session_id)
                    .await
                    .ok()
                    .and_then(|p| p.tail_reason)
                    .unwrap_or(TailReason::SchemaViolation);
                return Err(E::from(GateError::NotHealthy {
                    health: SessionHealth::CorruptTail { reason },
                }));
            }
            Err(other) => return Err(E::from(GateError::from(other))),
        };

        debug!(target: "wr.gate", session = %session_id, events = log.events.len(), "gate entered");
        let result = f(guard.witness(), log).await;
        drop(guard);
        result
    }
}

/// Registration in the active-session set; removal rides `Drop` so a
/// cancelled closure frees its slot.
struct ReentrancyEntry<'a> {
    active: &'a Mutex<HashSet<SessionId>>,
    session_id: SessionId,
}

impl<'a> ReentrancyEntry<'a> {
    fn register(
        active: &'a Mutex<HashSet<SessionId>>,
        session_id: &SessionId,
    ) -> Result<Self, GateError> {
        let mut set = active.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !set.insert(session_id.clone()) {
            return Err(GateError::Reentrant {
                session_id: session_id.clone(),
            });
        }
        Ok(Self {
            active,
            session_id: session_id.clone(),
        })
    }
}

impl Drop for ReentrancyEntry<'_> {
    fn drop(&mut self) {
        let mut set = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        set.remove(&self.session_id);
    }
}
