// SPDX-License-Identifier: MIT OR Apache-2.0
//! The use-case layer of the WorkRail durable core.
//!
//! An [`Engine`] owns the stores, the gate, the keyring, and the id
//! factory — all constructor-injected, nothing process-wide — and
//! exposes the operations the outer RPC layer calls: start a workflow,
//! continue it (replay-idempotent), checkpoint it, export and import
//! session bundles, enumerate sessions by recency, and render the
//! recovery prompt.
//!
//! Failure taxonomy passes through verbatim: the engine never translates
//! a projection error into a store error or vice versa.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod advance;
mod bundle_io;
mod recovery;
mod resume;
mod start;

pub use advance::{ContinueIntent, ContinueOutcome, ContinueRequest};
pub use bundle_io::ImportedSession;
pub use recovery::{RECOVERY_TRUNCATION_MARKER, render_recovery_prompt};
pub use start::StartedWorkflow;

use std::sync::{Arc, Mutex};
use wr_config::WorkrailConfig;
use wr_gate::{GateError, SessionGate};
use wr_ident::{IdFactory, OsEntropy};
use wr_keyring::{FsKeyringStore, KeyringStore};
use wr_store::{PinnedWorkflowStore, SessionStamp, SessionStore, SnapshotStore};
use wr_telemetry::MetricsCollector;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Union of the component error families the engine can surface.
///
/// Every variant passes its component's code through unchanged via
/// [`EngineError::code`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// From the session gate.
    #[error(transparent)]
    Gate(#[from] GateError),
    /// From the session store.
    #[error(transparent)]
    Store(#[from] wr_store::StoreError),
    /// From the snapshot store.
    #[error(transparent)]
    Snapshot(#[from] wr_store::SnapshotStoreError),
    /// From the pinned workflow store.
    #[error(transparent)]
    Pinned(#[from] wr_store::PinnedStoreError),
    /// From the keyring.
    #[error(transparent)]
    Keyring(#[from] wr_keyring::KeyringError),
    /// From the token codec.
    #[error(transparent)]
    Token(#[from] wr_token::TokenError),
    /// From schema validation.
    #[error(transparent)]
    Schema(#[from] wr_event::SchemaError),
    /// From a projection.
    #[error(transparent)]
    Projection(#[from] wr_projection::ProjectionError),
    /// From bundle validation.
    #[error(transparent)]
    Bundle(#[from] wr_bundle::BundleError),
    /// From the id factory.
    #[error(transparent)]
    Id(#[from] wr_ident::IdError),
    /// The request itself is malformed (e.g. rehydrate with an ack
    /// token, or tokens that do not belong together).
    #[error("invalid request: {detail}")]
    InvalidRequest {
        /// What was wrong with the request.
        detail: String,
    },
}

impl EngineError {
    /// Stable machine-readable code, verbatim from the failing component.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Gate(e) => e.code(),
            Self::Store(e) => e.code(),
            Self::Snapshot(e) => e.code(),
            Self::Pinned(e) => e.code(),
            Self::Keyring(e) => e.code(),
            Self::Token(e) => e.code(),
            Self::Schema(e) => e.code(),
            Self::Projection(e) => e.code(),
            Self::Bundle(e) => e.code(),
            Self::Id(e) => e.code(),
            Self::InvalidRequest { .. } => "REQUEST_INVALID",
        }
    }

    pub(crate) fn invalid(detail: impl Into<String>) -> Self {
        Self::InvalidRequest {
            detail: detail.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The durable core's use-case surface.
pub struct Engine {
    pub(crate) store: SessionStore,
    pub(crate) snapshots: SnapshotStore,
    pub(crate) pinned: PinnedWorkflowStore,
    pub(crate) gate: SessionGate,
    pub(crate) keyring: Arc<dyn KeyringStore>,
    pub(crate) ids: Mutex<IdFactory>,
    pub(crate) metrics: MetricsCollector,
    pub(crate) config: WorkrailConfig,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    /// Build an engine over the given data directory with OS entropy and
    /// a filesystem keyring.
    #[must_use]
    pub fn open(config: WorkrailConfig) -> Self {
        let data_dir = config.resolve_data_dir();
        let store =
            SessionStore::new(&data_dir).with_rotation_events(config.segment_rotation_events);
        Self {
            snapshots: SnapshotStore::new(&data_dir),
            pinned: PinnedWorkflowStore::new(&data_dir),
            gate: SessionGate::new(store.clone()),
            keyring: Arc::new(FsKeyringStore::new(&data_dir, OsEntropy)),
            ids: Mutex::new(IdFactory::new(OsEntropy)),
            metrics: MetricsCollector::new(),
            store,
            config,
        }
    }

    /// Build an engine with injected collaborators (tests, embedders).
    #[must_use]
    pub fn with_parts(
        config: WorkrailConfig,
        store: SessionStore,
        snapshots: SnapshotStore,
        pinned: PinnedWorkflowStore,
        keyring: Arc<dyn KeyringStore>,
        ids: IdFactory,
    ) -> Self {
        Self {
            gate: SessionGate::new(store.clone()),
            store,
            snapshots,
            pinned,
            keyring,
            ids: Mutex::new(ids),
            metrics: MetricsCollector::new(),
            config,
        }
    }

    /// The metrics collector, for reporting.
    #[must_use]
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Sessions ordered newest-first by directory mtime, optionally
    /// capped. Alphabetical order is never used for the cap decision.
    ///
    /// # Errors
    ///
    /// [`EngineError::Store`] on directory read failure.
    pub async fn enumerate_sessions_by_recency(
        &self,
        cap: Option<usize>,
    ) -> Result<Vec<SessionStamp>, EngineError> {
        let mut stamps = self.store.enumerate_by_recency().await?;
        if let Some(cap) = cap {
            stamps.truncate(cap);
        }
        Ok(stamps)
    }

    pub(crate) fn mint<T: wr_ident::BrandedId>(&self) -> Result<T, EngineError> {
        let mut ids = self
            .ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(ids.mint()?)
    }

    pub(crate) async fn keyring(&self) -> Result<wr_keyring::Keyring, EngineError> {
        Ok(self.keyring.load_or_create().await?)
    }
}
