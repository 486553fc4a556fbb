// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pure projections from event prefixes to read models.
//!
//! Every projection here is a referentially transparent function of an
//! ordered, contiguous event prefix (plus, where noted, a supplied
//! parent-node map). Two invocations on byte-identical inputs yield
//! byte-identical outputs: all maps are BTree-backed, all orderings are
//! total. Event content a projection does not care about is ignored, so
//! new event kinds and fields never break old read models; referential
//! contradictions inside the prefix, by contrast, fail closed.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod context;
mod gaps;
mod health;
mod outputs;
mod preferences;
mod resume;
mod run_dag;
mod status;

pub use context::{ContextRecord, RunContextProjection, project_run_contexts};
pub use gaps::{
    BLOCKING_GAP_CATEGORIES, GapProjection, GapRecord, RunGaps, project_gaps,
};
pub use health::{ProjectionHealth, session_health};
pub use outputs::{NodeOutputs, NodeOutputsProjection, OutputRecord, project_node_outputs};
pub use preferences::{
    EffectivePreferences, PreferencesProjection, ancestry, project_preferences,
};
pub use resume::{
    MAX_RESUME_CANDIDATES, RankedCandidate, ResumeCandidate, ResumeQuery, ResumeTier,
    rank_resume_candidates, summarize_for_resume,
};
pub use run_dag::{Edge, NodeInfo, RunDag, RunDagProjection, project_run_dags};
pub use status::{RunStatusSignal, project_status_signals};

use wr_event::DomainEvent;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The single projection error: a violated precondition or a referential
/// contradiction inside the prefix.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProjectionError {
    /// The prefix or its content contradicts a projection invariant.
    #[error("projection invariant violation: {detail}")]
    InvariantViolation {
        /// What was violated.
        detail: String,
    },
}

impl ProjectionError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvariantViolation { .. } => "PROJECTION_INVARIANT_VIOLATION",
        }
    }

    pub(crate) fn new(detail: impl Into<String>) -> Self {
        Self::InvariantViolation {
            detail: detail.into(),
        }
    }
}

/// Validate the shared precondition: events sorted by index, contiguous
/// from zero.
///
/// # Errors
///
/// Returns [`ProjectionError::InvariantViolation`] on the first gap or
/// disorder.
pub fn ensure_ordered_prefix(events: &[DomainEvent]) -> Result<(), ProjectionError> {
    for (i, event) in events.iter().enumerate() {
        if event.event_index.value() != i as u64 {
            return Err(ProjectionError::new(format!(
                "event at position {i} has index {}, prefix is not contiguous from zero",
                event.event_index
            )));
        }
    }
    Ok(())
}
