// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-run status signals: blocked or clear.

use crate::gaps::project_gaps;
use crate::preferences::project_preferences;
use crate::run_dag::project_run_dags;
use crate::{ProjectionError, ensure_ordered_prefix};
use wr_event::{DomainEvent, PreferenceAutonomy};
use wr_ident::RunId;

/// The status of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStatusSignal {
    /// The run.
    pub run_id: RunId,
    /// Whether the run is blocked: an unresolved critical gap in a
    /// blocking category, and the effective autonomy at the preferred tip
    /// is not `full_auto_never_stop`.
    pub blocked: bool,
    /// Count of open gaps at critical severity.
    pub open_critical_gaps: usize,
    /// Whether the preferred tip is terminated.
    pub preferred_tip_terminated: bool,
}

/// Project status signals for every run in the prefix.
///
/// Risk policy is deliberately absent from the blocked rule: it tunes
/// preference, not disclosure, and never bypasses contracts.
///
/// # Errors
///
/// [`ProjectionError::InvariantViolation`] on a broken precondition, a
/// DAG contradiction, or a cyclic parent map during preference
/// resolution.
pub fn project_status_signals(
    events: &[DomainEvent],
) -> Result<Vec<RunStatusSignal>, ProjectionError> {
    ensure_ordered_prefix(events)?;
    let dags = project_run_dags(events)?;
    let gaps = project_gaps(events)?;
    let preferences = project_preferences(events)?;
    let parent_map = dags.parent_map();

    let mut signals = Vec::with_capacity(dags.runs.len());
    for (run_id, dag) in &dags.runs {
        let run_gaps = gaps.of(run_id);
        let open_critical_gaps = run_gaps
            .open()
            .filter(|g| g.severity == wr_event::GapSeverity::Critical)
            .count();

        let autonomy = match &dag.preferred_tip_node_id {
            Some(tip) => preferences.effective_at(tip, &parent_map)?.autonomy,
            None => None,
        };
        let blocked = run_gaps.has_blocking_gap()
            && autonomy != Some(PreferenceAutonomy::FullAutoNeverStop);

        let preferred_tip_terminated = dag
            .preferred_tip_node_id
            .as_ref()
            .and_then(|tip| dag.nodes_by_id.get(tip))
            .is_some_and(|info| info.terminated);

        signals.push(RunStatusSignal {
            run_id: run_id.clone(),
            blocked,
            open_critical_gaps,
            preferred_tip_terminated,
        });
    }
    Ok(signals)
}
