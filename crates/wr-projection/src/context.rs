// SPDX-License-Identifier: MIT OR Apache-2.0

//! Latest run context.

use crate::{ProjectionError, ensure_ordered_prefix};
use std::collections::BTreeMap;
use wr_event::{DomainEvent, EventBody};
use wr_ident::{EventIndex, RunId};

/// The latest `context_set` payload of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextRecord {
    /// Revision carried by the winning event.
    pub revision: u64,
    /// The context payload.
    pub context: serde_json::Value,
    /// Index of the winning event.
    pub set_at: EventIndex,
}

/// Latest context per run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunContextProjection {
    /// Per-run context records.
    pub runs: BTreeMap<RunId, ContextRecord>,
}

impl RunContextProjection {
    /// A dotted string lookup into a run's context, e.g. `"git.headSha"`.
    #[must_use]
    pub fn lookup(&self, run: &RunId, path: &str) -> Option<&str> {
        let mut value = &self.runs.get(run)?.context;
        for part in path.split('.') {
            value = value.get(part)?;
        }
        value.as_str()
    }
}

/// Project the latest context per run; later events win outright.
///
/// # Errors
///
/// [`ProjectionError::InvariantViolation`] on a broken prefix
/// precondition.
pub fn project_run_contexts(
    events: &[DomainEvent],
) -> Result<RunContextProjection, ProjectionError> {
    ensure_ordered_prefix(events)?;
    let mut runs = BTreeMap::new();
    for event in events {
        let EventBody::ContextSet(data) = &event.body else {
            continue;
        };
        runs.insert(
            data.run_id.clone(),
            ContextRecord {
                revision: data.revision,
                context: data.context.clone(),
                set_at: event.event_index,
            },
        );
    }
    Ok(RunContextProjection { runs })
}
