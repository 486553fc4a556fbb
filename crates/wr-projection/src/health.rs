// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session health as a projection.

use crate::run_dag::project_run_dags;
use serde::{Deserialize, Serialize};
use wr_event::DomainEvent;

/// Health derived from replaying the prefix through the run-DAG
/// projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProjectionHealth {
    /// The prefix projects cleanly.
    Healthy,
    /// The prefix contradicts itself; `reason_code` is the code of the
    /// failing projection.
    CorruptTail {
        /// Stable code of the projection failure.
        reason_code: String,
    },
}

/// Classify a prefix: healthy iff the run-DAG projection succeeds.
#[must_use]
pub fn session_health(events: &[DomainEvent]) -> ProjectionHealth {
    match project_run_dags(events) {
        Ok(_) => ProjectionHealth::Healthy,
        Err(e) => ProjectionHealth::CorruptTail {
            reason_code: e.code().to_string(),
        },
    }
}
