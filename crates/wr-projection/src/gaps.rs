// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gap aggregation per run.

use crate::{ProjectionError, ensure_ordered_prefix};
use std::collections::BTreeMap;
use wr_event::{DomainEvent, EventBody, GapCategory, GapSeverity, GapStatus};
use wr_ident::{EventIndex, RunId};

/// Gap categories that can block a run when critical and unresolved.
pub const BLOCKING_GAP_CATEGORIES: &[GapCategory] = &[
    GapCategory::MissingInput,
    GapCategory::BrokenInvariant,
    GapCategory::ExternalDependency,
];

/// The latest state of one gap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapRecord {
    /// Stable key of the gap.
    pub gap_key: String,
    /// Severity at last record.
    pub severity: GapSeverity,
    /// Category at last record.
    pub category: GapCategory,
    /// Open or resolved.
    pub status: GapStatus,
    /// Index of the last `gap_recorded` for this key.
    pub last_event_index: EventIndex,
}

impl GapRecord {
    /// Whether this gap can block its run.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.status == GapStatus::Open
            && self.severity == GapSeverity::Critical
            && BLOCKING_GAP_CATEGORIES.contains(&self.category)
    }
}

/// All gaps of one run, keyed by gap key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunGaps {
    /// Latest record per gap key.
    pub gaps: BTreeMap<String, GapRecord>,
}

impl RunGaps {
    /// Open gaps, in key order.
    pub fn open(&self) -> impl Iterator<Item = &GapRecord> {
        self.gaps.values().filter(|g| g.status == GapStatus::Open)
    }

    /// Whether any open critical gap in a blocking category exists.
    #[must_use]
    pub fn has_blocking_gap(&self) -> bool {
        self.gaps.values().any(GapRecord::is_blocking)
    }
}

/// Gaps of every run in the prefix.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GapProjection {
    /// Per-run gaps.
    pub runs: BTreeMap<RunId, RunGaps>,
}

impl GapProjection {
    /// Gaps of `run`, empty if none were recorded.
    #[must_use]
    pub fn of(&self, run: &RunId) -> RunGaps {
        self.runs.get(run).cloned().unwrap_or_default()
    }
}

/// Project per-run gaps; the latest record per key wins.
///
/// # Errors
///
/// [`ProjectionError::InvariantViolation`] on a broken prefix
/// precondition.
pub fn project_gaps(events: &[DomainEvent]) -> Result<GapProjection, ProjectionError> {
    ensure_ordered_prefix(events)?;
    let mut runs: BTreeMap<RunId, RunGaps> = BTreeMap::new();
    for event in events {
        let EventBody::GapRecorded(data) = &event.body else {
            continue;
        };
        runs.entry(data.run_id.clone()).or_default().gaps.insert(
            data.gap_key.clone(),
            GapRecord {
                gap_key: data.gap_key.clone(),
                severity: data.severity,
                category: data.category,
                status: data.status,
                last_event_index: event.event_index,
            },
        );
    }
    Ok(GapProjection { runs })
}
