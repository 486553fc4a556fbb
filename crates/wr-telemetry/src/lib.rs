// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structured telemetry for the WorkRail core.
//!
//! Tracing setup plus a thread-safe collector of per-operation counters
//! and durations. The collector is an owned handle constructed at
//! startup and injected where needed; there is no process-wide instance.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Initialize the global tracing subscriber with an env-filter.
///
/// `default_level` applies when `RUST_LOG` is unset. Calling twice is a
/// no-op (the second init fails quietly), so tests can call freely.
pub fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

// ---------------------------------------------------------------------------
// Operation metrics
// ---------------------------------------------------------------------------

/// The operations the core meters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// A gated append.
    Append,
    /// A strict or validated load.
    Load,
    /// A continue-workflow advance.
    Advance,
    /// A rehydrate render.
    Rehydrate,
    /// A checkpoint mint.
    Checkpoint,
    /// A bundle import.
    Import,
}

#[derive(Debug, Clone, Default)]
struct OpStats {
    count: u64,
    errors: u64,
    total_micros: u64,
}

/// Aggregated metrics, deterministic in key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MetricsSummary {
    /// Per-operation `(count, errors, mean_micros)`.
    pub ops: BTreeMap<OpKind, OpSummary>,
}

/// Summary of one operation kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpSummary {
    /// Invocations recorded.
    pub count: u64,
    /// Invocations that failed.
    pub errors: u64,
    /// Mean duration in microseconds.
    pub mean_micros: f64,
}

/// Thread-safe collector of operation metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<Mutex<BTreeMap<OpKind, OpStats>>>,
}

impl MetricsCollector {
    /// A fresh collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one invocation.
    pub fn record(&self, op: OpKind, duration: std::time::Duration, ok: bool) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let stats = inner.entry(op).or_default();
        stats.count += 1;
        if !ok {
            stats.errors += 1;
        }
        stats.total_micros += duration.as_micros() as u64;
    }

    /// Snapshot the aggregate.
    #[must_use]
    pub fn summary(&self) -> MetricsSummary {
        let inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let ops = inner
            .iter()
            .map(|(op, stats)| {
                (
                    *op,
                    OpSummary {
                        count: stats.count,
                        errors: stats.errors,
                        mean_micros: if stats.count == 0 {
                            0.0
                        } else {
                            stats.total_micros as f64 / stats.count as f64
                        },
                    },
                )
            })
            .collect();
        MetricsSummary { ops }
    }

    /// Log the summary at info level.
    pub fn report(&self) {
        let summary = self.summary();
        for (op, s) in &summary.ops {
            info!(
                target: "wr.telemetry",
                op = ?op,
                count = s.count,
                errors = s.errors,
                mean_micros = s.mean_micros,
                "op summary"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn records_and_summarizes() {
        let collector = MetricsCollector::new();
        collector.record(OpKind::Append, Duration::from_micros(100), true);
        collector.record(OpKind::Append, Duration::from_micros(300), false);
        collector.record(OpKind::Advance, Duration::from_micros(50), true);

        let summary = collector.summary();
        let append = &summary.ops[&OpKind::Append];
        assert_eq!(append.count, 2);
        assert_eq!(append.errors, 1);
        assert!((append.mean_micros - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn summary_key_order_is_deterministic() {
        let collector = MetricsCollector::new();
        collector.record(OpKind::Import, Duration::from_micros(1), true);
        collector.record(OpKind::Append, Duration::from_micros(1), true);
        let json = serde_json::to_string(&collector.summary()).unwrap();
        let append_at = json.find("append").unwrap();
        let import_at = json.find("import").unwrap();
        assert!(append_at < import_at);
    }

    #[test]
    fn clones_share_the_same_sink() {
        let collector = MetricsCollector::new();
        let clone = collector.clone();
        clone.record(OpKind::Checkpoint, Duration::from_micros(5), true);
        assert_eq!(collector.summary().ops[&OpKind::Checkpoint].count, 1);
    }
}
