// SPDX-License-Identifier: MIT OR Apache-2.0

//! The domain event: one closed-set tagged record per log line.
//!
//! Wire decoding is two-stage: the outer record and the per-kind data
//! payload are both strict (`deny_unknown_fields`), so an event either
//! decodes into a fully-typed [`EventBody`] or is rejected whole. The
//! outer record never trusts the `kind` string beyond the closed set.

use crate::SchemaError;
use crate::blocker::BlockedSnapshot;
use crate::dedupe::DedupeKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use wr_codec::{Sha256Digest, SnapshotRef, WorkflowHash};
use wr_ident::{AttemptId, BrandedId, EventId, EventIndex, NodeId, OutputId, RunId, SessionId};

/// Schema version carried by every event record.
pub const EVENT_SCHEMA_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// Closed set of domain event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A session came into existence.
    SessionCreated,
    /// A run started inside a session.
    RunStarted,
    /// A node was added to a run's DAG.
    NodeCreated,
    /// An edge was added between two nodes.
    EdgeCreated,
    /// An advance attempt completed (advanced or blocked).
    AdvanceRecorded,
    /// An output landed on a node.
    NodeOutputAppended,
    /// Preferences changed at a node scope.
    PreferencesChanged,
    /// A gap was recorded or resolved.
    GapRecorded,
    /// The run context was replaced.
    ContextSet,
    /// A decision trace line was appended.
    DecisionTraceAppended,
    /// A free-form observation was recorded.
    ObservationRecorded,
}

impl EventKind {
    /// All kinds, in declaration order.
    pub const ALL: &'static [EventKind] = &[
        Self::SessionCreated,
        Self::RunStarted,
        Self::NodeCreated,
        Self::EdgeCreated,
        Self::AdvanceRecorded,
        Self::NodeOutputAppended,
        Self::PreferencesChanged,
        Self::GapRecorded,
        Self::ContextSet,
        Self::DecisionTraceAppended,
        Self::ObservationRecorded,
    ];

    /// The wire tag, e.g. `"advance_recorded"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionCreated => "session_created",
            Self::RunStarted => "run_started",
            Self::NodeCreated => "node_created",
            Self::EdgeCreated => "edge_created",
            Self::AdvanceRecorded => "advance_recorded",
            Self::NodeOutputAppended => "node_output_appended",
            Self::PreferencesChanged => "preferences_changed",
            Self::GapRecorded => "gap_recorded",
            Self::ContextSet => "context_set",
            Self::DecisionTraceAppended => "decision_trace_appended",
            Self::ObservationRecorded => "observation_recorded",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Per-kind data payloads
// ---------------------------------------------------------------------------

/// Data for `session_created`. Deliberately empty: the outer record
/// already carries the session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SessionCreatedData {}

/// Data for `run_started`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RunStartedData {
    /// The new run.
    pub run_id: RunId,
    /// Human-facing workflow identifier.
    pub workflow_id: String,
    /// Hash of the compiled workflow pinned for this run.
    pub workflow_hash: WorkflowHash,
}

/// Data for `node_created`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeCreatedData {
    /// Run the node belongs to.
    pub run_id: RunId,
    /// The new node.
    pub node_id: NodeId,
    /// Parent in the DAG; absent for the root node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_node_id: Option<NodeId>,
    /// Content address of the execution snapshot at this node.
    pub snapshot_ref: SnapshotRef,
    /// Short human-facing title.
    pub title: String,
}

/// Kind of an edge between nodes. `acked_step` edges mark the preferred
/// branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// The step advance the caller acknowledged.
    AckedStep,
    /// An explored alternative branch.
    Branched,
    /// A retry of the same step.
    Retried,
}

impl EdgeKind {
    /// The wire tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AckedStep => "acked_step",
            Self::Branched => "branched",
            Self::Retried => "retried",
        }
    }
}

/// Data for `edge_created`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EdgeCreatedData {
    /// Run both endpoints belong to.
    pub run_id: RunId,
    /// Source node.
    pub from: NodeId,
    /// Target node.
    pub to: NodeId,
    /// Edge kind.
    pub kind: EdgeKind,
}

/// Outcome of a recorded advance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    /// The step completed and execution moved to a new node.
    Advanced {
        /// The node execution moved to.
        #[serde(rename = "nextNodeId")]
        next_node_id: NodeId,
        /// Snapshot at the new node.
        #[serde(rename = "snapshotRef")]
        snapshot_ref: SnapshotRef,
    },
    /// The step blocked.
    Blocked {
        /// The recorded block, retryable or terminal.
        block: BlockedSnapshot,
    },
}

/// Data for `advance_recorded`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AdvanceRecordedData {
    /// Run being advanced.
    pub run_id: RunId,
    /// Node being advanced from.
    pub node_id: NodeId,
    /// The attempt this outcome belongs to.
    pub attempt_id: AttemptId,
    /// What happened.
    pub outcome: AdvanceOutcome,
}

/// Output channel of a node output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputChannel {
    /// Prose recap of the node. At most one is current per node.
    Recap,
    /// A produced artifact.
    Artifact,
}

/// Data for `node_output_appended`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeOutputAppendedData {
    /// Node the output landed on.
    pub node_id: NodeId,
    /// The new output.
    pub output_id: OutputId,
    /// Channel the output belongs to.
    pub channel: OutputChannel,
    /// MIME type of the content.
    pub content_type: String,
    /// Digest of the content bytes.
    pub sha256: Sha256Digest,
    /// Short inline excerpt for recaps and resume matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    /// Output this one supersedes, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<OutputId>,
}

/// Autonomy preference at a node scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceAutonomy {
    /// Never stop for gaps; disclose and continue.
    FullAutoNeverStop,
    /// Pause on blocking gaps.
    Guided,
    /// Pause at every step.
    StepByStep,
}

/// Risk posture. A preference only: it never suppresses disclosure and
/// never bypasses output contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskPolicy {
    /// Prefer the safe path.
    Conservative,
    /// Balance risk and progress.
    Balanced,
    /// Prefer progress.
    Aggressive,
}

/// A function definition scoped at a node; the closest definition up the
/// ancestry wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FunctionDef {
    /// Function name; later definitions at closer scopes shadow this one.
    pub name: String,
    /// The definition body.
    pub definition: String,
}

/// A set of preferences seeded at one node scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PreferenceSet {
    /// Autonomy preference, if set at this scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autonomy: Option<PreferenceAutonomy>,
    /// Risk policy, if set at this scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_policy: Option<RiskPolicy>,
    /// Function definitions introduced at this scope.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionDef>,
}

/// Data for `preferences_changed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PreferencesChangedData {
    /// Scope node; preferences propagate to its descendants.
    pub node_id: NodeId,
    /// Monotonic per-node revision, part of the dedupe key.
    pub revision: u64,
    /// The preferences seeded at this scope.
    pub preferences: PreferenceSet,
}

/// Severity of a recorded gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapSeverity {
    /// Informational.
    Info,
    /// Minor.
    Minor,
    /// Major.
    Major,
    /// Critical; may block the run.
    Critical,
}

/// Category of a recorded gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapCategory {
    /// Required input is missing.
    MissingInput,
    /// An invariant the workflow relies on does not hold.
    BrokenInvariant,
    /// An external dependency is unavailable.
    ExternalDependency,
    /// The instructions are ambiguous.
    Ambiguity,
    /// Anything else.
    Other,
}

/// Lifecycle status of a gap. A later `gap_recorded` with the same key
/// and `resolved` closes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapStatus {
    /// The gap is open.
    Open,
    /// The gap was resolved.
    Resolved,
}

/// Data for `gap_recorded`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GapRecordedData {
    /// Run the gap belongs to.
    pub run_id: RunId,
    /// Stable key identifying the gap across status changes.
    pub gap_key: String,
    /// Severity.
    pub severity: GapSeverity,
    /// Category.
    pub category: GapCategory,
    /// Open or resolved.
    pub status: GapStatus,
}

/// Data for `context_set`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContextSetData {
    /// Run whose context is replaced.
    pub run_id: RunId,
    /// Monotonic per-run revision, part of the dedupe key.
    pub revision: u64,
    /// The full replacement context payload.
    pub context: serde_json::Value,
}

/// Data for `decision_trace_appended`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DecisionTraceAppendedData {
    /// Node the decision was made at.
    pub node_id: NodeId,
    /// Sequence number within the node, part of the dedupe key.
    pub seq: u64,
    /// The decision taken.
    pub decision: String,
    /// Why, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// Data for `observation_recorded`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ObservationRecordedData {
    /// Run scope, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    /// Node scope, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    /// Stable label, part of the dedupe key.
    pub label: String,
    /// Sequence number under the label, part of the dedupe key.
    pub seq: u64,
    /// Free-form payload.
    pub payload: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

/// The typed `kind` + `data` pair of a domain event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    /// `session_created`.
    SessionCreated(SessionCreatedData),
    /// `run_started`.
    RunStarted(RunStartedData),
    /// `node_created`.
    NodeCreated(NodeCreatedData),
    /// `edge_created`.
    EdgeCreated(EdgeCreatedData),
    /// `advance_recorded`.
    AdvanceRecorded(AdvanceRecordedData),
    /// `node_output_appended`.
    NodeOutputAppended(NodeOutputAppendedData),
    /// `preferences_changed`.
    PreferencesChanged(PreferencesChangedData),
    /// `gap_recorded`.
    GapRecorded(GapRecordedData),
    /// `context_set`.
    ContextSet(ContextSetData),
    /// `decision_trace_appended`.
    DecisionTraceAppended(DecisionTraceAppendedData),
    /// `observation_recorded`.
    ObservationRecorded(ObservationRecordedData),
}

impl EventBody {
    /// The kind tag of this body.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::SessionCreated(_) => EventKind::SessionCreated,
            Self::RunStarted(_) => EventKind::RunStarted,
            Self::NodeCreated(_) => EventKind::NodeCreated,
            Self::EdgeCreated(_) => EventKind::EdgeCreated,
            Self::AdvanceRecorded(_) => EventKind::AdvanceRecorded,
            Self::NodeOutputAppended(_) => EventKind::NodeOutputAppended,
            Self::PreferencesChanged(_) => EventKind::PreferencesChanged,
            Self::GapRecorded(_) => EventKind::GapRecorded,
            Self::ContextSet(_) => EventKind::ContextSet,
            Self::DecisionTraceAppended(_) => EventKind::DecisionTraceAppended,
            Self::ObservationRecorded(_) => EventKind::ObservationRecorded,
        }
    }

    /// Decode a raw data payload against the schema of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DataMismatch`] if the payload has missing,
    /// extra, or mistyped fields.
    pub fn decode(kind: EventKind, data: serde_json::Value) -> Result<Self, SchemaError> {
        let mismatch = |e: serde_json::Error| SchemaError::DataMismatch {
            kind: kind.as_str().to_string(),
            detail: e.to_string(),
        };
        Ok(match kind {
            EventKind::SessionCreated => {
                Self::SessionCreated(serde_json::from_value(data).map_err(mismatch)?)
            }
            EventKind::RunStarted => {
                Self::RunStarted(serde_json::from_value(data).map_err(mismatch)?)
            }
            EventKind::NodeCreated => {
                Self::NodeCreated(serde_json::from_value(data).map_err(mismatch)?)
            }
            EventKind::EdgeCreated => {
                Self::EdgeCreated(serde_json::from_value(data).map_err(mismatch)?)
            }
            EventKind::AdvanceRecorded => {
                Self::AdvanceRecorded(serde_json::from_value(data).map_err(mismatch)?)
            }
            EventKind::NodeOutputAppended => {
                Self::NodeOutputAppended(serde_json::from_value(data).map_err(mismatch)?)
            }
            EventKind::PreferencesChanged => {
                Self::PreferencesChanged(serde_json::from_value(data).map_err(mismatch)?)
            }
            EventKind::GapRecorded => {
                Self::GapRecorded(serde_json::from_value(data).map_err(mismatch)?)
            }
            EventKind::ContextSet => {
                Self::ContextSet(serde_json::from_value(data).map_err(mismatch)?)
            }
            EventKind::DecisionTraceAppended => {
                Self::DecisionTraceAppended(serde_json::from_value(data).map_err(mismatch)?)
            }
            EventKind::ObservationRecorded => {
                Self::ObservationRecorded(serde_json::from_value(data).map_err(mismatch)?)
            }
        })
    }

    /// Serialize the data payload back to a raw value.
    #[must_use]
    pub fn data_value(&self) -> serde_json::Value {
        let result = match self {
            Self::SessionCreated(d) => serde_json::to_value(d),
            Self::RunStarted(d) => serde_json::to_value(d),
            Self::NodeCreated(d) => serde_json::to_value(d),
            Self::EdgeCreated(d) => serde_json::to_value(d),
            Self::AdvanceRecorded(d) => serde_json::to_value(d),
            Self::NodeOutputAppended(d) => serde_json::to_value(d),
            Self::PreferencesChanged(d) => serde_json::to_value(d),
            Self::GapRecorded(d) => serde_json::to_value(d),
            Self::ContextSet(d) => serde_json::to_value(d),
            Self::DecisionTraceAppended(d) => serde_json::to_value(d),
            Self::ObservationRecorded(d) => serde_json::to_value(d),
        };
        // Data structs serialize infallibly.
        result.unwrap_or(serde_json::Value::Null)
    }

    /// The scope this body implies (run and node ids, where present).
    #[must_use]
    pub fn scope(&self) -> Option<EventScope> {
        let scope = match self {
            Self::SessionCreated(_) => return None,
            Self::RunStarted(d) => EventScope::run(d.run_id.clone()),
            Self::NodeCreated(d) => EventScope::at(d.run_id.clone(), d.node_id.clone()),
            Self::EdgeCreated(d) => EventScope::at(d.run_id.clone(), d.to.clone()),
            Self::AdvanceRecorded(d) => EventScope::at(d.run_id.clone(), d.node_id.clone()),
            Self::NodeOutputAppended(d) => EventScope::node(d.node_id.clone()),
            Self::PreferencesChanged(d) => EventScope::node(d.node_id.clone()),
            Self::GapRecorded(d) => EventScope::run(d.run_id.clone()),
            Self::ContextSet(d) => EventScope::run(d.run_id.clone()),
            Self::DecisionTraceAppended(d) => EventScope::node(d.node_id.clone()),
            Self::ObservationRecorded(d) => EventScope {
                run_id: d.run_id.clone(),
                node_id: d.node_id.clone(),
            },
        };
        Some(scope)
    }

    /// The canonical dedupe key for this body, built only from stable
    /// identifiers known at replay time.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DedupeKeyInvalid`] if a caller-supplied part
    /// (gap key, observation label) violates the key grammar.
    pub fn default_dedupe_key(&self, session_id: &SessionId) -> Result<DedupeKey, SchemaError> {
        match self {
            Self::SessionCreated(_) => {
                DedupeKey::compose("session_created", &[session_id.as_str()])
            }
            Self::RunStarted(d) => DedupeKey::compose("run_started", &[d.run_id.as_str()]),
            Self::NodeCreated(d) => DedupeKey::compose("node_created", &[d.node_id.as_str()]),
            Self::EdgeCreated(d) => DedupeKey::compose(
                "edge_created",
                &[
                    d.run_id.as_str(),
                    &format!("{}>{}", d.from.as_str(), d.to.as_str()),
                    d.kind.as_str(),
                ],
            ),
            Self::AdvanceRecorded(d) => DedupeKey::compose(
                "advance_recorded",
                &[d.run_id.as_str(), d.node_id.as_str(), d.attempt_id.as_str()],
            ),
            Self::NodeOutputAppended(d) => DedupeKey::compose(
                "node_output_appended",
                &[d.node_id.as_str(), d.output_id.as_str()],
            ),
            Self::PreferencesChanged(d) => DedupeKey::compose(
                "preferences_changed",
                &[d.node_id.as_str(), &d.revision.to_string()],
            ),
            Self::GapRecorded(d) => {
                let status = match d.status {
                    GapStatus::Open => "open",
                    GapStatus::Resolved => "resolved",
                };
                DedupeKey::compose("gap_recorded", &[d.run_id.as_str(), &d.gap_key, status])
            }
            Self::ContextSet(d) => DedupeKey::compose(
                "context_set",
                &[d.run_id.as_str(), &d.revision.to_string()],
            ),
            Self::DecisionTraceAppended(d) => DedupeKey::compose(
                "decision_trace_appended",
                &[d.node_id.as_str(), &d.seq.to_string()],
            ),
            Self::ObservationRecorded(d) => DedupeKey::compose(
                "observation_recorded",
                &[&d.label, &d.seq.to_string()],
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Scope + event record
// ---------------------------------------------------------------------------

/// Optional run/node scope on an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EventScope {
    /// Run scope, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    /// Node scope, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
}

impl EventScope {
    fn run(run_id: RunId) -> Self {
        Self {
            run_id: Some(run_id),
            node_id: None,
        }
    }

    fn node(node_id: NodeId) -> Self {
        Self {
            run_id: None,
            node_id: Some(node_id),
        }
    }

    fn at(run_id: RunId, node_id: NodeId) -> Self {
        Self {
            run_id: Some(run_id),
            node_id: Some(node_id),
        }
    }
}

/// One appended domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EventWire", into = "EventWire")]
pub struct DomainEvent {
    /// Server-minted event id.
    pub event_id: EventId,
    /// Position in the session log.
    pub event_index: EventIndex,
    /// Owning session.
    pub session_id: SessionId,
    /// Caller-constructed idempotency key.
    pub dedupe_key: DedupeKey,
    /// Run/node scope, if any.
    pub scope: Option<EventScope>,
    /// Typed kind + data.
    pub body: EventBody,
}

impl DomainEvent {
    /// Build an event, deriving scope and dedupe key from the body.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DedupeKeyInvalid`] if a body part violates
    /// the dedupe grammar.
    pub fn new(
        event_id: EventId,
        event_index: EventIndex,
        session_id: SessionId,
        body: EventBody,
    ) -> Result<Self, SchemaError> {
        let dedupe_key = body.default_dedupe_key(&session_id)?;
        Ok(Self {
            event_id,
            event_index,
            session_id,
            dedupe_key,
            scope: body.scope(),
            body,
        })
    }

    /// The event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.body.kind()
    }

    /// Canonical JSON bytes of the wire form.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        wr_codec::canonical_json(&value).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct EventWire {
    v: u8,
    event_id: EventId,
    event_index: EventIndex,
    session_id: SessionId,
    kind: EventKind,
    dedupe_key: DedupeKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<EventScope>,
    data: serde_json::Value,
}

impl TryFrom<EventWire> for DomainEvent {
    type Error = SchemaError;

    fn try_from(wire: EventWire) -> Result<Self, Self::Error> {
        if wire.v != EVENT_SCHEMA_VERSION {
            return Err(SchemaError::VersionUnsupported {
                record: "domain_event",
                found: wire.v,
            });
        }
        let body = EventBody::decode(wire.kind, wire.data)?;
        Ok(Self {
            event_id: wire.event_id,
            event_index: wire.event_index,
            session_id: wire.session_id,
            dedupe_key: wire.dedupe_key,
            scope: wire.scope,
            body,
        })
    }
}

impl From<DomainEvent> for EventWire {
    fn from(event: DomainEvent) -> Self {
        Self {
            v: EVENT_SCHEMA_VERSION,
            kind: event.body.kind(),
            data: event.body.data_value(),
            event_id: event.event_id,
            event_index: event.event_index,
            session_id: event.session_id,
            dedupe_key: event.dedupe_key,
            scope: event.scope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionId {
        SessionId::from_entropy([1; 16])
    }

    fn run_started_body() -> EventBody {
        EventBody::RunStarted(RunStartedData {
            run_id: RunId::from_entropy([2; 16]),
            workflow_id: "triage".to_string(),
            workflow_hash: wr_codec::sha256_digest(b"compiled"),
        })
    }

    #[test]
    fn wire_round_trips() {
        let event = DomainEvent::new(
            EventId::from_entropy([9; 16]),
            EventIndex::ZERO,
            session(),
            run_started_body(),
        )
        .unwrap();
        let json = serde_json::to_string(&event).unwrap();
        let back: DomainEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn wire_carries_version_and_kind() {
        let event = DomainEvent::new(
            EventId::from_entropy([9; 16]),
            EventIndex::ZERO,
            session(),
            run_started_body(),
        )
        .unwrap();
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["v"], 1);
        assert_eq!(v["kind"], "run_started");
        assert!(v["data"]["workflowHash"].is_string());
        assert_eq!(v["scope"]["runId"], v["data"]["runId"]);
    }

    #[test]
    fn unknown_top_level_key_rejected() {
        let event = DomainEvent::new(
            EventId::from_entropy([9; 16]),
            EventIndex::ZERO,
            session(),
            run_started_body(),
        )
        .unwrap();
        let mut v = serde_json::to_value(&event).unwrap();
        v["surprise"] = serde_json::json!(true);
        assert!(serde_json::from_value::<DomainEvent>(v).is_err());
    }

    #[test]
    fn unknown_data_key_rejected() {
        let event = DomainEvent::new(
            EventId::from_entropy([9; 16]),
            EventIndex::ZERO,
            session(),
            run_started_body(),
        )
        .unwrap();
        let mut v = serde_json::to_value(&event).unwrap();
        v["data"]["surprise"] = serde_json::json!(1);
        assert!(serde_json::from_value::<DomainEvent>(v).is_err());
    }

    #[test]
    fn mismatched_kind_data_rejected() {
        let event = DomainEvent::new(
            EventId::from_entropy([9; 16]),
            EventIndex::ZERO,
            session(),
            run_started_body(),
        )
        .unwrap();
        let mut v = serde_json::to_value(&event).unwrap();
        v["kind"] = serde_json::json!("gap_recorded");
        assert!(serde_json::from_value::<DomainEvent>(v).is_err());
    }

    #[test]
    fn dedupe_key_never_uses_event_id() {
        let a = DomainEvent::new(
            EventId::from_entropy([9; 16]),
            EventIndex::ZERO,
            session(),
            run_started_body(),
        )
        .unwrap();
        let b = DomainEvent::new(
            EventId::from_entropy([10; 16]),
            EventIndex::ZERO,
            session(),
            run_started_body(),
        )
        .unwrap();
        assert_ne!(a.event_id, b.event_id);
        assert_eq!(a.dedupe_key, b.dedupe_key);
    }

    #[test]
    fn canonical_bytes_are_key_order_independent() {
        let event = DomainEvent::new(
            EventId::from_entropy([9; 16]),
            EventIndex::new(3),
            session(),
            run_started_body(),
        )
        .unwrap();
        let bytes = event.canonical_bytes();
        let reparsed: DomainEvent =
            serde_json::from_slice(&bytes).expect("canonical bytes reparse");
        assert_eq!(reparsed.canonical_bytes(), bytes);
    }
}
