// SPDX-License-Identifier: MIT OR Apache-2.0

//! The run DAG: nodes, edges, tips, and the preferred branch.

use crate::{ProjectionError, ensure_ordered_prefix};
use std::collections::{BTreeMap, BTreeSet};
use wr_codec::{SnapshotRef, WorkflowHash};
use wr_event::{
    AdvanceOutcome, BlockedSnapshot, DomainEvent, EdgeKind, EventBody,
};
use wr_ident::{EventIndex, NodeId, RunId};

/// Node metadata inside a run DAG.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    /// The node.
    pub node_id: NodeId,
    /// Parent in the DAG; absent for the root.
    pub parent_node_id: Option<NodeId>,
    /// Snapshot frozen at this node.
    pub snapshot_ref: SnapshotRef,
    /// Human-facing title.
    pub title: String,
    /// Whether a terminal block ended this node.
    pub terminated: bool,
    /// Index of the `node_created` event.
    pub created_at: EventIndex,
}

/// One deduplicated edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Edge {
    /// Source node.
    pub from: NodeId,
    /// Target node.
    pub to: NodeId,
    /// Edge kind.
    pub kind: EdgeKind,
}

/// The DAG of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunDag {
    /// The run.
    pub run_id: RunId,
    /// Workflow identifier from `run_started`.
    pub workflow_id: String,
    /// Pinned workflow hash from `run_started`.
    pub workflow_hash: WorkflowHash,
    /// Every node, keyed by id.
    pub nodes_by_id: BTreeMap<NodeId, NodeInfo>,
    /// Deduplicated edges in first-appearance order.
    pub edges: Vec<Edge>,
    /// Non-terminated nodes with no outgoing edge, in id order.
    pub tip_node_ids: Vec<NodeId>,
    /// Tip of the acked (preferred) branch, if one exists.
    pub preferred_tip_node_id: Option<NodeId>,
    /// The root node, once created.
    pub root_node_id: Option<NodeId>,
}

/// All run DAGs of a session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunDagProjection {
    /// DAGs keyed by run id.
    pub runs: BTreeMap<RunId, RunDag>,
}

impl RunDagProjection {
    /// Parent map across every run, for preference propagation.
    #[must_use]
    pub fn parent_map(&self) -> BTreeMap<NodeId, NodeId> {
        let mut map = BTreeMap::new();
        for dag in self.runs.values() {
            for node in dag.nodes_by_id.values() {
                if let Some(parent) = &node.parent_node_id {
                    map.insert(node.node_id.clone(), parent.clone());
                }
            }
        }
        map
    }
}

/// Project the run DAGs of a prefix.
///
/// Referential contradictions (a node for an unknown run, an edge to an
/// unknown node, a duplicated node id) fail closed; event kinds the DAG
/// does not consume are ignored.
///
/// # Errors
///
/// [`ProjectionError::InvariantViolation`] on a broken precondition or a
/// contradiction.
pub fn project_run_dags(events: &[DomainEvent]) -> Result<RunDagProjection, ProjectionError> {
    ensure_ordered_prefix(events)?;

    let mut runs: BTreeMap<RunId, RunDag> = BTreeMap::new();
    let mut edge_seen: BTreeSet<(RunId, NodeId, NodeId, EdgeKind)> = BTreeSet::new();

    for event in events {
        match &event.body {
            EventBody::RunStarted(data) => {
                if runs.contains_key(&data.run_id) {
                    return Err(ProjectionError::new(format!(
                        "run {} started twice",
                        data.run_id
                    )));
                }
                runs.insert(
                    data.run_id.clone(),
                    RunDag {
                        run_id: data.run_id.clone(),
                        workflow_id: data.workflow_id.clone(),
                        workflow_hash: data.workflow_hash,
                        nodes_by_id: BTreeMap::new(),
                        edges: Vec::new(),
                        tip_node_ids: Vec::new(),
                        preferred_tip_node_id: None,
                        root_node_id: None,
                    },
                );
            }
            EventBody::NodeCreated(data) => {
                let dag = runs.get_mut(&data.run_id).ok_or_else(|| {
                    ProjectionError::new(format!(
                        "node {} created in unknown run {}",
                        data.node_id, data.run_id
                    ))
                })?;
                if dag.nodes_by_id.contains_key(&data.node_id) {
                    return Err(ProjectionError::new(format!(
                        "node {} created twice",
                        data.node_id
                    )));
                }
                if let Some(parent) = &data.parent_node_id {
                    if !dag.nodes_by_id.contains_key(parent) {
                        return Err(ProjectionError::new(format!(
                            "node {} names unknown parent {parent}",
                            data.node_id
                        )));
                    }
                } else if dag.root_node_id.is_some() {
                    return Err(ProjectionError::new(format!(
                        "run {} has two roots",
                        data.run_id
                    )));
                } else {
                    dag.root_node_id = Some(data.node_id.clone());
                }
                dag.nodes_by_id.insert(
                    data.node_id.clone(),
                    NodeInfo {
                        node_id: data.node_id.clone(),
                        parent_node_id: data.parent_node_id.clone(),
                        snapshot_ref: data.snapshot_ref,
                        title: data.title.clone(),
                        terminated: false,
                        created_at: event.event_index,
                    },
                );
            }
            EventBody::EdgeCreated(data) => {
                let dag = runs.get_mut(&data.run_id).ok_or_else(|| {
                    ProjectionError::new(format!("edge in unknown run {}", data.run_id))
                })?;
                for endpoint in [&data.from, &data.to] {
                    if !dag.nodes_by_id.contains_key(endpoint) {
                        return Err(ProjectionError::new(format!(
                            "edge names unknown node {endpoint}"
                        )));
                    }
                }
                let key = (
                    data.run_id.clone(),
                    data.from.clone(),
                    data.to.clone(),
                    data.kind,
                );
                if edge_seen.insert(key) {
                    dag.edges.push(Edge {
                        from: data.from.clone(),
                        to: data.to.clone(),
                        kind: data.kind,
                    });
                }
            }
            EventBody::AdvanceRecorded(data) => {
                // A terminal block ends its node; everything else is
                // carried by node/edge events.
                if let AdvanceOutcome::Blocked {
                    block: BlockedSnapshot::TerminalBlock { .. },
                } = &data.outcome
                {
                    if let Some(dag) = runs.get_mut(&data.run_id) {
                        if let Some(info) = dag.nodes_by_id.get_mut(&data.node_id) {
                            info.terminated = true;
                        }
                    }
                }
            }
            _ => {}
        }
    }

    for dag in runs.values_mut() {
        finish(dag);
    }
    Ok(RunDagProjection { runs })
}

fn finish(dag: &mut RunDag) {
    let mut has_outgoing: BTreeSet<&NodeId> = BTreeSet::new();
    for edge in &dag.edges {
        has_outgoing.insert(&edge.from);
    }
    dag.tip_node_ids = dag
        .nodes_by_id
        .values()
        .filter(|n| !n.terminated && !has_outgoing.contains(&n.node_id))
        .map(|n| n.node_id.clone())
        .collect();

    // Follow acked_step edges from the root; the newest ack from a node
    // wins when history recorded more than one.
    let mut acked_next: BTreeMap<&NodeId, &NodeId> = BTreeMap::new();
    for edge in &dag.edges {
        if edge.kind == EdgeKind::AckedStep {
            acked_next.insert(&edge.from, &edge.to);
        }
    }
    let mut cursor = dag.root_node_id.as_ref();
    let mut hops = 0usize;
    while let Some(current) = cursor {
        match acked_next.get(current) {
            Some(next) if hops <= dag.nodes_by_id.len() => {
                cursor = Some(*next);
                hops += 1;
            }
            _ => break,
        }
    }
    dag.preferred_tip_node_id = cursor.cloned();
}
