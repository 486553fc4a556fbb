// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recovery prompt rendering for rehydrate-only calls.
//!
//! The prompt is assembled from projections alone — ancestry recaps,
//! downstream recaps along the preferred branch, and function
//! definitions resolved closest-wins — then cut to a UTF-8-safe byte
//! budget. Truncation never splits a code point: the cut rounds down to
//! a character boundary before the marker lands.

use std::collections::BTreeMap;
use wr_event::{CompiledWorkflow, EdgeKind};
use wr_ident::NodeId;
use wr_projection::{
    NodeOutputsProjection, PreferencesProjection, ProjectionError, RunDag, ancestry,
};

/// The fixed truncation marker, 13 bytes.
pub const RECOVERY_TRUNCATION_MARKER: &str = "\n\n[TRUNCATED]";

const OMISSION_NOTE: &str = "\nEarlier context was omitted to fit the recovery budget.";

/// Render the recovery prompt at `node`, within `budget_bytes`.
///
/// When the assembled prompt exceeds the budget it is truncated to
/// `budget_bytes - 13` (rounded down to a UTF-8 boundary), the marker is
/// appended, and a one-line omission note follows the marker.
///
/// # Errors
///
/// [`ProjectionError::InvariantViolation`] if the parent map cycles
/// during ancestry or preference resolution.
pub fn render_recovery_prompt(
    workflow: &CompiledWorkflow,
    dag: &RunDag,
    outputs: &NodeOutputsProjection,
    preferences: &PreferencesProjection,
    parent_map: &BTreeMap<NodeId, NodeId>,
    node: &NodeId,
    budget_bytes: usize,
) -> Result<String, ProjectionError> {
    let mut prompt = String::new();
    prompt.push_str(&format!("# Resuming workflow '{}'\n", workflow.workflow_id));
    if let Some(info) = dag.nodes_by_id.get(node) {
        prompt.push_str(&format!("Current node: {} — {}\n", info.node_id, info.title));
    }

    // Ancestry recap, root first.
    let path = ancestry(node, parent_map)?;
    let mut ancestor_recaps = Vec::new();
    for ancestor in path.iter().rev() {
        if ancestor == node {
            continue;
        }
        if let Some(recap) = outputs.of(ancestor).current_recap {
            if let Some(snippet) = recap.snippet {
                ancestor_recaps.push(snippet);
            }
        }
    }
    if !ancestor_recaps.is_empty() {
        prompt.push_str("\n## How you got here\n");
        for snippet in &ancestor_recaps {
            prompt.push_str(&format!("- {snippet}\n"));
        }
    }

    // Downstream recap along the acked branch.
    let mut acked_next: BTreeMap<&NodeId, &NodeId> = BTreeMap::new();
    for edge in &dag.edges {
        if edge.kind == EdgeKind::AckedStep {
            acked_next.insert(&edge.from, &edge.to);
        }
    }
    let mut downstream = Vec::new();
    let mut cursor = node;
    let mut hops = 0usize;
    while let Some(next) = acked_next.get(cursor) {
        if hops > dag.nodes_by_id.len() {
            break;
        }
        if let Some(recap) = outputs.of(next).current_recap {
            if let Some(snippet) = recap.snippet {
                downstream.push(snippet);
            }
        }
        cursor = next;
        hops += 1;
    }
    if !downstream.is_empty() {
        prompt.push_str("\n## Work already done past this node\n");
        for snippet in &downstream {
            prompt.push_str(&format!("- {snippet}\n"));
        }
    }

    // Function definitions, closest scope winning.
    let effective = preferences.effective_at(node, parent_map)?;
    if !effective.functions.is_empty() {
        prompt.push_str("\n## Functions in scope\n");
        for (name, definition) in &effective.functions {
            prompt.push_str(&format!("### {name}\n{definition}\n"));
        }
    }

    Ok(apply_budget(prompt, budget_bytes))
}

fn apply_budget(prompt: String, budget_bytes: usize) -> String {
    if prompt.len() <= budget_bytes {
        return prompt;
    }
    let limit = budget_bytes.saturating_sub(RECOVERY_TRUNCATION_MARKER.len());
    let mut cut = limit.min(prompt.len());
    while cut > 0 && !prompt.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = prompt[..cut].to_string();
    out.push_str(RECOVERY_TRUNCATION_MARKER);
    out.push_str(OMISSION_NOTE);
    out
}
