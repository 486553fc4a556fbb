// SPDX-License-Identifier: MIT OR Apache-2.0

//! Compiled workflow snapshots.
//!
//! Compilation itself happens upstream; the core only pins the compiled
//! result by hash so an executing run can never observe a workflow edit.

use serde::{Deserialize, Serialize};
use wr_codec::WorkflowHash;

/// One compiled step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CompiledStep {
    /// Step identifier, unique within the workflow.
    pub id: String,
    /// Human-facing title.
    pub title: String,
    /// Prompt text handed to the agent at this step.
    pub prompt: String,
}

/// A compiled workflow, pinned by content hash for the lifetime of every
/// run that references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CompiledWorkflow {
    /// Record schema version, always `1`.
    pub v: u8,
    /// Human-facing workflow identifier.
    pub workflow_id: String,
    /// Steps in execution order.
    pub steps: Vec<CompiledStep>,
}

impl CompiledWorkflow {
    /// Build a v1 compiled workflow.
    #[must_use]
    pub fn new(workflow_id: impl Into<String>, steps: Vec<CompiledStep>) -> Self {
        Self {
            v: 1,
            workflow_id: workflow_id.into(),
            steps,
        }
    }

    /// Canonical JSON bytes, the form that is hashed for pinning.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        wr_codec::canonical_json(&value).unwrap_or_default()
    }

    /// The content hash this workflow pins under.
    #[must_use]
    pub fn content_hash(&self) -> WorkflowHash {
        wr_codec::sha256_digest(&self.canonical_bytes())
    }

    /// Look up a step by id.
    #[must_use]
    pub fn step(&self, id: &str) -> Option<&CompiledStep> {
        self.steps.iter().find(|s| s.id == id)
    }
}
