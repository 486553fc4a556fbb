// SPDX-License-Identifier: MIT OR Apache-2.0

//! Starting a workflow: pin, create, hand out the first state token.

use crate::{Engine, EngineError};
use tracing::info;
use wr_codec::{SnapshotRef, WorkflowHash};
use wr_event::{
    AppendPlan, CompiledWorkflow, DomainEvent, EngineState, EventBody, ExecutionSnapshot,
    NodeCreatedData, RunStartedData, SessionCreatedData,
};
use wr_ident::{EventIndex, NodeId, RunId, SessionId};
use wr_token::TokenPayload;

/// Everything a caller needs after `start_workflow`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedWorkflow {
    /// The new session.
    pub session_id: SessionId,
    /// The new run.
    pub run_id: RunId,
    /// The root node.
    pub node_id: NodeId,
    /// Hash the workflow was pinned under.
    pub workflow_hash: WorkflowHash,
    /// Snapshot frozen at the root node.
    pub snapshot_ref: SnapshotRef,
    /// Opaque state token for the first `continue_workflow` call.
    pub state_token: String,
}

impl Engine {
    /// Start a workflow: pin the compiled form, mint a session, append
    /// the creation events, and return a state token at the root node.
    ///
    /// Not idempotent by design — every call creates a fresh session.
    ///
    /// # Errors
    ///
    /// Any component failure, verbatim.
    pub async fn start_workflow(
        &self,
        workflow: CompiledWorkflow,
    ) -> Result<StartedWorkflow, EngineError> {
        let workflow_hash = workflow.content_hash();
        self.pinned.put(&workflow_hash, &workflow).await?;

        let session_id: SessionId = self.mint()?;
        let run_id: RunId = self.mint()?;
        let node_id: NodeId = self.mint()?;

        let snapshot = ExecutionSnapshot::new(EngineState::Init);
        let snapshot_ref = self.snapshots.put(&snapshot).await?;

        let bodies = [
            EventBody::SessionCreated(SessionCreatedData {}),
            EventBody::RunStarted(RunStartedData {
                run_id: run_id.clone(),
                workflow_id: workflow.workflow_id.clone(),
                workflow_hash,
            }),
            EventBody::NodeCreated(NodeCreatedData {
                run_id: run_id.clone(),
                node_id: node_id.clone(),
                parent_node_id: None,
                snapshot_ref,
                title: workflow
                    .steps
                    .first()
                    .map_or_else(|| "start".to_string(), |s| s.title.clone()),
            }),
        ];
        let mut events = Vec::with_capacity(bodies.len());
        for (i, body) in bodies.into_iter().enumerate() {
            events.push(DomainEvent::new(
                self.mint()?,
                EventIndex::new(i as u64),
                session_id.clone(),
                body,
            )?);
        }
        let plan = AppendPlan {
            events,
            snapshot_pins: vec![snapshot_ref],
        };

        let store = self.store.clone();
        self.gate
            .with_healthy_session_lock::<_, EngineError, _, _>(&session_id, |witness, _log| {
                let plan = plan.clone();
                let store = store.clone();
                async move { Ok(store.append(&witness, &plan).await?) }
            })
            .await?;

        let keyring = self.keyring().await?;
        let state_token = wr_token::sign(
            &TokenPayload::State {
                session: session_id.clone(),
                run: run_id.clone(),
                node: node_id.clone(),
                workflow_hash_ref: TokenPayload::workflow_hash_ref_of(&workflow_hash),
            },
            &keyring,
        )?;

        info!(
            target: "wr.engine",
            session = %session_id,
            run = %run_id,
            workflow = %workflow.workflow_id,
            "workflow started"
        );
        Ok(StartedWorkflow {
            session_id,
            run_id,
            node_id,
            workflow_hash,
            snapshot_ref,
            state_token,
        })
    }
}
