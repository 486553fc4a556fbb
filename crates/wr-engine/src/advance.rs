// SPDX-License-Identifier: MIT OR Apache-2.0

//! Continue and checkpoint: replay-idempotent progress.
//!
//! An advance is keyed by `(session, node, attempt)`. The first call
//! records exactly one `advance_recorded` event; every replay of the
//! same token pair returns the stored outcome byte-for-byte without
//! touching the log. Checkpoints are deterministic mints over the same
//! coordinates.

use crate::{Engine, EngineError};
use std::time::Instant;
use tracing::{debug, info};
use wr_event::{
    AdvanceOutcome, AdvanceRecordedData, AppendPlan, BlockedSnapshot, CompiledWorkflow,
    CompletedSet, DomainEvent, EdgeCreatedData, EdgeKind, EngineState, EventBody,
    ExecutionSnapshot, NodeCreatedData, PendingStep, StepInstanceKey,
};
use wr_ident::{AttemptId, BrandedId, EventIndex, NodeId, RunId, SessionId};
use wr_projection::{project_node_outputs, project_preferences, project_run_dags};
use wr_telemetry::OpKind;
use wr_token::TokenPayload;

/// What the caller wants from `continue_workflow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueIntent {
    /// Record (or replay) an advance.
    Advance,
    /// Re-render the prompt at the current node; never writes.
    Rehydrate,
}

/// A `continue_workflow` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinueRequest {
    /// Advance or rehydrate.
    pub intent: ContinueIntent,
    /// The state token naming the position.
    pub state_token: String,
    /// The ack token; required for advance, forbidden for rehydrate.
    pub ack_token: Option<String>,
}

/// The outcome of `continue_workflow`.
#[derive(Debug, Clone, PartialEq)]
pub enum ContinueOutcome {
    /// The step completed; execution stands at a new node.
    Advanced {
        /// The new node.
        next_node_id: NodeId,
        /// Snapshot frozen at the new node.
        snapshot_ref: wr_codec::SnapshotRef,
        /// State token at the new node.
        state_token: String,
    },
    /// The step blocked; the stored block is returned verbatim.
    Blocked {
        /// The recorded block.
        block: BlockedSnapshot,
    },
    /// The rendered recovery prompt.
    Rehydrated {
        /// The prompt text, within the recovery byte budget.
        prompt: String,
    },
}

struct StatePosition {
    session: SessionId,
    run: RunId,
    node: NodeId,
    workflow_hash_ref: [u8; 16],
}

impl Engine {
    async fn verify_state_token(&self, token: &str) -> Result<StatePosition, EngineError> {
        let keyring = self.keyring().await?;
        let parsed = wr_token::parse(token)?;
        match wr_token::verify(&parsed, &keyring)? {
            TokenPayload::State {
                session,
                run,
                node,
                workflow_hash_ref,
            } => Ok(StatePosition {
                session,
                run,
                node,
                workflow_hash_ref,
            }),
            _ => Err(EngineError::invalid("a state token is required")),
        }
    }

    async fn verify_ack_token(
        &self,
        token: &str,
        position: &StatePosition,
    ) -> Result<AttemptId, EngineError> {
        let keyring = self.keyring().await?;
        let parsed = wr_token::parse(token)?;
        let TokenPayload::Ack {
            session,
            run,
            node,
            attempt,
        } = wr_token::verify(&parsed, &keyring)?
        else {
            return Err(EngineError::invalid("an ack token is required"));
        };
        if session != position.session || run != position.run || node != position.node {
            return Err(EngineError::invalid(
                "ack token does not match the state token's position",
            ));
        }
        Ok(attempt)
    }

    /// Mint the ack token for one advance attempt at a position.
    ///
    /// # Errors
    ///
    /// Token or keyring failures, verbatim.
    pub async fn mint_ack_token(
        &self,
        state_token: &str,
        attempt: &AttemptId,
    ) -> Result<String, EngineError> {
        let position = self.verify_state_token(state_token).await?;
        let keyring = self.keyring().await?;
        Ok(wr_token::sign(
            &TokenPayload::Ack {
                session: position.session,
                run: position.run,
                node: position.node,
                attempt: attempt.clone(),
            },
            &keyring,
        )?)
    }

    /// Advance or rehydrate at the position named by the tokens.
    ///
    /// Advance is idempotent on `(intent, stateToken, ackToken)`: replay
    /// any number of times and exactly one `advance_recorded` event
    /// exists, with every response identical to the first. Rehydrate
    /// forbids an ack token and never writes.
    ///
    /// # Errors
    ///
    /// Component failures verbatim, or [`EngineError::InvalidRequest`]
    /// for token combinations that do not name a valid operation.
    pub async fn continue_workflow(
        &self,
        request: ContinueRequest,
    ) -> Result<ContinueOutcome, EngineError> {
        let started = Instant::now();
        let op = match request.intent {
            ContinueIntent::Advance => OpKind::Advance,
            ContinueIntent::Rehydrate => OpKind::Rehydrate,
        };
        let result = self.continue_inner(request).await;
        self.metrics.record(op, started.elapsed(), result.is_ok());
        result
    }

    async fn continue_inner(
        &self,
        request: ContinueRequest,
    ) -> Result<ContinueOutcome, EngineError> {
        let position = self.verify_state_token(&request.state_token).await?;
        match request.intent {
            ContinueIntent::Rehydrate => {
                if request.ack_token.is_some() {
                    return Err(EngineError::invalid("rehydrate forbids an ack token"));
                }
                self.rehydrate(&position).await
            }
            ContinueIntent::Advance => {
                let Some(ack_token) = &request.ack_token else {
                    return Err(EngineError::invalid("advance requires an ack token"));
                };
                let attempt = self.verify_ack_token(ack_token, &position).await?;
                self.advance(&position, &attempt).await
            }
        }
    }

    async fn advance(
        &self,
        position: &StatePosition,
        attempt: &AttemptId,
    ) -> Result<ContinueOutcome, EngineError> {
        let session = position.session.clone();
        self.gate
            .with_healthy_session_lock::<_, EngineError, _, _>(&session, |witness, log| {
                async move {
                    // Replay: the stored outcome is the response, verbatim.
                    for event in &log.events {
                        if let EventBody::AdvanceRecorded(data) = &event.body {
                            if data.node_id == position.node && &data.attempt_id == attempt {
                                debug!(
                                    target: "wr.engine",
                                    session = %position.session,
                                    node = %position.node,
                                    "advance replayed from the log"
                                );
                                return self.stored_outcome(position, &data.outcome).await;
                            }
                        }
                    }

                    let dags = project_run_dags(&log.events)?;
                    let dag = dags.runs.get(&position.run).ok_or_else(|| {
                        EngineError::invalid("state token names an unknown run")
                    })?;
                    if TokenPayload::workflow_hash_ref_of(&dag.workflow_hash)
                        != position.workflow_hash_ref
                    {
                        return Err(EngineError::invalid(
                            "state token is pinned to a different workflow",
                        ));
                    }
                    let node_info = dag.nodes_by_id.get(&position.node).ok_or_else(|| {
                        EngineError::invalid("state token names an unknown node")
                    })?;
                    if node_info.terminated {
                        return Err(EngineError::invalid("node was terminally blocked"));
                    }

                    let workflow = self
                        .pinned
                        .get(&dag.workflow_hash)
                        .await?
                        .ok_or_else(|| {
                            EngineError::invalid("pinned workflow is missing from the store")
                        })?;
                    let snapshot = self
                        .snapshots
                        .get(&node_info.snapshot_ref)
                        .await?
                        .ok_or_else(|| {
                            EngineError::invalid("node snapshot is missing from the store")
                        })?;

                    let (next_state, next_title) =
                        advance_engine_state(&workflow, &snapshot.engine_payload.engine_state)?;
                    let next_snapshot = ExecutionSnapshot::new(next_state);
                    let next_ref = self.snapshots.put(&next_snapshot).await?;
                    let next_node: NodeId = self.mint()?;

                    let base = log.last_event_index().map_or(0, |i| i.value() + 1);
                    let bodies = [
                        EventBody::NodeCreated(NodeCreatedData {
                            run_id: position.run.clone(),
                            node_id: next_node.clone(),
                            parent_node_id: Some(position.node.clone()),
                            snapshot_ref: next_ref,
                            title: next_title,
                        }),
                        EventBody::EdgeCreated(EdgeCreatedData {
                            run_id: position.run.clone(),
                            from: position.node.clone(),
                            to: next_node.clone(),
                            kind: EdgeKind::AckedStep,
                        }),
                        EventBody::AdvanceRecorded(AdvanceRecordedData {
                            run_id: position.run.clone(),
                            node_id: position.node.clone(),
                            attempt_id: attempt.clone(),
                            outcome: AdvanceOutcome::Advanced {
                                next_node_id: next_node.clone(),
                                snapshot_ref: next_ref,
                            },
                        }),
                    ];
                    let mut events = Vec::with_capacity(bodies.len());
                    for (i, body) in bodies.into_iter().enumerate() {
                        events.push(DomainEvent::new(
                            self.mint()?,
                            EventIndex::new(base + i as u64),
                            position.session.clone(),
                            body,
                        )?);
                    }
                    self.store
                        .append(
                            &witness,
                            &AppendPlan {
                                events,
                                snapshot_pins: vec![next_ref],
                            },
                        )
                        .await?;

                    let state_token = self.state_token_at(position, &next_node).await?;
                    info!(
                        target: "wr.engine",
                        session = %position.session,
                        from = %position.node,
                        to = %next_node,
                        "advance recorded"
                    );
                    Ok(ContinueOutcome::Advanced {
                        next_node_id: next_node,
                        snapshot_ref: next_ref,
                        state_token,
                    })
                }
            })
            .await
    }

    async fn stored_outcome(
        &self,
        position: &StatePosition,
        outcome: &AdvanceOutcome,
    ) -> Result<ContinueOutcome, EngineError> {
        match outcome {
            AdvanceOutcome::Advanced {
                next_node_id,
                snapshot_ref,
            } => Ok(ContinueOutcome::Advanced {
                next_node_id: next_node_id.clone(),
                snapshot_ref: *snapshot_ref,
                state_token: self.state_token_at(position, next_node_id).await?,
            }),
            AdvanceOutcome::Blocked { block } => Ok(ContinueOutcome::Blocked {
                block: block.clone(),
            }),
        }
    }

    async fn state_token_at(
        &self,
        position: &StatePosition,
        node: &NodeId,
    ) -> Result<String, EngineError> {
        let keyring = self.keyring().await?;
        Ok(wr_token::sign(
            &TokenPayload::State {
                session: position.session.clone(),
                run: position.run.clone(),
                node: node.clone(),
                workflow_hash_ref: position.workflow_hash_ref,
            },
            &keyring,
        )?)
    }

    async fn rehydrate(&self, position: &StatePosition) -> Result<ContinueOutcome, EngineError> {
        let log = self.store.load(&position.session).await?;
        let dags = project_run_dags(&log.events)?;
        let dag = dags
            .runs
            .get(&position.run)
            .ok_or_else(|| EngineError::invalid("state token names an unknown run"))?;
        let outputs = project_node_outputs(&log.events)?;
        let preferences = project_preferences(&log.events)?;
        let workflow = self
            .pinned
            .get(&dag.workflow_hash)
            .await?
            .ok_or_else(|| EngineError::invalid("pinned workflow is missing from the store"))?;

        let prompt = crate::recovery::render_recovery_prompt(
            &workflow,
            dag,
            &outputs,
            &preferences,
            &dags.parent_map(),
            &position.node,
            self.config.recovery_budget_bytes,
        )?;
        Ok(ContinueOutcome::Rehydrated { prompt })
    }

    /// Mint a checkpoint token at the position named by `state_token`.
    ///
    /// Deterministic: the attempt is the latest recorded advance attempt
    /// at the node, or a stable derivation from the node itself when no
    /// advance was recorded yet. Same inputs + same keyring = the same
    /// token, so the operation is idempotent.
    ///
    /// # Errors
    ///
    /// Component failures verbatim.
    pub async fn checkpoint_workflow(&self, state_token: &str) -> Result<String, EngineError> {
        let started = Instant::now();
        let result = self.checkpoint_inner(state_token).await;
        self.metrics
            .record(OpKind::Checkpoint, started.elapsed(), result.is_ok());
        result
    }

    async fn checkpoint_inner(&self, state_token: &str) -> Result<String, EngineError> {
        let position = self.verify_state_token(state_token).await?;
        let log = self.store.load(&position.session).await?;

        let mut attempt: Option<AttemptId> = None;
        for event in &log.events {
            if let EventBody::AdvanceRecorded(data) = &event.body {
                if data.node_id == position.node {
                    attempt = Some(data.attempt_id.clone());
                }
            }
        }
        let attempt =
            attempt.unwrap_or_else(|| AttemptId::from_entropy(position.node.entropy()));

        let keyring = self.keyring().await?;
        Ok(wr_token::sign(
            &TokenPayload::Checkpoint {
                session: position.session,
                run: position.run,
                node: position.node,
                attempt,
            },
            &keyring,
        )?)
    }
}

/// Step the engine state forward by one completed step.
fn advance_engine_state(
    workflow: &CompiledWorkflow,
    state: &EngineState,
) -> Result<(EngineState, String), EngineError> {
    let step_at = |index: usize| workflow.steps.get(index);

    let (completing_index, mut completed) = match state {
        EngineState::Init => {
            if workflow.steps.is_empty() {
                return Err(EngineError::invalid("workflow has no steps"));
            }
            (0, Vec::new())
        }
        EngineState::Running {
            completed, pending, ..
        } => {
            let index = workflow
                .steps
                .iter()
                .position(|s| {
                    StepInstanceKey::new(&s.id, &pending.loop_path)
                        .map(|key| key == pending.key)
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    EngineError::invalid("pending step is not part of the pinned workflow")
                })?;
            (index, completed.values.clone())
        }
        EngineState::Complete => {
            return Err(EngineError::invalid("run is already complete"));
        }
    };

    let completing = step_at(completing_index)
        .ok_or_else(|| EngineError::invalid("workflow step index out of range"))?;
    completed.push(StepInstanceKey::new(&completing.id, &[])?);

    match step_at(completing_index + 1) {
        Some(next) => Ok((
            EngineState::Running {
                completed: CompletedSet::from_keys(completed),
                loop_stack: vec![],
                pending: PendingStep {
                    key: StepInstanceKey::new(&next.id, &[])?,
                    loop_path: vec![],
                },
            },
            next.title.clone(),
        )),
        None => Ok((EngineState::Complete, "complete".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wr_event::CompiledStep;

    fn workflow() -> CompiledWorkflow {
        CompiledWorkflow::new(
            "triage",
            vec![
                CompiledStep {
                    id: "collect".to_string(),
                    title: "Collect".to_string(),
                    prompt: "Collect.".to_string(),
                },
                CompiledStep {
                    id: "diagnose".to_string(),
                    title: "Diagnose".to_string(),
                    prompt: "Diagnose.".to_string(),
                },
            ],
        )
    }

    #[test]
    fn init_advances_to_second_step() {
        let (state, title) = advance_engine_state(&workflow(), &EngineState::Init).unwrap();
        assert_eq!(title, "Diagnose");
        let EngineState::Running {
            completed, pending, ..
        } = state
        else {
            panic!("expected running");
        };
        assert_eq!(completed.values.len(), 1);
        assert_eq!(pending.key.as_str(), "diagnose");
    }

    #[test]
    fn last_step_advances_to_complete() {
        let (mid, _) = advance_engine_state(&workflow(), &EngineState::Init).unwrap();
        let (done, title) = advance_engine_state(&workflow(), &mid).unwrap();
        assert_eq!(done, EngineState::Complete);
        assert_eq!(title, "complete");
    }

    #[test]
    fn complete_cannot_advance() {
        let err = advance_engine_state(&workflow(), &EngineState::Complete).unwrap_err();
        assert_eq!(err.code(), "REQUEST_INVALID");
    }
}
