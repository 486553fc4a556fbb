// SPDX-License-Identifier: MIT OR Apache-2.0
//! Replay idempotency of `continue_workflow`.

use wr_config::WorkrailConfig;
use wr_engine::{ContinueIntent, ContinueOutcome, ContinueRequest, Engine};
use wr_event::{
    AdvanceOutcome, AdvanceRecordedData, AppendPlan, BlockReason, BlockedSnapshot, Blocker,
    BlockerCode, BlockerPointer, CompiledStep, CompiledWorkflow, DomainEvent, EventBody,
};
use wr_ident::{AttemptId, BrandedId, EventIndex};

fn engine(dir: &std::path::Path) -> Engine {
    Engine::open(WorkrailConfig {
        data_dir: Some(dir.display().to_string()),
        ..WorkrailConfig::default()
    })
}

fn workflow() -> CompiledWorkflow {
    CompiledWorkflow::new(
        "triage",
        vec![
            CompiledStep {
                id: "collect".to_string(),
                title: "Collect".to_string(),
                prompt: "Collect the failing output.".to_string(),
            },
            CompiledStep {
                id: "diagnose".to_string(),
                title: "Diagnose".to_string(),
                prompt: "Find the cause.".to_string(),
            },
        ],
    )
}

fn blocked_outcome(retry: &AttemptId) -> AdvanceOutcome {
    AdvanceOutcome::Blocked {
        block: BlockedSnapshot::retryable(
            retry.clone(),
            BlockReason::OutputContractUnmet,
            vec![
                Blocker::new(
                    BlockerCode::MissingRequiredOutput,
                    BlockerPointer::OutputContract {
                        contract_ref: "wr.test".to_string(),
                    },
                    "Test output missing",
                    Some("Provide the test output payload".to_string()),
                )
                .unwrap(),
            ],
        )
        .unwrap(),
    }
}

#[tokio::test]
async fn blocked_advance_replays_byte_identically() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let started = engine.start_workflow(workflow()).await.unwrap();

    // Seed a blocked advance_recorded at the root node under attempt A.
    let attempt = AttemptId::from_entropy([77; 16]);
    let retry = AttemptId::from_entropy([78; 16]);
    let store = wr_store::SessionStore::new(dir.path());
    let log = store.load(&started.session_id).await.unwrap();
    let next_index = log.last_event_index().unwrap().value() + 1;
    let seed = DomainEvent::new(
        wr_ident::EventId::from_entropy([55; 16]),
        EventIndex::new(next_index),
        started.session_id.clone(),
        EventBody::AdvanceRecorded(AdvanceRecordedData {
            run_id: started.run_id.clone(),
            node_id: started.node_id.clone(),
            attempt_id: attempt.clone(),
            outcome: blocked_outcome(&retry),
        }),
    )
    .unwrap();
    let guard = store.acquire_lock(&started.session_id).await.unwrap();
    store
        .append(&guard.witness(), &AppendPlan::events(vec![seed]))
        .await
        .unwrap();
    drop(guard);

    // Call continue_workflow three times with the original token pair.
    let ack = engine
        .mint_ack_token(&started.state_token, &attempt)
        .await
        .unwrap();
    let mut responses = Vec::new();
    for _ in 0..3 {
        let outcome = engine
            .continue_workflow(ContinueRequest {
                intent: ContinueIntent::Advance,
                state_token: started.state_token.clone(),
                ack_token: Some(ack.clone()),
            })
            .await
            .unwrap();
        responses.push(outcome);
    }

    // Byte-identical responses, blockers and ordering included.
    assert_eq!(responses[0], responses[1]);
    assert_eq!(responses[1], responses[2]);
    let ContinueOutcome::Blocked { block } = &responses[0] else {
        panic!("expected the stored blocked outcome");
    };
    let json = serde_json::to_value(block).unwrap();
    assert_eq!(json["kind"], "retryable_block");
    assert_eq!(json["blockers"][0]["code"], "MISSING_REQUIRED_OUTPUT");
    assert_eq!(json["blockers"][0]["message"], "Test output missing");

    // Exactly one advance_recorded remains.
    let log = store.load(&started.session_id).await.unwrap();
    let advances = log
        .events
        .iter()
        .filter(|e| matches!(e.body, EventBody::AdvanceRecorded(_)))
        .count();
    assert_eq!(advances, 1);
}

#[tokio::test]
async fn successful_advance_is_idempotent_too() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let started = engine.start_workflow(workflow()).await.unwrap();

    let attempt = AttemptId::from_entropy([91; 16]);
    let ack = engine
        .mint_ack_token(&started.state_token, &attempt)
        .await
        .unwrap();
    let request = ContinueRequest {
        intent: ContinueIntent::Advance,
        state_token: started.state_token.clone(),
        ack_token: Some(ack),
    };

    let first = engine.continue_workflow(request.clone()).await.unwrap();
    let second = engine.continue_workflow(request.clone()).await.unwrap();
    let third = engine.continue_workflow(request).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(second, third);

    let ContinueOutcome::Advanced {
        next_node_id,
        state_token,
        ..
    } = &first
    else {
        panic!("expected an advance");
    };
    assert_ne!(next_node_id, &started.node_id);
    assert!(state_token.starts_with("st1"));

    let store = wr_store::SessionStore::new(dir.path());
    let log = store.load(&started.session_id).await.unwrap();
    let advances = log
        .events
        .iter()
        .filter(|e| matches!(e.body, EventBody::AdvanceRecorded(_)))
        .count();
    assert_eq!(advances, 1);
}

#[tokio::test]
async fn rehydrate_forbids_ack_token() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let started = engine.start_workflow(workflow()).await.unwrap();

    let attempt = AttemptId::from_entropy([12; 16]);
    let ack = engine
        .mint_ack_token(&started.state_token, &attempt)
        .await
        .unwrap();
    let err = engine
        .continue_workflow(ContinueRequest {
            intent: ContinueIntent::Rehydrate,
            state_token: started.state_token.clone(),
            ack_token: Some(ack),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "REQUEST_INVALID");

    let outcome = engine
        .continue_workflow(ContinueRequest {
            intent: ContinueIntent::Rehydrate,
            state_token: started.state_token,
            ack_token: None,
        })
        .await
        .unwrap();
    let ContinueOutcome::Rehydrated { prompt } = outcome else {
        panic!("expected a rehydrated prompt");
    };
    assert!(prompt.contains("triage"));
}

#[tokio::test]
async fn checkpoint_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let started = engine.start_workflow(workflow()).await.unwrap();

    let a = engine
        .checkpoint_workflow(&started.state_token)
        .await
        .unwrap();
    let b = engine
        .checkpoint_workflow(&started.state_token)
        .await
        .unwrap();
    assert_eq!(a, b);
    assert!(a.starts_with("chk1"));
}
