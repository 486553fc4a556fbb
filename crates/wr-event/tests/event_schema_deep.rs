// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deep schema tests for domain events and snapshots.

use wr_event::*;
use wr_ident::*;

fn session() -> SessionId {
    SessionId::from_entropy([1; 16])
}

fn run() -> RunId {
    RunId::from_entropy([2; 16])
}

fn node(tag: u8) -> NodeId {
    NodeId::from_entropy([tag; 16])
}

fn event(index: u64, body: EventBody) -> DomainEvent {
    DomainEvent::new(
        EventId::from_entropy([index as u8, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9]),
        EventIndex::new(index),
        session(),
        body,
    )
    .unwrap()
}

fn all_bodies() -> Vec<EventBody> {
    let snapshot_ref = wr_codec::sha256_digest(b"snap");
    vec![
        EventBody::SessionCreated(SessionCreatedData {}),
        EventBody::RunStarted(RunStartedData {
            run_id: run(),
            workflow_id: "triage".to_string(),
            workflow_hash: wr_codec::sha256_digest(b"wf"),
        }),
        EventBody::NodeCreated(NodeCreatedData {
            run_id: run(),
            node_id: node(1),
            parent_node_id: None,
            snapshot_ref,
            title: "root".to_string(),
        }),
        EventBody::EdgeCreated(EdgeCreatedData {
            run_id: run(),
            from: node(1),
            to: node(2),
            kind: EdgeKind::AckedStep,
        }),
        EventBody::AdvanceRecorded(AdvanceRecordedData {
            run_id: run(),
            node_id: node(1),
            attempt_id: AttemptId::from_entropy([3; 16]),
            outcome: AdvanceOutcome::Advanced {
                next_node_id: node(2),
                snapshot_ref,
            },
        }),
        EventBody::NodeOutputAppended(NodeOutputAppendedData {
            node_id: node(1),
            output_id: OutputId::from_entropy([4; 16]),
            channel: OutputChannel::Recap,
            content_type: "text/markdown".to_string(),
            sha256: wr_codec::sha256_digest(b"recap"),
            snippet: Some("collected the failing output".to_string()),
            supersedes: None,
        }),
        EventBody::PreferencesChanged(PreferencesChangedData {
            node_id: node(1),
            revision: 0,
            preferences: PreferenceSet {
                autonomy: Some(PreferenceAutonomy::Guided),
                risk_policy: Some(RiskPolicy::Balanced),
                functions: vec![FunctionDef {
                    name: "summarize".to_string(),
                    definition: "one paragraph".to_string(),
                }],
            },
        }),
        EventBody::GapRecorded(GapRecordedData {
            run_id: run(),
            gap_key: "creds".to_string(),
            severity: GapSeverity::Critical,
            category: GapCategory::MissingInput,
            status: GapStatus::Open,
        }),
        EventBody::ContextSet(ContextSetData {
            run_id: run(),
            revision: 0,
            context: serde_json::json!({"git": {"branch": "main"}}),
        }),
        EventBody::DecisionTraceAppended(DecisionTraceAppendedData {
            node_id: node(1),
            seq: 0,
            decision: "retry with backoff".to_string(),
            rationale: Some("transient failure".to_string()),
        }),
        EventBody::ObservationRecorded(ObservationRecordedData {
            run_id: Some(run()),
            node_id: None,
            label: "io_stall".to_string(),
            seq: 0,
            payload: serde_json::json!({"ms": 1200}),
        }),
    ]
}

// ---------------------------------------------------------------------------
// Round-trips and strictness, every kind
// ---------------------------------------------------------------------------

#[test]
fn every_kind_round_trips_through_wire_json() {
    for (i, body) in all_bodies().into_iter().enumerate() {
        let e = event(i as u64, body);
        let json = serde_json::to_string(&e).unwrap();
        let back: DomainEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e, "kind {} did not round-trip", e.kind());
    }
}

#[test]
fn every_kind_rejects_an_extra_data_key() {
    for (i, body) in all_bodies().into_iter().enumerate() {
        let e = event(i as u64, body);
        let mut v = serde_json::to_value(&e).unwrap();
        v["data"]["unexpected"] = serde_json::json!(true);
        assert!(
            serde_json::from_value::<DomainEvent>(v).is_err(),
            "kind {} accepted an unknown data key",
            e.kind()
        );
    }
}

#[test]
fn every_kind_has_a_matching_wire_tag() {
    for (i, body) in all_bodies().into_iter().enumerate() {
        let e = event(i as u64, body);
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["kind"], e.kind().as_str());
    }
}

#[test]
fn unknown_kind_string_is_rejected() {
    let e = event(0, EventBody::SessionCreated(SessionCreatedData {}));
    let mut v = serde_json::to_value(&e).unwrap();
    v["kind"] = serde_json::json!("session_destroyed");
    assert!(serde_json::from_value::<DomainEvent>(v).is_err());
}

#[test]
fn wrong_version_is_rejected() {
    let e = event(0, EventBody::SessionCreated(SessionCreatedData {}));
    let mut v = serde_json::to_value(&e).unwrap();
    v["v"] = serde_json::json!(2);
    assert!(serde_json::from_value::<DomainEvent>(v).is_err());
}

#[test]
fn canonical_bytes_are_stable_across_reparse() {
    for (i, body) in all_bodies().into_iter().enumerate() {
        let e = event(i as u64, body);
        let bytes = e.canonical_bytes();
        let back: DomainEvent = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.canonical_bytes(), bytes);
    }
}

#[test]
fn default_dedupe_keys_are_distinct_across_kinds() {
    let mut seen = std::collections::BTreeSet::new();
    for (i, body) in all_bodies().into_iter().enumerate() {
        let e = event(i as u64, body);
        assert!(
            seen.insert(e.dedupe_key.clone()),
            "duplicate dedupe key {}",
            e.dedupe_key
        );
    }
}

// ---------------------------------------------------------------------------
// Blockers inside stored outcomes
// ---------------------------------------------------------------------------

#[test]
fn blocked_outcome_round_trips_with_ordered_blockers() {
    let blockers = vec![
        Blocker::new(
            BlockerCode::MissingRequiredOutput,
            BlockerPointer::OutputContract {
                contract_ref: "wr.test".to_string(),
            },
            "Test output missing",
            Some("Provide the test output payload".to_string()),
        )
        .unwrap(),
        Blocker::new(
            BlockerCode::RequiredCapabilityUnavailable,
            BlockerPointer::Capability {
                capability: "shell".to_string(),
            },
            "No shell capability",
            None,
        )
        .unwrap(),
    ];
    let body = EventBody::AdvanceRecorded(AdvanceRecordedData {
        run_id: run(),
        node_id: node(1),
        attempt_id: AttemptId::from_entropy([6; 16]),
        outcome: AdvanceOutcome::Blocked {
            block: BlockedSnapshot::retryable(
                AttemptId::from_entropy([7; 16]),
                BlockReason::OutputContractUnmet,
                blockers.clone(),
            )
            .unwrap(),
        },
    });
    let e = event(0, body);
    let v = serde_json::to_value(&e).unwrap();
    assert_eq!(v["data"]["outcome"]["kind"], "blocked");
    assert_eq!(
        v["data"]["outcome"]["block"]["blockers"][0]["code"],
        "MISSING_REQUIRED_OUTPUT"
    );
    assert_eq!(
        v["data"]["outcome"]["block"]["blockers"][1]["pointer"]["kind"],
        "capability"
    );
    let back: DomainEvent = serde_json::from_value(v).unwrap();
    let EventBody::AdvanceRecorded(data) = &back.body else {
        panic!("wrong kind");
    };
    let AdvanceOutcome::Blocked { block } = &data.outcome else {
        panic!("wrong outcome");
    };
    assert_eq!(block.blockers(), blockers.as_slice());
}

// ---------------------------------------------------------------------------
// Execution snapshot wire form
// ---------------------------------------------------------------------------

#[test]
fn snapshot_wire_round_trips_and_validates() {
    let completed = CompletedSet::from_keys(vec![
        StepInstanceKey::parse("collect").unwrap(),
        StepInstanceKey::parse("diagnose>retry:0").unwrap(),
    ]);
    let snapshot = ExecutionSnapshot::new(EngineState::Running {
        completed,
        loop_stack: vec![LoopFrame {
            loop_id: "retry".to_string(),
            iteration: 1,
            body_index: 0,
        }],
        pending: PendingStep {
            key: StepInstanceKey::parse("diagnose>retry:1").unwrap(),
            loop_path: vec![LoopPathFrame {
                loop_id: "retry".to_string(),
                iteration: 1,
            }],
        },
    });
    snapshot.validate().unwrap();

    let json = serde_json::to_string(&snapshot).unwrap();
    let back: ExecutionSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(back, snapshot);
    assert_eq!(back.content_ref(), snapshot.content_ref());
}

#[test]
fn completed_set_wire_order_is_canonical() {
    let a = CompletedSet::from_keys(vec![
        StepInstanceKey::parse("zeta").unwrap(),
        StepInstanceKey::parse("alpha").unwrap(),
    ]);
    let b = CompletedSet::from_keys(vec![
        StepInstanceKey::parse("alpha").unwrap(),
        StepInstanceKey::parse("zeta").unwrap(),
    ]);
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[test]
fn snapshot_rejects_unsorted_completed_on_decode_validation() {
    let mut v = serde_json::to_value(ExecutionSnapshot::new(EngineState::Running {
        completed: CompletedSet::from_keys(vec![
            StepInstanceKey::parse("a").unwrap(),
            StepInstanceKey::parse("b").unwrap(),
        ]),
        loop_stack: vec![],
        pending: PendingStep {
            key: StepInstanceKey::parse("c").unwrap(),
            loop_path: vec![],
        },
    }))
    .unwrap();
    v["enginePayload"]["engineState"]["completed"]["values"] = serde_json::json!(["b", "a"]);
    let decoded: ExecutionSnapshot = serde_json::from_value(v).unwrap();
    assert!(decoded.validate().is_err());
}
