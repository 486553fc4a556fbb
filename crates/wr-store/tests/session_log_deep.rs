// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deep durability tests for the session event-log store.

use wr_event::{AppendPlan, DomainEvent, EventBody, ManifestRecord, ObservationRecordedData};
use wr_ident::{BrandedId, EventId, EventIndex, SessionId};
use wr_store::{SessionStore, StoreError, TailReason};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn session(tag: u8) -> SessionId {
    SessionId::from_entropy([tag; 16])
}

/// An observation event at `index`; `seq` drives the dedupe key.
fn observation(session_id: &SessionId, index: u64, seq: u64) -> DomainEvent {
    DomainEvent::new(
        EventId::from_entropy([index as u8 + 100, seq as u8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]),
        EventIndex::new(index),
        session_id.clone(),
        EventBody::ObservationRecorded(ObservationRecordedData {
            run_id: None,
            node_id: None,
            label: "probe".to_string(),
            seq,
            payload: serde_json::json!({ "n": seq }),
        }),
    )
    .unwrap()
}

fn events(session_id: &SessionId, range: std::ops::Range<u64>) -> Vec<DomainEvent> {
    range.map(|i| observation(session_id, i, i)).collect()
}

// ---------------------------------------------------------------------------
// Append + load
// ---------------------------------------------------------------------------

#[tokio::test]
async fn append_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let id = session(1);

    let guard = store.acquire_lock(&id).await.unwrap();
    let plan = AppendPlan::events(events(&id, 0..3));
    store.append(&guard.witness(), &plan).await.unwrap();
    drop(guard);

    let log = store.load(&id).await.unwrap();
    assert_eq!(log.events.len(), 3);
    let indices: Vec<u64> = log.events.iter().map(|e| e.event_index.value()).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert!(matches!(
        log.manifest.first(),
        Some(ManifestRecord::SegmentOpened { .. })
    ));
}

#[tokio::test]
async fn index_gap_is_rejected_and_log_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let id = session(2);

    let guard = store.acquire_lock(&id).await.unwrap();
    let witness = guard.witness();
    store
        .append(&witness, &AppendPlan::events(events(&id, 0..2)))
        .await
        .unwrap();

    let stray = observation(&id, 99, 99);
    let err = store
        .append(&witness, &AppendPlan::events(vec![stray]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "SESSION_STORE_INVARIANT_VIOLATION");
    assert!(err.to_string().contains("expected 2"));
    drop(guard);

    let log = store.load(&id).await.unwrap();
    assert_eq!(log.events.len(), 2);
}

#[tokio::test]
async fn replaying_a_committed_plan_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let id = session(3);

    let guard = store.acquire_lock(&id).await.unwrap();
    let witness = guard.witness();
    let plan = AppendPlan::events(events(&id, 0..2));
    store.append(&witness, &plan).await.unwrap();
    let before = store.load(&id).await.unwrap();

    store.append(&witness, &plan).await.unwrap();
    let after = store.load(&id).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn partial_dedupe_overlap_fails_without_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let id = session(4);

    let guard = store.acquire_lock(&id).await.unwrap();
    let witness = guard.witness();
    store
        .append(&witness, &AppendPlan::events(events(&id, 0..2)))
        .await
        .unwrap();
    let before = store.load(&id).await.unwrap();

    // One already-seen key (seq 1) and one fresh key (seq 5).
    let overlap = AppendPlan::events(vec![observation(&id, 2, 1), observation(&id, 3, 5)]);
    let err = store.append(&witness, &overlap).await.unwrap_err();
    assert_eq!(
        err,
        StoreError::InvariantViolation {
            detail: "partial idempotency".to_string()
        }
    );

    assert_eq!(store.load(&id).await.unwrap(), before);
}

#[tokio::test]
async fn empty_plan_is_ok() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let id = session(5);

    let guard = store.acquire_lock(&id).await.unwrap();
    store.append(&guard.witness(), &AppendPlan::default()).await.unwrap();
    assert!(store.load(&id).await.unwrap().events.is_empty());
}

#[tokio::test]
async fn stale_witness_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let id = session(6);

    let guard = store.acquire_lock(&id).await.unwrap();
    let witness = guard.witness();
    drop(guard);

    let err = store
        .append(&witness, &AppendPlan::events(events(&id, 0..1)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "SESSION_STORE_INVARIANT_VIOLATION");
}

#[tokio::test]
async fn witness_scope_binds_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let a = session(7);
    let b = session(8);

    let guard = store.acquire_lock(&a).await.unwrap();
    // Events minted for session B cannot ride an A-scoped witness.
    let err = store
        .append(&guard.witness(), &AppendPlan::events(events(&b, 0..1)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "SESSION_STORE_INVARIANT_VIOLATION");
}

// ---------------------------------------------------------------------------
// Rotation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rotation_closes_segments_with_digests() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path()).with_rotation_events(2);
    let id = session(9);

    let guard = store.acquire_lock(&id).await.unwrap();
    let witness = guard.witness();
    for batch in 0..3u64 {
        let plan = AppendPlan::events(events(&id, batch * 2..batch * 2 + 2));
        store.append(&witness, &plan).await.unwrap();
    }
    drop(guard);

    let log = store.load(&id).await.unwrap();
    assert_eq!(log.events.len(), 6);
    let closed: Vec<_> = log
        .manifest
        .iter()
        .filter(|r| matches!(r, ManifestRecord::SegmentClosed { .. }))
        .collect();
    assert_eq!(closed.len(), 2, "two segments should have rotated closed");

    // The validated prefix of a healthy rotated log is complete.
    let prefix = store.load_validated_prefix(&id).await.unwrap();
    assert!(prefix.is_complete);
    assert_eq!(prefix.truth.events.len(), 6);
}

// ---------------------------------------------------------------------------
// Validated prefix
// ---------------------------------------------------------------------------

async fn seed_noncontiguous(dir: &std::path::Path, id: &SessionId) {
    // A manifest attesting an open segment whose first event sits at
    // index 1: structurally parseable, contiguity-broken.
    let session_dir = dir.join("sessions").join(id.as_str());
    tokio::fs::create_dir_all(session_dir.join("segments"))
        .await
        .unwrap();
    let opened = serde_json::json!({
        "kind": "segment_opened",
        "manifestIndex": 0,
        "segmentPath": "segments/seg_0.jsonl",
        "firstEventIndex": 1,
    });
    tokio::fs::write(
        session_dir.join("manifest.jsonl"),
        format!("{opened}\n"),
    )
    .await
    .unwrap();
    let event = observation(id, 1, 1);
    let mut line = event.canonical_bytes();
    line.push(b'\n');
    tokio::fs::write(session_dir.join("segments/seg_0.jsonl"), line)
        .await
        .unwrap();
}

#[tokio::test]
async fn noncontiguous_seed_yields_incomplete_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let id = session(10);
    seed_noncontiguous(dir.path(), &id).await;

    let prefix = store.load_validated_prefix(&id).await.unwrap();
    assert!(!prefix.is_complete);
    assert_eq!(prefix.tail_reason, Some(TailReason::NonContiguousIndices));
    assert!(prefix.truth.events.is_empty());

    let err = store.load(&id).await.unwrap_err();
    assert_eq!(err.code(), "SESSION_STORE_CORRUPTION_DETECTED");
}

#[tokio::test]
async fn tampered_closed_segment_is_digest_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path()).with_rotation_events(2);
    let id = session(11);

    let guard = store.acquire_lock(&id).await.unwrap();
    let witness = guard.witness();
    for batch in 0..2u64 {
        let plan = AppendPlan::events(events(&id, batch * 2..batch * 2 + 2));
        store.append(&witness, &plan).await.unwrap();
    }
    drop(guard);

    // Flip a byte inside the closed first segment.
    let seg = dir
        .path()
        .join("sessions")
        .join(id.as_str())
        .join("segments/seg_0.jsonl");
    let mut bytes = tokio::fs::read(&seg).await.unwrap();
    let last = bytes.len() - 2;
    bytes[last] ^= 0x20;
    tokio::fs::write(&seg, bytes).await.unwrap();

    let prefix = store.load_validated_prefix(&id).await.unwrap();
    assert!(!prefix.is_complete);
    assert_eq!(prefix.tail_reason, Some(TailReason::DigestMismatch));

    assert!(store.load(&id).await.is_err());
}

#[tokio::test]
async fn deleted_attested_segment_is_missing() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path()).with_rotation_events(1);
    let id = session(12);

    let guard = store.acquire_lock(&id).await.unwrap();
    let witness = guard.witness();
    store
        .append(&witness, &AppendPlan::events(events(&id, 0..1)))
        .await
        .unwrap();
    store
        .append(&witness, &AppendPlan::events(events(&id, 1..2)))
        .await
        .unwrap();
    drop(guard);

    let seg = dir
        .path()
        .join("sessions")
        .join(id.as_str())
        .join("segments/seg_0.jsonl");
    tokio::fs::remove_file(&seg).await.unwrap();

    let prefix = store.load_validated_prefix(&id).await.unwrap();
    assert!(!prefix.is_complete);
    assert_eq!(prefix.tail_reason, Some(TailReason::MissingAttestedSegment));
    assert!(prefix.truth.events.is_empty());
}

#[tokio::test]
async fn garbage_tail_line_keeps_valid_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let id = session(13);

    let guard = store.acquire_lock(&id).await.unwrap();
    store
        .append(&guard.witness(), &AppendPlan::events(events(&id, 0..2)))
        .await
        .unwrap();
    drop(guard);

    let seg = dir
        .path()
        .join("sessions")
        .join(id.as_str())
        .join("segments/seg_0.jsonl");
    let mut bytes = tokio::fs::read(&seg).await.unwrap();
    bytes.extend_from_slice(b"{\"not\":\"an event\"}\n");
    tokio::fs::write(&seg, bytes).await.unwrap();

    let prefix = store.load_validated_prefix(&id).await.unwrap();
    assert!(!prefix.is_complete);
    assert_eq!(prefix.tail_reason, Some(TailReason::SchemaViolation));
    assert_eq!(prefix.truth.events.len(), 2);
}

// ---------------------------------------------------------------------------
// Crash recovery: lost manifest pins
// ---------------------------------------------------------------------------

#[tokio::test]
async fn replay_restores_lost_snapshot_pins() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let id = session(14);
    let pin = wr_codec::sha256_digest(b"pinned snapshot");

    let guard = store.acquire_lock(&id).await.unwrap();
    let witness = guard.witness();
    let plan = AppendPlan {
        events: events(&id, 0..1),
        snapshot_pins: vec![pin],
    };
    store.append(&witness, &plan).await.unwrap();

    // Simulate the crash window: segment bytes survived, the manifest
    // write carrying the pin did not.
    let manifest = dir
        .path()
        .join("sessions")
        .join(id.as_str())
        .join("manifest.jsonl");
    let text = tokio::fs::read_to_string(&manifest).await.unwrap();
    let kept: Vec<&str> = text
        .lines()
        .filter(|l| !l.contains("snapshot_pinned"))
        .collect();
    tokio::fs::write(&manifest, format!("{}\n", kept.join("\n")))
        .await
        .unwrap();

    store.append(&witness, &plan).await.unwrap();
    let log = store.load(&id).await.unwrap();
    assert_eq!(log.events.len(), 1);
    let pins: Vec<_> = log
        .manifest
        .iter()
        .filter(|r| matches!(r, ManifestRecord::SnapshotPinned { .. }))
        .collect();
    assert_eq!(pins.len(), 1);
}

// ---------------------------------------------------------------------------
// Enumeration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn enumeration_orders_by_recency_not_name() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());

    // Alphabetical order of these ids is unrelated to creation order.
    let ids: Vec<SessionId> = (1..=3u8).map(session).collect();
    for id in &ids {
        let guard = store.acquire_lock(id).await.unwrap();
        store
            .append(&guard.witness(), &AppendPlan::events(events(id, 0..1)))
            .await
            .unwrap();
        drop(guard);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    // Touch the first-created session so it becomes the most recent.
    let touched = &ids[0];
    let guard = store.acquire_lock(touched).await.unwrap();
    store
        .append(
            &guard.witness(),
            &AppendPlan::events(vec![observation(touched, 1, 77)]),
        )
        .await
        .unwrap();
    drop(guard);

    let stamps = store.enumerate_by_recency().await.unwrap();
    assert_eq!(stamps.len(), 3);
    assert_eq!(&stamps[0].session_id, touched);
}
