// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-session append-only event log.
//!
//! Layout under `<dataDir>/sessions/<sessionId>/`:
//!
//! ```text
//! lock
//! manifest.jsonl
//! segments/seg_<idx>.jsonl
//! ```
//!
//! Closed segments are attested in the manifest with their digest and
//! byte length; the open segment is attested by existence only. Appends
//! rewrite the open segment and then the manifest, each via temp-file +
//! rename with fsync, so every crash window resolves to "validated prefix
//! ends at the last good record".

use crate::lock::{LockError, LockWitness, SessionLockGuard};
use crate::{SessionLog, StoreError, TailReason};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};
use wr_event::{AppendPlan, DomainEvent, ManifestRecord};
use wr_ident::{BrandedId, EventIndex, ManifestIndex, SessionId};

/// Number of events after which the open segment is closed and rotated.
pub const DEFAULT_SEGMENT_ROTATION_EVENTS: usize = 512;

/// A session name plus its directory mtime, for recency ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStamp {
    /// The session.
    pub session_id: SessionId,
    /// Last modification time of the session directory.
    pub modified: SystemTime,
}

/// The longest valid prefix of a session log.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPrefix {
    /// Events and manifest records of the valid prefix.
    pub truth: SessionLog,
    /// Whether the prefix covers the whole on-disk log.
    pub is_complete: bool,
    /// Why the tail was cut, when incomplete.
    pub tail_reason: Option<TailReason>,
}

/// The session event-log store, rooted at a data directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
    rotation_events: usize,
}

// Internal picture of the manifest after replay.
struct ManifestState {
    records: Vec<ManifestRecord>,
    closed: Vec<ClosedSegment>,
    open: Option<OpenSegment>,
    opened_count: usize,
    pinned: BTreeSet<wr_codec::SnapshotRef>,
}

struct ClosedSegment {
    path: String,
    first: EventIndex,
    last: EventIndex,
    sha256: wr_codec::Sha256Digest,
    bytes: u64,
}

struct OpenSegment {
    path: String,
    first: EventIndex,
}

impl SessionStore {
    /// Build a store over `data_dir` with the default rotation policy.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            root: data_dir.as_ref().to_path_buf(),
            rotation_events: DEFAULT_SEGMENT_ROTATION_EVENTS,
        }
    }

    /// Override the segment rotation threshold.
    #[must_use]
    pub fn with_rotation_events(mut self, rotation_events: usize) -> Self {
        self.rotation_events = rotation_events.max(1);
        self
    }

    /// Directory of one session.
    #[must_use]
    pub fn session_dir(&self, session_id: &SessionId) -> PathBuf {
        self.root.join("sessions").join(session_id.as_str())
    }

    /// Acquire the exclusive lock for a session.
    ///
    /// # Errors
    ///
    /// [`LockError::Busy`] when another writer holds it.
    pub async fn acquire_lock(
        &self,
        session_id: &SessionId,
    ) -> Result<SessionLockGuard, LockError> {
        SessionLockGuard::acquire(&self.session_dir(session_id), session_id).await
    }

    // -- append ----------------------------------------------------------

    /// Atomically extend the log with `plan`.
    ///
    /// Enforced invariants:
    /// - the witness must be held and scoped to this session;
    /// - event indices must continue the log contiguously;
    /// - a plan whose dedupe keys are all already present is a no-op, a
    ///   disjoint plan is appended, and a partial overlap fails without
    ///   touching any file.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvariantViolation`] on witness/contiguity/dedupe
    /// violations, [`StoreError::CorruptionDetected`] if the existing log
    /// is damaged, [`StoreError::Io`] on filesystem failure.
    pub async fn append(&self, witness: &LockWitness, plan: &AppendPlan) -> Result<(), StoreError> {
        if plan.is_empty() {
            return Ok(());
        }
        if !witness.assert_held() {
            return Err(StoreError::InvariantViolation {
                detail: "lock witness is stale".to_string(),
            });
        }
        let session_id = witness.session_id().clone();
        for event in &plan.events {
            if event.session_id != session_id {
                return Err(StoreError::InvariantViolation {
                    detail: format!(
                        "event {} targets session {}, witness is for {}",
                        event.event_id, event.session_id, session_id
                    ),
                });
            }
        }

        let state = self.read_manifest_strict(&session_id).await?;
        let log = self.materialize_strict(&session_id, &state).await?;

        // Dedupe classification sees the in-flight batch atomically
        // against the on-disk set.
        let mut batch_keys = BTreeSet::new();
        for event in &plan.events {
            if !batch_keys.insert(&event.dedupe_key) {
                return Err(StoreError::InvariantViolation {
                    detail: format!("plan repeats dedupe key '{}'", event.dedupe_key),
                });
            }
        }
        let seen = log.dedupe_keys();
        let dup_count = batch_keys.iter().filter(|k| seen.contains(*k)).count();
        let all_duplicate = !plan.events.is_empty() && dup_count == batch_keys.len();
        if dup_count > 0 && !all_duplicate {
            return Err(StoreError::InvariantViolation {
                detail: "partial idempotency".to_string(),
            });
        }

        let missing_pins: Vec<_> = plan
            .snapshot_pins
            .iter()
            .filter(|r| !state.pinned.contains(r))
            .cloned()
            .collect();

        if all_duplicate {
            if missing_pins.is_empty() {
                debug!(target: "wr.store", session = %session_id, "append replay is a no-op");
                return Ok(());
            }
            // Events landed in a previous attempt whose manifest write
            // was lost; record the missing pins alone.
            return self
                .extend_manifest(&session_id, &state, pin_records(&state, &missing_pins))
                .await;
        }

        // Contiguity against the current head.
        let base = log
            .last_event_index()
            .map_or(0, |last| last.value() + 1);
        for (i, event) in plan.events.iter().enumerate() {
            let expected = base + i as u64;
            if event.event_index.value() != expected {
                return Err(StoreError::InvariantViolation {
                    detail: format!(
                        "event index {} at batch position {i}, expected {expected}",
                        event.event_index
                    ),
                });
            }
        }

        self.write_events(&session_id, &state, plan, &missing_pins)
            .await
    }

    async fn write_events(
        &self,
        session_id: &SessionId,
        state: &ManifestState,
        plan: &AppendPlan,
        missing_pins: &[wr_codec::SnapshotRef],
    ) -> Result<(), StoreError> {
        let dir = self.session_dir(session_id);
        let segments_dir = dir.join("segments");
        tokio::fs::create_dir_all(&segments_dir)
            .await
            .map_err(StoreError::io)?;

        let mut new_records: Vec<ManifestRecord> = Vec::new();
        let mut next_manifest_index = state
            .records
            .last()
            .map_or(0, |r| r.manifest_index().value() + 1);
        let mut push = |record: ManifestRecord| {
            new_records.push(record);
        };

        // Decide the target segment: continue the open one, or rotate /
        // open a fresh one.
        let first_new_index = plan.events[0].event_index;
        let (target_path, mut segment_bytes) = match &state.open {
            Some(open) => {
                let path = dir.join(&open.path);
                let bytes = tokio::fs::read(&path).await.map_err(StoreError::io)?;
                let held_events = first_new_index.value() - open.first.value();
                if held_events as usize >= self.rotation_events {
                    // Close the full segment and start a new one.
                    push(ManifestRecord::SegmentClosed {
                        manifest_index: ManifestIndex::new(next_manifest_index),
                        segment_path: open.path.clone(),
                        first_event_index: open.first,
                        last_event_index: EventIndex::new(first_new_index.value() - 1),
                        sha256: wr_codec::sha256_digest(&bytes),
                        bytes: bytes.len() as u64,
                    });
                    next_manifest_index += 1;
                    let fresh = format!("segments/seg_{}.jsonl", state.opened_count);
                    push(ManifestRecord::SegmentOpened {
                        manifest_index: ManifestIndex::new(next_manifest_index),
                        segment_path: fresh.clone(),
                        first_event_index: first_new_index,
                    });
                    next_manifest_index += 1;
                    (fresh, Vec::new())
                } else {
                    (open.path.clone(), bytes)
                }
            }
            None => {
                let fresh = format!("segments/seg_{}.jsonl", state.opened_count);
                push(ManifestRecord::SegmentOpened {
                    manifest_index: ManifestIndex::new(next_manifest_index),
                    segment_path: fresh.clone(),
                    first_event_index: first_new_index,
                });
                next_manifest_index += 1;
                (fresh, Vec::new())
            }
        };

        for event in &plan.events {
            segment_bytes.extend_from_slice(&event.canonical_bytes());
            segment_bytes.push(b'\n');
        }

        for pin in missing_pins {
            push(ManifestRecord::SnapshotPinned {
                manifest_index: ManifestIndex::new(next_manifest_index),
                snapshot_ref: *pin,
            });
            next_manifest_index += 1;
        }

        // Segment first, manifest second: an unattested tail is
        // recoverable, a dangling attestation is not.
        write_atomic(&dir.join(&target_path), &segment_bytes).await?;
        self.extend_manifest(session_id, state, new_records).await?;

        info!(
            target: "wr.store",
            session = %session_id,
            events = plan.events.len(),
            segment = %target_path,
            "append committed"
        );
        Ok(())
    }

    async fn extend_manifest(
        &self,
        session_id: &SessionId,
        state: &ManifestState,
        new_records: Vec<ManifestRecord>,
    ) -> Result<(), StoreError> {
        if new_records.is_empty() {
            return Ok(());
        }
        let dir = self.session_dir(session_id);
        let mut bytes = Vec::new();
        for record in state.records.iter().chain(new_records.iter()) {
            let value = serde_json::to_value(record).map_err(|e| StoreError::Io {
                detail: format!("serialize manifest record: {e}"),
            })?;
            let line = wr_codec::canonical_json(&value).map_err(|e| StoreError::Io {
                detail: format!("canonicalize manifest record: {e}"),
            })?;
            bytes.extend_from_slice(&line);
            bytes.push(b'\n');
        }
        write_atomic(&dir.join("manifest.jsonl"), &bytes).await
    }

    // -- loads -----------------------------------------------------------

    /// Strict full load: any defect is corruption.
    ///
    /// A session with no directory on disk loads as an empty log.
    ///
    /// # Errors
    ///
    /// [`StoreError::CorruptionDetected`] on a missing attested segment,
    /// digest mismatch, index gap, or schema violation.
    pub async fn load(&self, session_id: &SessionId) -> Result<SessionLog, StoreError> {
        let state = self.read_manifest_strict(session_id).await?;
        self.materialize_strict(session_id, &state).await
    }

    async fn read_manifest_strict(
        &self,
        session_id: &SessionId,
    ) -> Result<ManifestState, StoreError> {
        let path = self.session_dir(session_id).join("manifest.jsonl");
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(StoreError::io(e)),
        };
        let mut records = Vec::new();
        for (lineno, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: ManifestRecord =
                serde_json::from_str(line).map_err(|e| StoreError::CorruptionDetected {
                    detail: format!("manifest line {lineno}: {e}"),
                })?;
            records.push(record);
        }
        replay_manifest(records).map_err(|detail| StoreError::CorruptionDetected { detail })
    }

    async fn materialize_strict(
        &self,
        session_id: &SessionId,
        state: &ManifestState,
    ) -> Result<SessionLog, StoreError> {
        let dir = self.session_dir(session_id);
        let mut events: Vec<DomainEvent> = Vec::new();
        let mut next_index: u64 = 0;

        for closed in &state.closed {
            let bytes = tokio::fs::read(dir.join(&closed.path)).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    StoreError::CorruptionDetected {
                        detail: format!("missing attested segment {}", closed.path),
                    }
                } else {
                    StoreError::io(e)
                }
            })?;
            if wr_codec::sha256_digest(&bytes) != closed.sha256 || bytes.len() as u64 != closed.bytes
            {
                return Err(StoreError::CorruptionDetected {
                    detail: format!("digest mismatch in {}", closed.path),
                });
            }
            next_index = parse_segment(&bytes, next_index, &mut events)
                .map_err(|defect| defect.corruption(&closed.path))?;
            if events.last().map(|e| e.event_index) != Some(closed.last) {
                return Err(StoreError::CorruptionDetected {
                    detail: format!("segment {} does not end at its attested index", closed.path),
                });
            }
        }

        if let Some(open) = &state.open {
            let bytes = tokio::fs::read(dir.join(&open.path)).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    StoreError::CorruptionDetected {
                        detail: format!("missing open segment {}", open.path),
                    }
                } else {
                    StoreError::io(e)
                }
            })?;
            parse_segment(&bytes, next_index, &mut events)
                .map_err(|defect| defect.corruption(&open.path))?;
        }

        Ok(SessionLog {
            events,
            manifest: state.records.clone(),
        })
    }

    /// Load the longest valid prefix, with a reason when the tail is cut.
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] only; structural defects are reported through
    /// the prefix result, not as errors.
    pub async fn load_validated_prefix(
        &self,
        session_id: &SessionId,
    ) -> Result<ValidatedPrefix, StoreError> {
        let dir = self.session_dir(session_id);
        let manifest_path = dir.join("manifest.jsonl");
        let raw = match tokio::fs::read_to_string(&manifest_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(StoreError::io(e)),
        };

        let mut records = Vec::new();
        let mut manifest_reason: Option<TailReason> = None;
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ManifestRecord>(line) {
                Ok(record) => records.push(record),
                Err(_) => {
                    manifest_reason = Some(TailReason::SchemaViolation);
                    break;
                }
            }
        }
        let state = match replay_manifest(records) {
            Ok(state) => state,
            Err(_) => {
                // The manifest itself contradicts; nothing is trustworthy.
                return Ok(ValidatedPrefix {
                    truth: SessionLog::default(),
                    is_complete: false,
                    tail_reason: Some(TailReason::SchemaViolation),
                });
            }
        };

        let mut events: Vec<DomainEvent> = Vec::new();
        let mut kept_records: Vec<ManifestRecord> = Vec::new();
        let mut next_index: u64 = 0;
        let mut reason: Option<TailReason> = None;

        'segments: for closed in &state.closed {
            let bytes = match tokio::fs::read(dir.join(&closed.path)).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    reason = Some(TailReason::MissingAttestedSegment);
                    break 'segments;
                }
                Err(e) => return Err(StoreError::io(e)),
            };
            if wr_codec::sha256_digest(&bytes) != closed.sha256 || bytes.len() as u64 != closed.bytes
            {
                reason = Some(TailReason::DigestMismatch);
                break 'segments;
            }
            let mut segment_events = Vec::new();
            match parse_segment(&bytes, next_index, &mut segment_events) {
                Ok(idx) => {
                    if segment_events.last().map(|e| e.event_index) != Some(closed.last) {
                        reason = Some(TailReason::NonContiguousIndices);
                        break 'segments;
                    }
                    next_index = idx;
                    events.extend(segment_events);
                    kept_records.push(segment_record(closed));
                }
                Err(defect) => {
                    reason = Some(defect.tail_reason());
                    break 'segments;
                }
            }
        }

        if reason.is_none() {
            if let Some(open) = &state.open {
                match tokio::fs::read(dir.join(&open.path)).await {
                    Ok(bytes) => {
                        kept_records.push(ManifestRecord::SegmentOpened {
                            manifest_index: ManifestIndex::new(
                                kept_records.len() as u64,
                            ),
                            segment_path: open.path.clone(),
                            first_event_index: open.first,
                        });
                        if let Err(defect) = parse_segment(&bytes, next_index, &mut events) {
                            reason = Some(defect.tail_reason());
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        reason = Some(TailReason::MissingAttestedSegment);
                    }
                    Err(e) => return Err(StoreError::io(e)),
                }
            }
        }

        let final_reason = reason.or(manifest_reason);
        // Preserve pin records seen before any cut.
        let manifest = if final_reason.is_none() {
            state.records.clone()
        } else {
            renumber(kept_records)
        };

        Ok(ValidatedPrefix {
            truth: SessionLog { events, manifest },
            is_complete: final_reason.is_none(),
            tail_reason: final_reason,
        })
    }

    // -- enumeration -----------------------------------------------------

    /// All sessions ordered by directory mtime, newest first.
    ///
    /// Recency is the contract here: capping an alphabetical listing
    /// would silently drop the most recently active session.
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] on directory read failure.
    pub async fn enumerate_by_recency(&self) -> Result<Vec<SessionStamp>, StoreError> {
        let sessions_dir = self.root.join("sessions");
        let mut read_dir = match tokio::fs::read_dir(&sessions_dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(e)),
        };
        let mut stamps = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(StoreError::io)? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Ok(session_id) = SessionId::parse(name) else {
                continue;
            };
            let metadata = entry.metadata().await.map_err(StoreError::io)?;
            let modified = metadata.modified().map_err(StoreError::io)?;
            stamps.push(SessionStamp {
                session_id,
                modified,
            });
        }
        stamps.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(stamps)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn replay_manifest(records: Vec<ManifestRecord>) -> Result<ManifestState, String> {
    let mut closed = Vec::new();
    let mut open: Option<OpenSegment> = None;
    let mut opened_count = 0usize;
    let mut pinned = BTreeSet::new();

    for (i, record) in records.iter().enumerate() {
        if record.manifest_index().value() != i as u64 {
            return Err(format!(
                "manifest index {} at line {i}",
                record.manifest_index()
            ));
        }
        match record {
            ManifestRecord::SegmentOpened {
                segment_path,
                first_event_index,
                ..
            } => {
                if open.is_some() {
                    return Err(format!("segment {segment_path} opened while another is open"));
                }
                open = Some(OpenSegment {
                    path: segment_path.clone(),
                    first: *first_event_index,
                });
                opened_count += 1;
            }
            ManifestRecord::SegmentClosed {
                segment_path,
                first_event_index,
                last_event_index,
                sha256,
                bytes,
                ..
            } => {
                let Some(current) = open.take() else {
                    return Err(format!("segment {segment_path} closed but never opened"));
                };
                if current.path != *segment_path || current.first != *first_event_index {
                    return Err(format!(
                        "segment close for {segment_path} does not match open record"
                    ));
                }
                closed.push(ClosedSegment {
                    path: segment_path.clone(),
                    first: *first_event_index,
                    last: *last_event_index,
                    sha256: *sha256,
                    bytes: *bytes,
                });
            }
            ManifestRecord::SnapshotPinned { snapshot_ref, .. } => {
                pinned.insert(*snapshot_ref);
            }
        }
    }

    Ok(ManifestState {
        records,
        closed,
        open,
        opened_count,
        pinned,
    })
}

/// Why a segment's bytes could not be consumed whole.
enum SegmentDefect {
    /// A line failed UTF-8 or event-schema decoding.
    Schema { lineno: usize, detail: String },
    /// An event index broke contiguity.
    NonContiguous { lineno: usize, found: u64, expected: u64 },
}

impl SegmentDefect {
    fn tail_reason(&self) -> TailReason {
        match self {
            Self::Schema { .. } => TailReason::SchemaViolation,
            Self::NonContiguous { .. } => TailReason::NonContiguousIndices,
        }
    }

    fn corruption(self, path: &str) -> StoreError {
        let detail = match self {
            Self::Schema { lineno, detail } => {
                format!("segment {path} line {lineno}: {detail}")
            }
            Self::NonContiguous {
                lineno,
                found,
                expected,
            } => format!(
                "segment {path} line {lineno}: event index {found} breaks contiguity at {expected}"
            ),
        };
        StoreError::CorruptionDetected { detail }
    }
}

/// Parse every line of a segment, appending decoded events in order.
/// Stops at the first defect; events decoded before it stay appended.
fn parse_segment(
    bytes: &[u8],
    mut next_index: u64,
    events: &mut Vec<DomainEvent>,
) -> Result<u64, SegmentDefect> {
    let text = std::str::from_utf8(bytes).map_err(|e| SegmentDefect::Schema {
        lineno: 0,
        detail: format!("not UTF-8: {e}"),
    })?;
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let event: DomainEvent =
            serde_json::from_str(line).map_err(|e| SegmentDefect::Schema {
                lineno,
                detail: e.to_string(),
            })?;
        if event.event_index.value() != next_index {
            return Err(SegmentDefect::NonContiguous {
                lineno,
                found: event.event_index.value(),
                expected: next_index,
            });
        }
        next_index += 1;
        events.push(event);
    }
    Ok(next_index)
}

fn segment_record(closed: &ClosedSegment) -> ManifestRecord {
    ManifestRecord::SegmentClosed {
        manifest_index: ManifestIndex::ZERO,
        segment_path: closed.path.clone(),
        first_event_index: closed.first,
        last_event_index: closed.last,
        sha256: closed.sha256,
        bytes: closed.bytes,
    }
}

fn renumber(records: Vec<ManifestRecord>) -> Vec<ManifestRecord> {
    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let index = ManifestIndex::new(i as u64);
            match record {
                ManifestRecord::SegmentOpened {
                    segment_path,
                    first_event_index,
                    ..
                } => ManifestRecord::SegmentOpened {
                    manifest_index: index,
                    segment_path,
                    first_event_index,
                },
                ManifestRecord::SegmentClosed {
                    segment_path,
                    first_event_index,
                    last_event_index,
                    sha256,
                    bytes,
                    ..
                } => ManifestRecord::SegmentClosed {
                    manifest_index: index,
                    segment_path,
                    first_event_index,
                    last_event_index,
                    sha256,
                    bytes,
                },
                ManifestRecord::SnapshotPinned { snapshot_ref, .. } => {
                    ManifestRecord::SnapshotPinned {
                        manifest_index: index,
                        snapshot_ref,
                    }
                }
            }
        })
        .collect()
}

fn pin_records(
    state: &ManifestState,
    pins: &[wr_codec::SnapshotRef],
) -> Vec<ManifestRecord> {
    let mut next = state
        .records
        .last()
        .map_or(0, |r| r.manifest_index().value() + 1);
    pins.iter()
        .map(|pin| {
            let record = ManifestRecord::SnapshotPinned {
                manifest_index: ManifestIndex::new(next),
                snapshot_ref: *pin,
            };
            next += 1;
            record
        })
        .collect()
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await.map_err(StoreError::io)?;
    tokio::io::AsyncWriteExt::write_all(&mut file, bytes)
        .await
        .map_err(StoreError::io)?;
    file.sync_all().await.map_err(StoreError::io)?;
    drop(file);
    tokio::fs::rename(&tmp, path).await.map_err(StoreError::io)?;
    if let Some(parent) = path.parent() {
        // Directory fsync so the rename itself is durable.
        if let Ok(dir) = std::fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}
