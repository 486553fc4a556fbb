// SPDX-License-Identifier: MIT OR Apache-2.0

//! Manifest records and append plans.
//!
//! The manifest is the session's attestation chain: which segments exist,
//! where they start and end, and what their bytes hash to. Snapshot pins
//! ride in the same record stream so a bundle export can recover every
//! content address the log depends on.

use crate::SchemaError;
use serde::{Deserialize, Serialize};
use wr_codec::{Sha256Digest, SnapshotRef};
use wr_ident::{EventIndex, ManifestIndex};

use crate::event::DomainEvent;

// ---------------------------------------------------------------------------
// Manifest records
// ---------------------------------------------------------------------------

/// One line of `manifest.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ManifestWire", into = "ManifestWire")]
pub enum ManifestRecord {
    /// A segment was opened; its first event has landed.
    SegmentOpened {
        /// Position of this record in the manifest.
        manifest_index: ManifestIndex,
        /// Segment path relative to the session directory.
        segment_path: String,
        /// Index of the segment's first event.
        first_event_index: EventIndex,
    },
    /// A segment was closed and attested.
    SegmentClosed {
        /// Position of this record in the manifest.
        manifest_index: ManifestIndex,
        /// Segment path relative to the session directory.
        segment_path: String,
        /// Index of the segment's first event.
        first_event_index: EventIndex,
        /// Index of the segment's last event.
        last_event_index: EventIndex,
        /// Digest of the segment's bytes.
        sha256: Sha256Digest,
        /// Byte length of the segment file.
        bytes: u64,
    },
    /// An execution snapshot was pinned by an append plan.
    SnapshotPinned {
        /// Position of this record in the manifest.
        manifest_index: ManifestIndex,
        /// The pinned snapshot's content address.
        snapshot_ref: SnapshotRef,
    },
}

impl ManifestRecord {
    /// Position of this record in the manifest.
    #[must_use]
    pub fn manifest_index(&self) -> ManifestIndex {
        match self {
            Self::SegmentOpened { manifest_index, .. }
            | Self::SegmentClosed { manifest_index, .. }
            | Self::SnapshotPinned { manifest_index, .. } => *manifest_index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ManifestKindTag {
    SegmentOpened,
    SegmentClosed,
    SnapshotPinned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ManifestWire {
    kind: ManifestKindTag,
    manifest_index: ManifestIndex,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    segment_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    first_event_index: Option<EventIndex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_event_index: Option<EventIndex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sha256: Option<Sha256Digest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    snapshot_ref: Option<SnapshotRef>,
}

impl TryFrom<ManifestWire> for ManifestRecord {
    type Error = SchemaError;

    fn try_from(wire: ManifestWire) -> Result<Self, Self::Error> {
        let missing = |field: &str| SchemaError::ManifestRecordInvalid {
            detail: format!("{:?} record is missing {field}", wire.kind),
        };
        match wire.kind {
            ManifestKindTag::SegmentOpened => Ok(Self::SegmentOpened {
                manifest_index: wire.manifest_index,
                segment_path: wire.segment_path.ok_or_else(|| missing("segmentPath"))?,
                first_event_index: wire
                    .first_event_index
                    .ok_or_else(|| missing("firstEventIndex"))?,
            }),
            ManifestKindTag::SegmentClosed => Ok(Self::SegmentClosed {
                manifest_index: wire.manifest_index,
                segment_path: wire.segment_path.ok_or_else(|| missing("segmentPath"))?,
                first_event_index: wire
                    .first_event_index
                    .ok_or_else(|| missing("firstEventIndex"))?,
                last_event_index: wire
                    .last_event_index
                    .ok_or_else(|| missing("lastEventIndex"))?,
                sha256: wire.sha256.ok_or_else(|| missing("sha256"))?,
                bytes: wire.bytes.ok_or_else(|| missing("bytes"))?,
            }),
            ManifestKindTag::SnapshotPinned => Ok(Self::SnapshotPinned {
                manifest_index: wire.manifest_index,
                snapshot_ref: wire.snapshot_ref.ok_or_else(|| missing("snapshotRef"))?,
            }),
        }
    }
}

impl From<ManifestRecord> for ManifestWire {
    fn from(record: ManifestRecord) -> Self {
        let empty = ManifestWire {
            kind: ManifestKindTag::SegmentOpened,
            manifest_index: ManifestIndex::ZERO,
            segment_path: None,
            first_event_index: None,
            last_event_index: None,
            sha256: None,
            bytes: None,
            snapshot_ref: None,
        };
        match record {
            ManifestRecord::SegmentOpened {
                manifest_index,
                segment_path,
                first_event_index,
            } => ManifestWire {
                kind: ManifestKindTag::SegmentOpened,
                manifest_index,
                segment_path: Some(segment_path),
                first_event_index: Some(first_event_index),
                ..empty
            },
            ManifestRecord::SegmentClosed {
                manifest_index,
                segment_path,
                first_event_index,
                last_event_index,
                sha256,
                bytes,
            } => ManifestWire {
                kind: ManifestKindTag::SegmentClosed,
                manifest_index,
                segment_path: Some(segment_path),
                first_event_index: Some(first_event_index),
                last_event_index: Some(last_event_index),
                sha256: Some(sha256),
                bytes: Some(bytes),
                ..empty
            },
            ManifestRecord::SnapshotPinned {
                manifest_index,
                snapshot_ref,
            } => ManifestWire {
                kind: ManifestKindTag::SnapshotPinned,
                manifest_index,
                snapshot_ref: Some(snapshot_ref),
                ..empty
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Append plan
// ---------------------------------------------------------------------------

/// A batch of new events plus optional snapshot pins, committed
/// atomically by the session store.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppendPlan {
    /// Events to append, with pre-assigned contiguous indices.
    pub events: Vec<DomainEvent>,
    /// Snapshot refs to pin in the manifest alongside the events.
    pub snapshot_pins: Vec<SnapshotRef>,
}

impl AppendPlan {
    /// A plan carrying only events.
    #[must_use]
    pub fn events(events: Vec<DomainEvent>) -> Self {
        Self {
            events,
            snapshot_pins: Vec::new(),
        }
    }

    /// Whether the plan has nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.snapshot_pins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_record_round_trips() {
        let record = ManifestRecord::SegmentClosed {
            manifest_index: ManifestIndex::new(1),
            segment_path: "segments/seg_0.jsonl".to_string(),
            first_event_index: EventIndex::ZERO,
            last_event_index: EventIndex::new(4),
            sha256: wr_codec::sha256_digest(b"segment bytes"),
            bytes: 512,
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: ManifestRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn opened_record_omits_digest_fields() {
        let record = ManifestRecord::SegmentOpened {
            manifest_index: ManifestIndex::ZERO,
            segment_path: "segments/seg_0.jsonl".to_string(),
            first_event_index: EventIndex::ZERO,
        };
        let v = serde_json::to_value(&record).unwrap();
        assert_eq!(v["kind"], "segment_opened");
        assert!(v.get("sha256").is_none());
        assert!(v.get("lastEventIndex").is_none());
    }

    #[test]
    fn closed_record_requires_digest() {
        let v = serde_json::json!({
            "kind": "segment_closed",
            "manifestIndex": 0,
            "segmentPath": "segments/seg_0.jsonl",
            "firstEventIndex": 0,
            "lastEventIndex": 3,
            "bytes": 100,
        });
        let err = serde_json::from_value::<ManifestRecord>(v).unwrap_err();
        assert!(err.to_string().contains("sha256"));
    }

    #[test]
    fn pin_record_round_trips() {
        let record = ManifestRecord::SnapshotPinned {
            manifest_index: ManifestIndex::new(7),
            snapshot_ref: wr_codec::sha256_digest(b"snap"),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(serde_json::from_str::<ManifestRecord>(&json).unwrap(), record);
    }

    #[test]
    fn empty_plan_is_empty() {
        assert!(AppendPlan::default().is_empty());
    }
}
