// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execution snapshots: the engine state frozen at a node.
//!
//! A snapshot is content-addressed, so its wire form must be canonical:
//! the completed set is an explicit `{kind:"set", values}` wrapper whose
//! values are lexicographically sorted and unique. Validation enforces
//! that, plus the pending/loop-stack coherence rules.

use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Schema version of snapshot records.
pub const SNAPSHOT_SCHEMA_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Step instance keys
// ---------------------------------------------------------------------------

/// Identifier of one step instance, encoding the step id and its loop
/// path as a single lexicographically orderable string.
///
/// Grammar: `step` or `step>loop:iteration>loop:iteration…`, where step
/// and loop ids match `[a-z0-9_-]+` and iterations are decimal.
///
/// # Examples
///
/// ```
/// use wr_event::{LoopPathFrame, StepInstanceKey};
///
/// let key = StepInstanceKey::new(
///     "collect",
///     &[LoopPathFrame { loop_id: "retry".into(), iteration: 2 }],
/// ).unwrap();
/// assert_eq!(key.as_str(), "collect>retry:2");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StepInstanceKey(String);

/// One frame of a loop path: which loop, which iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoopPathFrame {
    /// The loop's step id.
    pub loop_id: String,
    /// Zero-based iteration.
    pub iteration: u64,
}

fn valid_step_ident(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-'))
}

impl StepInstanceKey {
    /// Build a key from a step id and its loop path.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::StepKeyInvalid`] if any identifier violates
    /// `[a-z0-9_-]+`.
    pub fn new(step_id: &str, loop_path: &[LoopPathFrame]) -> Result<Self, SchemaError> {
        if !valid_step_ident(step_id) {
            return Err(SchemaError::StepKeyInvalid {
                literal: step_id.to_string(),
            });
        }
        let mut out = String::from(step_id);
        for frame in loop_path {
            if !valid_step_ident(&frame.loop_id) {
                return Err(SchemaError::StepKeyInvalid {
                    literal: frame.loop_id.clone(),
                });
            }
            out.push('>');
            out.push_str(&frame.loop_id);
            out.push(':');
            out.push_str(&frame.iteration.to_string());
        }
        Ok(Self(out))
    }

    /// Validate a raw key literal.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::StepKeyInvalid`] on any grammar violation.
    pub fn parse(literal: &str) -> Result<Self, SchemaError> {
        let invalid = || SchemaError::StepKeyInvalid {
            literal: literal.to_string(),
        };
        let mut segments = literal.split('>');
        let step = segments.next().ok_or_else(invalid)?;
        if !valid_step_ident(step) {
            return Err(invalid());
        }
        for segment in segments {
            let (loop_id, iteration) = segment.split_once(':').ok_or_else(invalid)?;
            if !valid_step_ident(loop_id) || iteration.parse::<u64>().is_err() {
                return Err(invalid());
            }
        }
        Ok(Self(literal.to_string()))
    }

    /// The key literal.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The loop path encoded in this key.
    #[must_use]
    pub fn loop_path(&self) -> Vec<LoopPathFrame> {
        self.0
            .split('>')
            .skip(1)
            .filter_map(|segment| {
                let (loop_id, iteration) = segment.split_once(':')?;
                Some(LoopPathFrame {
                    loop_id: loop_id.to_string(),
                    iteration: iteration.parse().ok()?,
                })
            })
            .collect()
    }
}

impl fmt::Display for StepInstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StepInstanceKey {
    type Error = SchemaError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<StepInstanceKey> for String {
    fn from(key: StepInstanceKey) -> Self {
        key.0
    }
}

// ---------------------------------------------------------------------------
// Engine state
// ---------------------------------------------------------------------------

/// Tag constant for the completed-set wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetTag {
    /// The only member.
    Set,
}

/// Explicit set wrapper: `{kind:"set", values:[…]}` with values sorted
/// lexicographically and unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompletedSet {
    /// Always `"set"`.
    pub kind: SetTag,
    /// Sorted, unique step instance keys.
    pub values: Vec<StepInstanceKey>,
}

impl CompletedSet {
    /// Build a set from arbitrary keys, sorting and deduplicating.
    #[must_use]
    pub fn from_keys(mut keys: Vec<StepInstanceKey>) -> Self {
        keys.sort();
        keys.dedup();
        Self {
            kind: SetTag::Set,
            values: keys,
        }
    }

    /// Whether `key` is a member.
    #[must_use]
    pub fn contains(&self, key: &StepInstanceKey) -> bool {
        self.values.binary_search(key).is_ok()
    }

    fn validate(&self) -> Result<(), SchemaError> {
        for pair in self.values.windows(2) {
            if pair[0] >= pair[1] {
                return Err(SchemaError::SnapshotStateInvalid {
                    detail: format!(
                        "completed set is not sorted-unique at '{}' / '{}'",
                        pair[0], pair[1]
                    ),
                });
            }
        }
        Ok(())
    }
}

/// One frame of the running loop stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoopFrame {
    /// The loop's step id.
    pub loop_id: String,
    /// Zero-based iteration currently executing.
    pub iteration: u64,
    /// Index into the loop body.
    pub body_index: u64,
}

/// The step instance execution is currently parked at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PendingStep {
    /// The pending step instance.
    pub key: StepInstanceKey,
    /// Loop path of the pending step; must equal the loop-stack prefix.
    pub loop_path: Vec<LoopPathFrame>,
}

/// Engine state, one of init / running / complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineState {
    /// Nothing has executed yet.
    Init,
    /// Mid-workflow.
    Running {
        /// Step instances already completed.
        completed: CompletedSet,
        /// Active loop frames, outermost first.
        #[serde(rename = "loopStack")]
        loop_stack: Vec<LoopFrame>,
        /// The step instance currently pending.
        pending: PendingStep,
    },
    /// The workflow ran to completion.
    Complete,
}

/// Versioned engine payload inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnginePayload {
    /// Payload schema version, always `1`.
    pub v: u8,
    /// The frozen engine state.
    pub engine_state: EngineState,
}

/// Tag constant for snapshot records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKindTag {
    /// The only member.
    ExecutionSnapshot,
}

/// A content-addressed execution snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExecutionSnapshot {
    /// Record schema version, always `1`.
    pub v: u8,
    /// Always `"execution_snapshot"`.
    pub kind: SnapshotKindTag,
    /// The engine payload.
    pub engine_payload: EnginePayload,
}

impl ExecutionSnapshot {
    /// Build a snapshot around an engine state.
    #[must_use]
    pub fn new(engine_state: EngineState) -> Self {
        Self {
            v: SNAPSHOT_SCHEMA_VERSION,
            kind: SnapshotKindTag::ExecutionSnapshot,
            engine_payload: EnginePayload {
                v: SNAPSHOT_SCHEMA_VERSION,
                engine_state,
            },
        }
    }

    /// Canonical JSON bytes, the form that is hashed for content
    /// addressing.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        wr_codec::canonical_json(&value).unwrap_or_default()
    }

    /// The content address of this snapshot.
    #[must_use]
    pub fn content_ref(&self) -> wr_codec::SnapshotRef {
        wr_codec::sha256_digest(&self.canonical_bytes())
    }

    /// Enforce the snapshot invariants.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::VersionUnsupported`] on a version mismatch
    /// and [`SchemaError::SnapshotStateInvalid`] when:
    /// - the completed set is not sorted-unique,
    /// - the pending loop path differs from the loop-stack prefix of the
    ///   same length (or is longer than the stack),
    /// - the pending step instance already appears in completed.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.v != SNAPSHOT_SCHEMA_VERSION || self.engine_payload.v != SNAPSHOT_SCHEMA_VERSION {
            return Err(SchemaError::VersionUnsupported {
                record: "execution_snapshot",
                found: self.v.max(self.engine_payload.v),
            });
        }
        let EngineState::Running {
            completed,
            loop_stack,
            pending,
        } = &self.engine_payload.engine_state
        else {
            return Ok(());
        };

        completed.validate()?;

        if pending.loop_path.len() > loop_stack.len() {
            return Err(SchemaError::SnapshotStateInvalid {
                detail: "pending loop path is deeper than the loop stack".to_string(),
            });
        }
        for (frame, stack) in pending.loop_path.iter().zip(loop_stack.iter()) {
            if frame.loop_id != stack.loop_id || frame.iteration != stack.iteration {
                return Err(SchemaError::SnapshotStateInvalid {
                    detail: format!(
                        "pending loop path frame '{}:{}' does not match loop stack '{}:{}'",
                        frame.loop_id, frame.iteration, stack.loop_id, stack.iteration
                    ),
                });
            }
        }

        if completed.contains(&pending.key) {
            return Err(SchemaError::SnapshotStateInvalid {
                detail: format!("pending step '{}' already completed", pending.key),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(loop_id: &str, iteration: u64) -> LoopPathFrame {
        LoopPathFrame {
            loop_id: loop_id.to_string(),
            iteration,
        }
    }

    fn running(completed: Vec<&str>, pending: &str, path: Vec<LoopPathFrame>) -> ExecutionSnapshot {
        let completed = CompletedSet::from_keys(
            completed
                .into_iter()
                .map(|k| StepInstanceKey::parse(k).unwrap())
                .collect(),
        );
        let loop_stack = path
            .iter()
            .map(|f| LoopFrame {
                loop_id: f.loop_id.clone(),
                iteration: f.iteration,
                body_index: 0,
            })
            .collect();
        ExecutionSnapshot::new(EngineState::Running {
            completed,
            loop_stack,
            pending: PendingStep {
                key: StepInstanceKey::parse(pending).unwrap(),
                loop_path: path,
            },
        })
    }

    #[test]
    fn key_grammar_round_trips() {
        let key = StepInstanceKey::new("collect", &[frame("retry", 2), frame("inner", 0)]).unwrap();
        assert_eq!(key.as_str(), "collect>retry:2>inner:0");
        assert_eq!(StepInstanceKey::parse(key.as_str()).unwrap(), key);
        assert_eq!(key.loop_path(), vec![frame("retry", 2), frame("inner", 0)]);
    }

    #[test]
    fn key_rejects_bad_identifiers() {
        assert!(StepInstanceKey::parse("Step").is_err());
        assert!(StepInstanceKey::parse("a>loop").is_err());
        assert!(StepInstanceKey::parse("a>loop:x").is_err());
        assert!(StepInstanceKey::parse("").is_err());
    }

    #[test]
    fn valid_running_snapshot_passes() {
        running(vec!["setup"], "collect>retry:0", vec![frame("retry", 0)])
            .validate()
            .unwrap();
    }

    #[test]
    fn init_and_complete_pass_trivially() {
        ExecutionSnapshot::new(EngineState::Init).validate().unwrap();
        ExecutionSnapshot::new(EngineState::Complete)
            .validate()
            .unwrap();
    }

    #[test]
    fn unsorted_completed_set_fails() {
        let snap = ExecutionSnapshot::new(EngineState::Running {
            completed: CompletedSet {
                kind: SetTag::Set,
                values: vec![
                    StepInstanceKey::parse("zeta").unwrap(),
                    StepInstanceKey::parse("alpha").unwrap(),
                ],
            },
            loop_stack: vec![],
            pending: PendingStep {
                key: StepInstanceKey::parse("pending").unwrap(),
                loop_path: vec![],
            },
        });
        let err = snap.validate().unwrap_err();
        assert_eq!(err.code(), "SNAPSHOT_STATE_INVALID");
    }

    #[test]
    fn pending_in_completed_fails() {
        let snap = running(vec!["setup"], "setup", vec![]);
        assert!(snap.validate().is_err());
    }

    #[test]
    fn loop_path_must_match_stack_prefix() {
        let mut snap = running(vec![], "collect>retry:1", vec![frame("retry", 1)]);
        if let EngineState::Running { loop_stack, .. } =
            &mut snap.engine_payload.engine_state
        {
            loop_stack[0].iteration = 2;
        }
        let err = snap.validate().unwrap_err();
        assert_eq!(err.code(), "SNAPSHOT_STATE_INVALID");
    }

    #[test]
    fn content_ref_is_stable_for_equal_snapshots() {
        let a = running(vec!["setup"], "collect", vec![]);
        let b = running(vec!["setup"], "collect", vec![]);
        assert_eq!(a.content_ref(), b.content_ref());
    }

    #[test]
    fn wire_uses_set_wrapper() {
        let snap = running(vec!["setup"], "collect", vec![]);
        let v = serde_json::to_value(&snap).unwrap();
        assert_eq!(v["kind"], "execution_snapshot");
        assert_eq!(v["enginePayload"]["engineState"]["kind"], "running");
        assert_eq!(
            v["enginePayload"]["engineState"]["completed"]["kind"],
            "set"
        );
    }
}
