// SPDX-License-Identifier: MIT OR Apache-2.0

//! Blockers and blocked snapshots.
//!
//! A blocker names one reason an advance could not complete, pointed at
//! the contract or capability it violates. A blocked snapshot is the
//! recorded outcome of such an advance: retryable (with a fresh attempt
//! id to retry under) or terminal.

use crate::SchemaError;
use serde::{Deserialize, Serialize};
use wr_ident::AttemptId;

/// Byte budget for a blocker message.
pub const MAX_BLOCKER_MESSAGE_BYTES: usize = 512;

/// Byte budget for a suggested fix.
pub const MAX_SUGGESTED_FIX_BYTES: usize = 1024;

// ---------------------------------------------------------------------------
// Blocker
// ---------------------------------------------------------------------------

/// Closed set of blocker codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockerCode {
    /// A required output was never produced.
    MissingRequiredOutput,
    /// A required output was produced but failed its contract.
    InvalidRequiredOutput,
    /// An engine invariant was violated.
    InvariantViolation,
    /// A capability the step requires is not available.
    RequiredCapabilityUnavailable,
}

/// Where a blocker points, tagged by a closed kind set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockerPointer {
    /// An output contract, by reference.
    OutputContract {
        /// Contract identifier, e.g. `"wr.test"`.
        #[serde(rename = "contractRef")]
        contract_ref: String,
    },
    /// The context byte budget.
    ContextBudget {
        /// Which budget was exhausted.
        #[serde(rename = "budgetKey")]
        budget_key: String,
    },
    /// A named capability.
    Capability {
        /// The missing capability.
        capability: String,
    },
    /// A workflow step.
    Step {
        /// The step identifier.
        #[serde(rename = "stepId")]
        step_id: String,
    },
}

/// One reason an advance could not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Blocker {
    /// What went wrong.
    pub code: BlockerCode,
    /// What it points at.
    pub pointer: BlockerPointer,
    /// Human-readable description, at most 512 bytes of UTF-8.
    pub message: String,
    /// Optional remedy, at most 1024 bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
}

impl Blocker {
    /// Build a blocker, enforcing the byte budgets.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::TextBoundExceeded`] when `message` exceeds
    /// 512 bytes or `suggested_fix` exceeds 1024.
    pub fn new(
        code: BlockerCode,
        pointer: BlockerPointer,
        message: impl Into<String>,
        suggested_fix: Option<String>,
    ) -> Result<Self, SchemaError> {
        let message = message.into();
        if message.len() > MAX_BLOCKER_MESSAGE_BYTES {
            return Err(SchemaError::TextBoundExceeded {
                field: "blocker.message",
                budget: MAX_BLOCKER_MESSAGE_BYTES,
                actual: message.len(),
            });
        }
        if let Some(fix) = &suggested_fix {
            if fix.len() > MAX_SUGGESTED_FIX_BYTES {
                return Err(SchemaError::TextBoundExceeded {
                    field: "blocker.suggestedFix",
                    budget: MAX_SUGGESTED_FIX_BYTES,
                    actual: fix.len(),
                });
            }
        }
        Ok(Self {
            code,
            pointer,
            message,
            suggested_fix,
        })
    }
}

// ---------------------------------------------------------------------------
// Blocked snapshot
// ---------------------------------------------------------------------------

/// Why an advance blocked. One closed set, split into retryable and
/// terminal members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// An output contract is unmet; producing the output unblocks.
    OutputContractUnmet,
    /// The context budget is exhausted; trimming context unblocks.
    ContextBudgetExceeded,
    /// A capability is unavailable; supplying it unblocks.
    CapabilityUnavailable,
    /// An engine invariant was violated. Terminal.
    InvariantViolation,
    /// The step contract can never be satisfied. Terminal.
    UnrecoverableContract,
    /// The operator aborted the run. Terminal.
    OperatorAbort,
}

impl BlockReason {
    /// Whether this reason ends the node rather than inviting a retry.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::InvariantViolation | Self::UnrecoverableContract | Self::OperatorAbort
        )
    }
}

/// The recorded outcome of a blocked advance.
///
/// `retryable_block` requires a retry attempt id and a non-terminal
/// reason; `terminal_block` forbids the attempt id and requires a terminal
/// reason. Both shapes are enforced on construction and on decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BlockedWire", into = "BlockedWire")]
pub enum BlockedSnapshot {
    /// The caller may retry under the given attempt id.
    RetryableBlock {
        /// Attempt id the retry must present.
        retry_attempt_id: AttemptId,
        /// Non-terminal reason.
        reason: BlockReason,
        /// The blockers that stopped the advance.
        blockers: Vec<Blocker>,
    },
    /// The node is finished; no retry is possible.
    TerminalBlock {
        /// Terminal reason.
        reason: BlockReason,
        /// The blockers that stopped the advance.
        blockers: Vec<Blocker>,
    },
}

impl BlockedSnapshot {
    /// Build a retryable block.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::BlockedSnapshotInvalid`] for a terminal
    /// reason.
    pub fn retryable(
        retry_attempt_id: AttemptId,
        reason: BlockReason,
        blockers: Vec<Blocker>,
    ) -> Result<Self, SchemaError> {
        if reason.is_terminal() {
            return Err(SchemaError::BlockedSnapshotInvalid {
                detail: "retryable block carries a terminal reason".to_string(),
            });
        }
        Ok(Self::RetryableBlock {
            retry_attempt_id,
            reason,
            blockers,
        })
    }

    /// Build a terminal block.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::BlockedSnapshotInvalid`] for a non-terminal
    /// reason.
    pub fn terminal(reason: BlockReason, blockers: Vec<Blocker>) -> Result<Self, SchemaError> {
        if !reason.is_terminal() {
            return Err(SchemaError::BlockedSnapshotInvalid {
                detail: "terminal block carries a retryable reason".to_string(),
            });
        }
        Ok(Self::TerminalBlock { reason, blockers })
    }

    /// The blockers regardless of shape.
    #[must_use]
    pub fn blockers(&self) -> &[Blocker] {
        match self {
            Self::RetryableBlock { blockers, .. } | Self::TerminalBlock { blockers, .. } => {
                blockers
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum BlockKindTag {
    RetryableBlock,
    TerminalBlock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct BlockedWire {
    kind: BlockKindTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retry_attempt_id: Option<AttemptId>,
    reason: BlockReason,
    blockers: Vec<Blocker>,
}

impl TryFrom<BlockedWire> for BlockedSnapshot {
    type Error = SchemaError;

    fn try_from(wire: BlockedWire) -> Result<Self, Self::Error> {
        match wire.kind {
            BlockKindTag::RetryableBlock => {
                let retry_attempt_id = wire.retry_attempt_id.ok_or_else(|| {
                    SchemaError::BlockedSnapshotInvalid {
                        detail: "retryable block is missing retryAttemptId".to_string(),
                    }
                })?;
                Self::retryable(retry_attempt_id, wire.reason, wire.blockers)
            }
            BlockKindTag::TerminalBlock => {
                if wire.retry_attempt_id.is_some() {
                    return Err(SchemaError::BlockedSnapshotInvalid {
                        detail: "terminal block carries retryAttemptId".to_string(),
                    });
                }
                Self::terminal(wire.reason, wire.blockers)
            }
        }
    }
}

impl From<BlockedSnapshot> for BlockedWire {
    fn from(value: BlockedSnapshot) -> Self {
        match value {
            BlockedSnapshot::RetryableBlock {
                retry_attempt_id,
                reason,
                blockers,
            } => Self {
                kind: BlockKindTag::RetryableBlock,
                retry_attempt_id: Some(retry_attempt_id),
                reason,
                blockers,
            },
            BlockedSnapshot::TerminalBlock { reason, blockers } => Self {
                kind: BlockKindTag::TerminalBlock,
                retry_attempt_id: None,
                reason,
                blockers,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wr_ident::BrandedId;

    fn blocker() -> Blocker {
        Blocker::new(
            BlockerCode::MissingRequiredOutput,
            BlockerPointer::OutputContract {
                contract_ref: "wr.test".to_string(),
            },
            "Test output missing",
            Some("Provide the test output payload".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn message_budget_enforced() {
        let err = Blocker::new(
            BlockerCode::InvariantViolation,
            BlockerPointer::Step {
                step_id: "s1".to_string(),
            },
            "x".repeat(513),
            None,
        )
        .unwrap_err();
        assert_eq!(err.code(), "TEXT_BOUND_EXCEEDED");
    }

    #[test]
    fn retryable_requires_nonterminal_reason() {
        let attempt = AttemptId::from_entropy([1; 16]);
        assert!(
            BlockedSnapshot::retryable(attempt.clone(), BlockReason::InvariantViolation, vec![])
                .is_err()
        );
        BlockedSnapshot::retryable(attempt, BlockReason::OutputContractUnmet, vec![blocker()])
            .unwrap();
    }

    #[test]
    fn terminal_forbids_retry_attempt_on_wire() {
        let wire = json!({
            "kind": "terminal_block",
            "retryAttemptId": AttemptId::from_entropy([2; 16]).as_str(),
            "reason": "invariant_violation",
            "blockers": [],
        });
        let err = serde_json::from_value::<BlockedSnapshot>(wire).unwrap_err();
        assert!(err.to_string().contains("retryAttemptId"));
    }

    #[test]
    fn wire_round_trip_is_stable() {
        let snap = BlockedSnapshot::retryable(
            AttemptId::from_entropy([3; 16]),
            BlockReason::CapabilityUnavailable,
            vec![blocker()],
        )
        .unwrap();
        let v = serde_json::to_value(&snap).unwrap();
        assert_eq!(v["kind"], "retryable_block");
        assert_eq!(v["blockers"][0]["code"], "MISSING_REQUIRED_OUTPUT");
        assert_eq!(v["blockers"][0]["pointer"]["kind"], "output_contract");
        let back: BlockedSnapshot = serde_json::from_value(v).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn unknown_keys_rejected() {
        let wire = json!({
            "kind": "terminal_block",
            "reason": "operator_abort",
            "blockers": [],
            "extra": 1,
        });
        assert!(serde_json::from_value::<BlockedSnapshot>(wire).is_err());
    }
}
