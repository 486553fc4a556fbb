// SPDX-License-Identifier: MIT OR Apache-2.0

//! Schema shapes: structural descriptions of wire records as plain data.
//!
//! Callers that need to enumerate keys, enum members, or defaults (input
//! templates, introspection surfaces) read these descriptions instead of
//! reflecting over serde at runtime.

use crate::event::EventKind;

/// Structural description of a wire value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaShape {
    /// A JSON string; `pattern` names the grammar when one applies.
    Text {
        /// Optional grammar name, e.g. `"sha256-digest"`.
        pattern: Option<&'static str>,
    },
    /// A non-negative integer.
    Unsigned,
    /// A closed string set.
    Enum {
        /// The members, in declaration order.
        members: Vec<&'static str>,
    },
    /// An object with a fixed field set.
    Object {
        /// Field name, shape, and whether the field is required.
        fields: Vec<SchemaField>,
    },
    /// An array of one element shape.
    Array {
        /// Shape of each element.
        element: Box<SchemaShape>,
    },
    /// A free-form JSON value.
    Any,
}

/// One field of an object shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    /// Wire name (camelCase).
    pub name: &'static str,
    /// Field shape.
    pub shape: SchemaShape,
    /// Whether the field must be present.
    pub required: bool,
}

fn field(name: &'static str, shape: SchemaShape) -> SchemaField {
    SchemaField {
        name,
        shape,
        required: true,
    }
}

fn optional(name: &'static str, shape: SchemaShape) -> SchemaField {
    SchemaField {
        name,
        shape,
        required: false,
    }
}

fn id() -> SchemaShape {
    SchemaShape::Text {
        pattern: Some("branded-id"),
    }
}

fn digest() -> SchemaShape {
    SchemaShape::Text {
        pattern: Some("sha256-digest"),
    }
}

fn text() -> SchemaShape {
    SchemaShape::Text { pattern: None }
}

fn members(members: &[&'static str]) -> SchemaShape {
    SchemaShape::Enum {
        members: members.to_vec(),
    }
}

impl EventKind {
    /// The structural description of this kind's data payload.
    #[must_use]
    pub fn data_schema(self) -> SchemaShape {
        let fields = match self {
            Self::SessionCreated => vec![],
            Self::RunStarted => vec![
                field("runId", id()),
                field("workflowId", text()),
                field("workflowHash", digest()),
            ],
            Self::NodeCreated => vec![
                field("runId", id()),
                field("nodeId", id()),
                optional("parentNodeId", id()),
                field("snapshotRef", digest()),
                field("title", text()),
            ],
            Self::EdgeCreated => vec![
                field("runId", id()),
                field("from", id()),
                field("to", id()),
                field("kind", members(&["acked_step", "branched", "retried"])),
            ],
            Self::AdvanceRecorded => vec![
                field("runId", id()),
                field("nodeId", id()),
                field("attemptId", id()),
                field("outcome", SchemaShape::Any),
            ],
            Self::NodeOutputAppended => vec![
                field("nodeId", id()),
                field("outputId", id()),
                field("channel", members(&["recap", "artifact"])),
                field("contentType", text()),
                field("sha256", digest()),
                optional("snippet", text()),
                optional("supersedes", id()),
            ],
            Self::PreferencesChanged => vec![
                field("nodeId", id()),
                field("revision", SchemaShape::Unsigned),
                field("preferences", SchemaShape::Any),
            ],
            Self::GapRecorded => vec![
                field("runId", id()),
                field("gapKey", text()),
                field("severity", members(&["info", "minor", "major", "critical"])),
                field(
                    "category",
                    members(&[
                        "missing_input",
                        "broken_invariant",
                        "external_dependency",
                        "ambiguity",
                        "other",
                    ]),
                ),
                field("status", members(&["open", "resolved"])),
            ],
            Self::ContextSet => vec![
                field("runId", id()),
                field("revision", SchemaShape::Unsigned),
                field("context", SchemaShape::Any),
            ],
            Self::DecisionTraceAppended => vec![
                field("nodeId", id()),
                field("seq", SchemaShape::Unsigned),
                field("decision", text()),
                optional("rationale", text()),
            ],
            Self::ObservationRecorded => vec![
                optional("runId", id()),
                optional("nodeId", id()),
                field("label", text()),
                field("seq", SchemaShape::Unsigned),
                field("payload", SchemaShape::Any),
            ],
        };
        SchemaShape::Object { fields }
    }
}

impl SchemaShape {
    /// Field names of an object shape, empty otherwise.
    #[must_use]
    pub fn field_names(&self) -> Vec<&'static str> {
        match self {
            Self::Object { fields } => fields.iter().map(|f| f.name).collect(),
            _ => Vec::new(),
        }
    }

    /// Enum members of an enum shape, empty otherwise.
    #[must_use]
    pub fn enum_members(&self) -> Vec<&'static str> {
        match self {
            Self::Enum { members } => members.clone(),
            _ => Vec::new(),
        }
    }
}
