// SPDX-License-Identifier: MIT OR Apache-2.0

//! Node outputs: one current recap, ordered artifacts, supersede chains.

use crate::{ProjectionError, ensure_ordered_prefix};
use std::collections::{BTreeMap, BTreeSet};
use wr_codec::Sha256Digest;
use wr_event::{DomainEvent, EventBody, OutputChannel};
use wr_ident::{NodeId, OutputId};

/// One surviving output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    /// The output.
    pub output_id: OutputId,
    /// MIME type.
    pub content_type: String,
    /// Digest of the content bytes.
    pub sha256: Sha256Digest,
    /// Inline excerpt, when recorded.
    pub snippet: Option<String>,
}

/// Surviving outputs of one node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeOutputs {
    /// The current recap: the first recap appended that was never
    /// superseded.
    pub current_recap: Option<OutputRecord>,
    /// Non-superseded artifacts, sorted by `(sha256, contentType)`.
    pub artifacts: Vec<OutputRecord>,
}

/// Outputs of every node in the prefix.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeOutputsProjection {
    /// Per-node outputs.
    pub nodes: BTreeMap<NodeId, NodeOutputs>,
}

impl NodeOutputsProjection {
    /// Outputs of `node`, empty if it produced none.
    #[must_use]
    pub fn of(&self, node: &NodeId) -> NodeOutputs {
        self.nodes.get(node).cloned().unwrap_or_default()
    }
}

/// Project per-node outputs.
///
/// Supersede chains are respected transitively: if b supersedes a and c
/// supersedes b, only c survives.
///
/// # Errors
///
/// [`ProjectionError::InvariantViolation`] on a broken prefix
/// precondition.
pub fn project_node_outputs(
    events: &[DomainEvent],
) -> Result<NodeOutputsProjection, ProjectionError> {
    ensure_ordered_prefix(events)?;

    // First pass: everything superseded by anything.
    let mut superseded: BTreeSet<&OutputId> = BTreeSet::new();
    for event in events {
        if let EventBody::NodeOutputAppended(data) = &event.body {
            if let Some(victim) = &data.supersedes {
                superseded.insert(victim);
            }
        }
    }

    let mut nodes: BTreeMap<NodeId, NodeOutputs> = BTreeMap::new();
    for event in events {
        let EventBody::NodeOutputAppended(data) = &event.body else {
            continue;
        };
        if superseded.contains(&data.output_id) {
            continue;
        }
        let record = OutputRecord {
            output_id: data.output_id.clone(),
            content_type: data.content_type.clone(),
            sha256: data.sha256,
            snippet: data.snippet.clone(),
        };
        let entry = nodes.entry(data.node_id.clone()).or_default();
        match data.channel {
            OutputChannel::Recap => {
                // First wins.
                if entry.current_recap.is_none() {
                    entry.current_recap = Some(record);
                }
            }
            OutputChannel::Artifact => entry.artifacts.push(record),
        }
    }

    for outputs in nodes.values_mut() {
        outputs
            .artifacts
            .sort_by(|a, b| (a.sha256, &a.content_type).cmp(&(b.sha256, &b.content_type)));
    }

    Ok(NodeOutputsProjection { nodes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{EventSeq, node};
    use wr_event::NodeOutputAppendedData;
    use wr_ident::BrandedId;

    fn output(tag: u8) -> OutputId {
        OutputId::from_entropy([tag; 16])
    }

    fn append(
        seq: &mut EventSeq,
        node_id: &NodeId,
        output_id: &OutputId,
        channel: OutputChannel,
        content: &[u8],
        supersedes: Option<&OutputId>,
    ) {
        seq.push(EventBody::NodeOutputAppended(NodeOutputAppendedData {
            node_id: node_id.clone(),
            output_id: output_id.clone(),
            channel,
            content_type: "text/plain".to_string(),
            sha256: wr_codec::sha256_digest(content),
            snippet: Some(String::from_utf8_lossy(content).into_owned()),
            supersedes: supersedes.cloned(),
        }));
    }

    #[test]
    fn first_recap_wins() {
        let mut seq = EventSeq::new();
        let n = node(1);
        append(&mut seq, &n, &output(1), OutputChannel::Recap, b"first", None);
        append(&mut seq, &n, &output(2), OutputChannel::Recap, b"second", None);

        let projection = project_node_outputs(&seq.events).unwrap();
        let recap = projection.of(&n).current_recap.unwrap();
        assert_eq!(recap.output_id, output(1));
    }

    #[test]
    fn supersede_chain_is_transitive() {
        let mut seq = EventSeq::new();
        let n = node(1);
        let (a, b, c) = (output(1), output(2), output(3));
        append(&mut seq, &n, &a, OutputChannel::Recap, b"v1", None);
        append(&mut seq, &n, &b, OutputChannel::Recap, b"v2", Some(&a));
        append(&mut seq, &n, &c, OutputChannel::Recap, b"v3", Some(&b));

        let projection = project_node_outputs(&seq.events).unwrap();
        let recap = projection.of(&n).current_recap.unwrap();
        assert_eq!(recap.output_id, c);
    }

    #[test]
    fn artifacts_sort_by_digest_then_type() {
        let mut seq = EventSeq::new();
        let n = node(1);
        append(&mut seq, &n, &output(1), OutputChannel::Artifact, b"zzz", None);
        append(&mut seq, &n, &output(2), OutputChannel::Artifact, b"aaa", None);

        let projection = project_node_outputs(&seq.events).unwrap();
        let artifacts = projection.of(&n).artifacts;
        assert_eq!(artifacts.len(), 2);
        assert!(artifacts[0].sha256 <= artifacts[1].sha256);
    }

    #[test]
    fn nodes_without_outputs_are_empty() {
        let projection = project_node_outputs(&[]).unwrap();
        assert_eq!(projection.of(&node(9)), NodeOutputs::default());
    }
}
