// SPDX-License-Identifier: MIT OR Apache-2.0

//! Preference propagation down the node ancestry.
//!
//! Each `preferences_changed` seeds a scope at its node; a node's
//! effective preferences merge every scope on its ancestry path with the
//! closest scope winning per field. The parent map is supplied by the
//! caller and may be damaged (cycles, self-loops); resolution fails
//! closed rather than propagate an undefined value.

use crate::{ProjectionError, ensure_ordered_prefix};
use std::collections::{BTreeMap, BTreeSet};
use wr_event::{DomainEvent, EventBody, PreferenceAutonomy, PreferenceSet, RiskPolicy};
use wr_ident::NodeId;

/// Fully-merged preferences effective at one node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EffectivePreferences {
    /// Effective autonomy, if any scope set one.
    pub autonomy: Option<PreferenceAutonomy>,
    /// Effective risk policy, if any scope set one. A preference only:
    /// it never suppresses disclosure or bypasses contracts.
    pub risk_policy: Option<RiskPolicy>,
    /// Function definitions by name, closest definition winning.
    pub functions: BTreeMap<String, String>,
}

/// Preference seeds per node, resolvable against a parent map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreferencesProjection {
    seeds: BTreeMap<NodeId, PreferenceSet>,
}

/// Project the preference seeds of a prefix.
///
/// Later `preferences_changed` events at the same node replace earlier
/// seeds field-wise (an unset field keeps the earlier value).
///
/// # Errors
///
/// [`ProjectionError::InvariantViolation`] on a broken prefix
/// precondition.
pub fn project_preferences(
    events: &[DomainEvent],
) -> Result<PreferencesProjection, ProjectionError> {
    ensure_ordered_prefix(events)?;
    let mut seeds: BTreeMap<NodeId, PreferenceSet> = BTreeMap::new();
    for event in events {
        let EventBody::PreferencesChanged(data) = &event.body else {
            continue;
        };
        let seed = seeds.entry(data.node_id.clone()).or_default();
        if let Some(autonomy) = data.preferences.autonomy {
            seed.autonomy = Some(autonomy);
        }
        if let Some(risk) = data.preferences.risk_policy {
            seed.risk_policy = Some(risk);
        }
        for function in &data.preferences.functions {
            seed.functions
                .retain(|existing| existing.name != function.name);
            seed.functions.push(function.clone());
        }
    }
    Ok(PreferencesProjection { seeds })
}

/// The ancestry path of `node` (closest first), failing closed on any
/// cycle or self-loop in the parent map.
///
/// # Errors
///
/// [`ProjectionError::InvariantViolation`] when a node repeats on its own
/// ancestry path.
pub fn ancestry(
    node: &NodeId,
    parent_map: &BTreeMap<NodeId, NodeId>,
) -> Result<Vec<NodeId>, ProjectionError> {
    let mut path = Vec::new();
    let mut visited: BTreeSet<&NodeId> = BTreeSet::new();
    let mut cursor = node;
    loop {
        if !visited.insert(cursor) {
            return Err(ProjectionError::new(format!(
                "parent map cycles through {cursor}"
            )));
        }
        path.push(cursor.clone());
        match parent_map.get(cursor) {
            Some(parent) => cursor = parent,
            None => break,
        }
    }
    Ok(path)
}

impl PreferencesProjection {
    /// The seed set at exactly `node`, if any.
    #[must_use]
    pub fn seed_at(&self, node: &NodeId) -> Option<&PreferenceSet> {
        self.seeds.get(node)
    }

    /// Resolve the effective preferences at `node` under `parent_map`.
    ///
    /// # Errors
    ///
    /// [`ProjectionError::InvariantViolation`] when the parent map cycles
    /// anywhere on the ancestry path; no value is produced in that case.
    pub fn effective_at(
        &self,
        node: &NodeId,
        parent_map: &BTreeMap<NodeId, NodeId>,
    ) -> Result<EffectivePreferences, ProjectionError> {
        let path = ancestry(node, parent_map)?;
        let mut effective = EffectivePreferences::default();
        // Closest-first walk: the first writer of a field wins.
        for ancestor in &path {
            let Some(seed) = self.seeds.get(ancestor) else {
                continue;
            };
            if effective.autonomy.is_none() {
                effective.autonomy = seed.autonomy;
            }
            if effective.risk_policy.is_none() {
                effective.risk_policy = seed.risk_policy;
            }
            for function in &seed.functions {
                effective
                    .functions
                    .entry(function.name.clone())
                    .or_insert_with(|| function.definition.clone());
            }
        }
        Ok(effective)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{EventSeq, node};
    use wr_event::{FunctionDef, PreferencesChangedData};

    fn prefs(
        seq: &mut EventSeq,
        node_id: &NodeId,
        revision: u64,
        autonomy: Option<PreferenceAutonomy>,
        functions: Vec<(&str, &str)>,
    ) {
        seq.push(EventBody::PreferencesChanged(PreferencesChangedData {
            node_id: node_id.clone(),
            revision,
            preferences: PreferenceSet {
                autonomy,
                risk_policy: None,
                functions: functions
                    .into_iter()
                    .map(|(name, definition)| FunctionDef {
                        name: name.to_string(),
                        definition: definition.to_string(),
                    })
                    .collect(),
            },
        }));
    }

    fn chain(pairs: &[(NodeId, NodeId)]) -> BTreeMap<NodeId, NodeId> {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn closest_scope_wins() {
        let (root, mid, leaf) = (node(1), node(2), node(3));
        let parents = chain(&[(mid.clone(), root.clone()), (leaf.clone(), mid.clone())]);

        let mut seq = EventSeq::new();
        prefs(&mut seq, &root, 0, Some(PreferenceAutonomy::Guided), vec![("greet", "root")]);
        prefs(&mut seq, &mid, 0, Some(PreferenceAutonomy::StepByStep), vec![]);

        let projection = project_preferences(&seq.events).unwrap();
        let effective = projection.effective_at(&leaf, &parents).unwrap();
        assert_eq!(effective.autonomy, Some(PreferenceAutonomy::StepByStep));
        assert_eq!(effective.functions["greet"], "root");
    }

    #[test]
    fn function_definitions_shadow_closest_wins() {
        let (root, leaf) = (node(1), node(2));
        let parents = chain(&[(leaf.clone(), root.clone())]);

        let mut seq = EventSeq::new();
        prefs(&mut seq, &root, 0, None, vec![("emit", "root body")]);
        prefs(&mut seq, &leaf, 0, None, vec![("emit", "leaf body")]);

        let projection = project_preferences(&seq.events).unwrap();
        let effective = projection.effective_at(&leaf, &parents).unwrap();
        assert_eq!(effective.functions["emit"], "leaf body");
    }

    #[test]
    fn self_loop_fails_closed() {
        let n = node(1);
        let parents = chain(&[(n.clone(), n.clone())]);
        let projection = PreferencesProjection::default();
        let err = projection.effective_at(&n, &parents).unwrap_err();
        assert_eq!(err.code(), "PROJECTION_INVARIANT_VIOLATION");
    }

    #[test]
    fn cycle_fails_closed() {
        let (a, b) = (node(1), node(2));
        let parents = chain(&[(a.clone(), b.clone()), (b.clone(), a.clone())]);
        let projection = PreferencesProjection::default();
        assert!(projection.effective_at(&a, &parents).is_err());
    }

    #[test]
    fn later_revision_replaces_fields() {
        let n = node(1);
        let mut seq = EventSeq::new();
        prefs(&mut seq, &n, 0, Some(PreferenceAutonomy::Guided), vec![]);
        prefs(&mut seq, &n, 1, Some(PreferenceAutonomy::FullAutoNeverStop), vec![]);

        let projection = project_preferences(&seq.events).unwrap();
        let effective = projection.effective_at(&n, &BTreeMap::new()).unwrap();
        assert_eq!(effective.autonomy, Some(PreferenceAutonomy::FullAutoNeverStop));
    }
}
