// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resume ranking: which session should the caller pick back up?

use crate::context::project_run_contexts;
use crate::outputs::project_node_outputs;
use crate::run_dag::project_run_dags;
use crate::{ProjectionError, ensure_ordered_prefix};
use wr_event::{DomainEvent, EventBody};
use wr_ident::{EventIndex, SessionId};

/// Hard cap on ranked resume candidates.
pub const MAX_RESUME_CANDIDATES: usize = 20;

/// What the caller remembers about the work they want to resume.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResumeQuery {
    /// Git head commit, if known.
    pub git_head_sha: Option<String>,
    /// Git branch, if known.
    pub git_branch: Option<String>,
    /// Free text matched against recaps and workflow ids.
    pub free_text: Option<String>,
}

/// Facts extracted from one session for ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeCandidate {
    /// The session.
    pub session_id: SessionId,
    /// Index of the last event in the session.
    pub last_activity_event_index: EventIndex,
    /// Git head sha from the latest run context, if recorded.
    pub git_head_sha: Option<String>,
    /// Git branch from the latest run context, if recorded.
    pub git_branch: Option<String>,
    /// Recap snippet at the preferred tip, if any.
    pub recap_snippet: Option<String>,
    /// Workflow id of the first run, if any.
    pub workflow_id: Option<String>,
}

/// Match tiers, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResumeTier {
    /// Exact git head-sha match.
    ExactHeadSha,
    /// Git branch match, exact or prefix.
    BranchMatch,
    /// Free-text hit in the recap snippet.
    RecapText,
    /// Free-text hit in the workflow id.
    WorkflowText,
    /// No signal; recency only.
    RecencyFallback,
}

/// One ranked candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedCandidate {
    /// The candidate.
    pub candidate: ResumeCandidate,
    /// The tier it matched at.
    pub tier: ResumeTier,
}

fn tier_of(candidate: &ResumeCandidate, query: &ResumeQuery) -> ResumeTier {
    if let (Some(want), Some(have)) = (&query.git_head_sha, &candidate.git_head_sha) {
        if want == have {
            return ResumeTier::ExactHeadSha;
        }
    }
    if let (Some(want), Some(have)) = (&query.git_branch, &candidate.git_branch) {
        if have == want || have.starts_with(want.as_str()) {
            return ResumeTier::BranchMatch;
        }
    }
    if let Some(text) = &query.free_text {
        let needle = text.to_lowercase();
        if candidate
            .recap_snippet
            .as_ref()
            .is_some_and(|s| s.to_lowercase().contains(&needle))
        {
            return ResumeTier::RecapText;
        }
        if candidate
            .workflow_id
            .as_ref()
            .is_some_and(|s| s.to_lowercase().contains(&needle))
        {
            return ResumeTier::WorkflowText;
        }
    }
    ResumeTier::RecencyFallback
}

/// Rank candidates: tier first, then `lastActivityEventIndex` descending,
/// then session id ascending; capped at `cap`.
#[must_use]
pub fn rank_resume_candidates(
    candidates: Vec<ResumeCandidate>,
    query: &ResumeQuery,
    cap: usize,
) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = candidates
        .into_iter()
        .map(|candidate| {
            let tier = tier_of(&candidate, query);
            RankedCandidate { candidate, tier }
        })
        .collect();
    ranked.sort_by(|a, b| {
        a.tier
            .cmp(&b.tier)
            .then_with(|| {
                b.candidate
                    .last_activity_event_index
                    .cmp(&a.candidate.last_activity_event_index)
            })
            .then_with(|| a.candidate.session_id.cmp(&b.candidate.session_id))
    });
    ranked.truncate(cap.min(MAX_RESUME_CANDIDATES));
    ranked
}

/// Extract the ranking facts of one session from its event prefix.
///
/// Git facts come from the latest run context (`git.headSha`,
/// `git.branch`), the recap snippet from the preferred tip's current
/// recap, and the workflow id from the first `run_started`.
///
/// # Errors
///
/// [`ProjectionError::InvariantViolation`] if the prefix breaks a
/// projection precondition.
pub fn summarize_for_resume(
    session_id: &SessionId,
    events: &[DomainEvent],
) -> Result<Option<ResumeCandidate>, ProjectionError> {
    ensure_ordered_prefix(events)?;
    let Some(last) = events.last() else {
        return Ok(None);
    };

    let dags = project_run_dags(events)?;
    let outputs = project_node_outputs(events)?;
    let contexts = project_run_contexts(events)?;

    let mut workflow_id = None;
    for event in events {
        if let EventBody::RunStarted(data) = &event.body {
            workflow_id = Some(data.workflow_id.clone());
            break;
        }
    }

    let mut git_head_sha = None;
    let mut git_branch = None;
    let mut recap_snippet = None;
    for (run_id, dag) in &dags.runs {
        if git_head_sha.is_none() {
            git_head_sha = contexts.lookup(run_id, "git.headSha").map(str::to_string);
        }
        if git_branch.is_none() {
            git_branch = contexts.lookup(run_id, "git.branch").map(str::to_string);
        }
        if recap_snippet.is_none() {
            recap_snippet = dag
                .preferred_tip_node_id
                .as_ref()
                .and_then(|tip| outputs.of(tip).current_recap)
                .and_then(|recap| recap.snippet);
        }
    }

    Ok(Some(ResumeCandidate {
        session_id: session_id.clone(),
        last_activity_event_index: last.event_index,
        git_head_sha,
        git_branch,
        recap_snippet,
        workflow_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wr_ident::BrandedId;

    fn candidate(tag: u8, last: u64) -> ResumeCandidate {
        ResumeCandidate {
            session_id: SessionId::from_entropy([tag; 16]),
            last_activity_event_index: EventIndex::new(last),
            git_head_sha: None,
            git_branch: None,
            recap_snippet: None,
            workflow_id: None,
        }
    }

    #[test]
    fn head_sha_beats_everything() {
        let mut with_sha = candidate(1, 0);
        with_sha.git_head_sha = Some("abc".to_string());
        let mut with_recap = candidate(2, 99);
        with_recap.recap_snippet = Some("fix the abc flake".to_string());

        let ranked = rank_resume_candidates(
            vec![with_recap, with_sha.clone()],
            &ResumeQuery {
                git_head_sha: Some("abc".to_string()),
                git_branch: None,
                free_text: Some("abc".to_string()),
            },
            10,
        );
        assert_eq!(ranked[0].candidate, with_sha);
        assert_eq!(ranked[0].tier, ResumeTier::ExactHeadSha);
    }

    #[test]
    fn branch_prefix_matches() {
        let mut c = candidate(1, 0);
        c.git_branch = Some("fix/flaky-timeout".to_string());
        let ranked = rank_resume_candidates(
            vec![c],
            &ResumeQuery {
                git_head_sha: None,
                git_branch: Some("fix/flaky".to_string()),
                free_text: None,
            },
            10,
        );
        assert_eq!(ranked[0].tier, ResumeTier::BranchMatch);
    }

    #[test]
    fn within_tier_recency_desc_then_id_asc() {
        let older = candidate(1, 5);
        let newer = candidate(2, 9);
        let tie_a = candidate(3, 9);

        let ranked = rank_resume_candidates(
            vec![older.clone(), tie_a.clone(), newer.clone()],
            &ResumeQuery::default(),
            10,
        );
        assert_eq!(ranked[0].candidate.last_activity_event_index.value(), 9);
        assert_eq!(ranked[1].candidate.last_activity_event_index.value(), 9);
        // Tie at index 9 breaks by ascending session id.
        assert!(ranked[0].candidate.session_id < ranked[1].candidate.session_id);
        assert_eq!(ranked[2].candidate, older);
    }

    #[test]
    fn cap_is_enforced() {
        let candidates: Vec<_> = (0..40u8).map(|i| candidate(i, i as u64)).collect();
        let ranked = rank_resume_candidates(candidates, &ResumeQuery::default(), 50);
        assert_eq!(ranked.len(), MAX_RESUME_CANDIDATES);
    }

    #[test]
    fn empty_session_summarizes_to_none() {
        let id = SessionId::from_entropy([1; 16]);
        assert_eq!(summarize_for_resume(&id, &[]).unwrap(), None);
    }
}
