// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resume candidates across the whole data directory.

use crate::{Engine, EngineError};
use wr_projection::{RankedCandidate, ResumeQuery, rank_resume_candidates, summarize_for_resume};

impl Engine {
    /// Rank every readable session against `query`.
    ///
    /// Sessions are visited in recency order; a session whose tail is
    /// damaged contributes its validated prefix rather than poisoning
    /// the whole listing. The result is capped at the configured
    /// `max_resume_candidates`.
    ///
    /// # Errors
    ///
    /// [`EngineError::Store`] on directory enumeration failure only.
    pub async fn resume_candidates(
        &self,
        query: &ResumeQuery,
    ) -> Result<Vec<RankedCandidate>, EngineError> {
        let stamps = self.store.enumerate_by_recency().await?;
        let mut candidates = Vec::with_capacity(stamps.len());
        for stamp in &stamps {
            let Ok(prefix) = self.store.load_validated_prefix(&stamp.session_id).await else {
                continue;
            };
            match summarize_for_resume(&stamp.session_id, &prefix.truth.events) {
                Ok(Some(candidate)) => candidates.push(candidate),
                Ok(None) => {}
                // A prefix that cannot be summarized is skipped, not fatal.
                Err(_) => {}
            }
        }
        Ok(rank_resume_candidates(
            candidates,
            query,
            self.config.max_resume_candidates,
        ))
    }
}
