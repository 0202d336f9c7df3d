//! Filter to drop weakly scored candidates.

use crate::traits::Filter;
use crate::types::{Candidate, UserContext};
use anyhow::{ensure, Result};

/// Keeps candidates whose score is at least `min_score`.
///
/// Only meaningful after scoring; NaN scores are dropped.
pub struct MinimumScoreFilter {
    min_score: f32,
}

impl MinimumScoreFilter {
    pub fn new(min_score: f32) -> Self {
        Self { min_score }
    }
}

impl Filter for MinimumScoreFilter {
    fn name(&self) -> &str {
        "MinimumScoreFilter"
    }

    fn apply(&self, candidates: Vec<Candidate>, _context: &UserContext) -> Result<Vec<Candidate>> {
        ensure!(
            !self.min_score.is_nan(),
            "MinimumScoreFilter threshold must be a number"
        );
        let filtered: Vec<Candidate> = candidates
            .into_iter()
            .filter(|candidate| candidate.score >= self.min_score)
            .collect();
        Ok(filtered)
    }
}
