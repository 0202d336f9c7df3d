//! Core traits for the filtering pipeline.

use crate::types::{Candidate, UserContext};
use anyhow::Result;

/// A composable candidate filter.
///
/// Filters take ownership of the candidate list and return what survives,
/// preserving the input order.
pub trait Filter: Send + Sync {
    /// Returns the name of this filter (for logging/debugging)
    fn name(&self) -> &str;

    fn apply(&self, candidates: Vec<Candidate>, context: &UserContext) -> Result<Vec<Candidate>>;
}
