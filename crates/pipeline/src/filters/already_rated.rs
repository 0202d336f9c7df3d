//! Filter to remove items the user has already rated.
//!
//! This is normally the first filter: rated items are never recommended.

use crate::traits::Filter;
use crate::types::{Candidate, UserContext};
use anyhow::Result;

/// Removes candidates in `UserContext::rated_items` (O(1) per candidate)
pub struct AlreadyRatedFilter;

impl Filter for AlreadyRatedFilter {
    fn name(&self) -> &str {
        "AlreadyRatedFilter"
    }

    fn apply(&self, candidates: Vec<Candidate>, context: &UserContext) -> Result<Vec<Candidate>> {
        let filtered: Vec<Candidate> = candidates
            .into_iter()
            .filter(|candidate| !context.rated_items.contains(&candidate.item_id))
            .collect();
        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_rated_filter() {
        let mut context = UserContext::new(1);
        context.rated_items.insert(100);
        context.rated_items.insert(200);

        let candidates = vec![
            Candidate::new(100),
            Candidate::new(101),
            Candidate::new(200),
            Candidate::new(300),
        ];

        let filtered = AlreadyRatedFilter.apply(candidates, &context).unwrap();

        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].item_id, 101);
        assert_eq!(filtered[1].item_id, 300);
    }
}
