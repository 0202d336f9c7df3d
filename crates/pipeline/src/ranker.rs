//! Top-K ranking of unseen catalog items for one user.
//!
//! ## Algorithm
//! 1. One candidate per catalog item, ascending ids
//! 2. Pre-score filters (by default: drop items the user already rated)
//! 3. Score the survivors with the given `Scorer`
//! 4. Post-score filters (e.g. `MinimumScoreFilter`)
//! 5. Sort by score descending, ties by ascending item id, keep K

use crate::filter_pipeline::FilterPipeline;
use crate::filters::AlreadyRatedFilter;
use crate::traits::Filter;
use crate::types::{Candidate, UserContext};
use anyhow::Result;
use data_loader::ItemId;
use models::{ScoredItem, Scorer};
use tracing::{debug, instrument};

pub struct Recommender {
    catalog: Vec<ItemId>,
    pre_score: FilterPipeline,
    post_score: FilterPipeline,
}

impl Recommender {
    /// Ranker over `catalog` that excludes already-rated items
    pub fn new(catalog: Vec<ItemId>) -> Self {
        Self::without_filters(catalog).with_filter(AlreadyRatedFilter)
    }

    /// Ranker with empty filter pipelines
    pub fn without_filters(mut catalog: Vec<ItemId>) -> Self {
        catalog.sort_unstable();
        catalog.dedup();
        Self {
            catalog,
            pre_score: FilterPipeline::new(),
            post_score: FilterPipeline::new(),
        }
    }

    /// Add a filter that runs before scoring
    pub fn with_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.pre_score = self.pre_score.add_filter(filter);
        self
    }

    /// Add a filter that runs on scored candidates
    pub fn with_score_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.post_score = self.post_score.add_filter(filter);
        self
    }

    pub fn catalog(&self) -> &[ItemId] {
        &self.catalog
    }

    /// Up to `k` items, best first; empty when nothing is eligible
    #[instrument(skip(self, context, scorer), fields(user_id = context.user_id, scorer = scorer.name()))]
    pub fn recommend(&self, context: &UserContext, scorer: &dyn Scorer, k: usize) -> Result<Vec<ScoredItem>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let candidates: Vec<Candidate> = self.catalog.iter().map(|&id| Candidate::new(id)).collect();
        let candidates = self.pre_score.apply(candidates, context)?;

        let scored: Vec<Candidate> = candidates
            .into_iter()
            .map(|c| Candidate::scored(c.item_id, scorer.score(context.user_id, c.item_id)))
            .collect();
        let mut scored = self.post_score.apply(scored, context)?;

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
        scored.truncate(k);
        debug!(returned = scored.len(), "ranked candidates");

        Ok(scored
            .into_iter()
            .map(|c| ScoredItem::new(c.item_id, c.score))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::MinimumScoreFilter;
    use data_loader::UserId;

    /// Score is a fixed table lookup, 0 otherwise
    struct TableScorer(Vec<(ItemId, f32)>);

    impl Scorer for TableScorer {
        fn name(&self) -> &str {
            "table"
        }

        fn score(&self, _user_id: UserId, item_id: ItemId) -> f32 {
            self.0
                .iter()
                .find(|(id, _)| *id == item_id)
                .map(|(_, s)| *s)
                .unwrap_or(0.0)
        }
    }

    fn scorer() -> TableScorer {
        TableScorer(vec![(1, 0.3), (2, 0.9), (3, 0.9), (4, 0.1), (5, 0.7)])
    }

    #[test]
    fn test_sorted_with_id_tiebreak() {
        let ranker = Recommender::new(vec![5, 4, 3, 2, 1]);
        let recs = ranker.recommend(&UserContext::new(1), &scorer(), 3).unwrap();
        let ids: Vec<ItemId> = recs.iter().map(|s| s.item_id).collect();
        assert_eq!(ids, vec![2, 3, 5]);
    }

    #[test]
    fn test_excludes_rated_items() {
        let mut context = UserContext::new(1);
        context.rated_items.extend([2, 5]);
        let recs = Recommender::new(vec![1, 2, 3, 4, 5])
            .recommend(&context, &scorer(), 10)
            .unwrap();
        let ids: Vec<ItemId> = recs.iter().map(|s| s.item_id).collect();
        assert_eq!(ids, vec![3, 1, 4]);
    }

    #[test]
    fn test_empty_when_everything_rated() {
        let mut context = UserContext::new(1);
        context.rated_items.extend([1, 2]);
        let recs = Recommender::new(vec![1, 2]).recommend(&context, &scorer(), 5).unwrap();
        assert!(recs.is_empty());
        assert!(Recommender::new(vec![1]).recommend(&UserContext::new(1), &scorer(), 0).unwrap().is_empty());
    }

    #[test]
    fn test_score_filter() {
        let recs = Recommender::new(vec![1, 2, 3, 4, 5])
            .with_score_filter(MinimumScoreFilter::new(0.5))
            .recommend(&UserContext::new(1), &scorer(), 10)
            .unwrap();
        assert!(recs.iter().all(|s| s.score >= 0.5));
        assert_eq!(recs.len(), 3);
    }
}
