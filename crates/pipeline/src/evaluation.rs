//! Offline evaluation: seeded holdout split, precision@K, recall@K, accuracy.

use crate::ranker::Recommender;
use crate::types::UserContext;
use anyhow::Result;
use data_loader::{ItemId, Rating, RatingMatrix};
use models::{Mulberry32, Scorer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Recommendation list length
    pub k: usize,
    /// Held-out ratings at or above this are positives
    pub threshold: f32,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self { k: 10, threshold: 4.0 }
    }
}

impl EvalConfig {
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Mean over evaluated users of hits / items recommended
    pub precision: f32,
    /// Mean over evaluated users of hits / held-out positives
    pub recall: f32,
    /// Fraction of held-out ratings the scorer classifies correctly
    pub accuracy: f32,
    /// Users with at least one held-out positive
    pub users_evaluated: usize,
    pub holdout_size: usize,
}

/// Training and validation halves of a rating matrix
#[derive(Debug, Clone, Default)]
pub struct Split {
    pub train: RatingMatrix,
    pub validation: RatingMatrix,
}

/// Assign each rating to validation with probability `validation_fraction`.
///
/// Users are visited in ascending id order and their ratings in load order,
/// so the split is a pure function of the matrix and the generator state.
pub fn split_train_validation(
    matrix: &RatingMatrix,
    validation_fraction: f64,
    rng: &mut Mulberry32,
) -> Split {
    let mut train: Vec<Rating> = Vec::with_capacity(matrix.len());
    let mut validation: Vec<Rating> = Vec::new();

    for user_id in matrix.user_ids() {
        for rating in matrix.user_ratings(user_id) {
            if rng.chance(validation_fraction) {
                validation.push(*rating);
            } else {
                train.push(*rating);
            }
        }
    }

    info!(
        train = train.len(),
        validation = validation.len(),
        "Split ratings"
    );
    Split {
        train: RatingMatrix::from_ratings(train),
        validation: RatingMatrix::from_ratings(validation),
    }
}

pub struct Evaluator {
    config: EvalConfig,
}

impl Evaluator {
    pub fn new(config: EvalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Score `scorer` on `split.validation`.
    ///
    /// Recommendations for a user exclude what they rated in `split.train`,
    /// so held-out items stay eligible.
    #[instrument(skip_all, fields(scorer = scorer.name(), k = self.config.k))]
    pub fn evaluate(&self, split: &Split, ranker: &Recommender, scorer: &dyn Scorer) -> Result<EvaluationReport> {
        let holdout = &split.validation;
        let threshold = self.config.threshold;

        let mut precision_sum = 0.0f64;
        let mut recall_sum = 0.0f64;
        let mut users_evaluated = 0usize;

        for user_id in holdout.user_ids() {
            let positives: HashSet<ItemId> = holdout
                .user_ratings(user_id)
                .iter()
                .filter(|r| r.rating >= threshold)
                .map(|r| r.item_id)
                .collect();
            if positives.is_empty() {
                continue;
            }

            let context = UserContext::from_matrix(&split.train, user_id);
            let recs = ranker.recommend(&context, scorer, self.config.k)?;
            let hits = recs.iter().filter(|s| positives.contains(&s.item_id)).count();

            if !recs.is_empty() {
                precision_sum += hits as f64 / recs.len() as f64;
            }
            recall_sum += hits as f64 / positives.len() as f64;
            users_evaluated += 1;
        }

        let correct = holdout
            .ratings()
            .iter()
            .filter(|r| scorer.classify(r.user_id, r.item_id, threshold) == (r.rating >= threshold))
            .count();

        let report = EvaluationReport {
            precision: mean(precision_sum, users_evaluated),
            recall: mean(recall_sum, users_evaluated),
            accuracy: mean(correct as f64, holdout.len()),
            users_evaluated,
            holdout_size: holdout.len(),
        };
        info!(
            precision = report.precision,
            recall = report.recall,
            accuracy = report.accuracy,
            users = users_evaluated,
            "Evaluation complete"
        );
        Ok(report)
    }
}

fn mean(sum: f64, count: usize) -> f32 {
    if count == 0 {
        0.0
    } else {
        (sum / count as f64) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_loader::UserId;

    /// Likes exactly the listed items
    struct Oracle(Vec<ItemId>);

    impl Scorer for Oracle {
        fn name(&self) -> &str {
            "oracle"
        }

        fn score(&self, _user_id: UserId, item_id: ItemId) -> f32 {
            if self.0.contains(&item_id) { 1.0 } else { 0.0 }
        }
    }

    fn matrix() -> RatingMatrix {
        RatingMatrix::from_ratings(
            (1..=20)
                .flat_map(|u| (1..=10).map(move |i| Rating::new(u, i, if i % 2 == 0 { 5.0 } else { 2.0 })))
                .collect(),
        )
    }

    #[test]
    fn test_split_is_partition_and_deterministic() {
        let m = matrix();
        let a = split_train_validation(&m, 0.3, &mut Mulberry32::new(9));
        let b = split_train_validation(&m, 0.3, &mut Mulberry32::new(9));

        assert_eq!(a.train.len() + a.validation.len(), m.len());
        assert_eq!(a.train.ratings(), b.train.ratings());
        assert_eq!(a.validation.ratings(), b.validation.ratings());
        for r in a.validation.ratings() {
            assert!(!a.train.has_rated(r.user_id, r.item_id));
        }
    }

    #[test]
    fn test_split_extremes() {
        let m = matrix();
        let none = split_train_validation(&m, 0.0, &mut Mulberry32::new(1));
        assert!(none.validation.is_empty());
        let all = split_train_validation(&m, 1.0, &mut Mulberry32::new(1));
        assert!(all.train.is_empty());
    }

    #[test]
    fn test_oracle_scores_perfectly() {
        let m = matrix();
        let split = split_train_validation(&m, 0.5, &mut Mulberry32::new(3));
        let ranker = Recommender::new(m.item_ids());
        let oracle = Oracle(vec![2, 4, 6, 8, 10]);

        let report = Evaluator::new(EvalConfig::default().with_k(10))
            .evaluate(&split, &ranker, &oracle)
            .unwrap();

        assert_eq!(report.accuracy, 1.0);
        assert_eq!(report.recall, 1.0);
        assert!(report.users_evaluated > 0);
        assert_eq!(report.holdout_size, split.validation.len());
        assert!((0.0..=1.0).contains(&report.precision));
    }

    #[test]
    fn test_empty_holdout_is_all_zero() {
        let split = Split {
            train: matrix(),
            validation: RatingMatrix::default(),
        };
        let ranker = Recommender::new(vec![1, 2, 3]);
        let report = Evaluator::new(EvalConfig::default())
            .evaluate(&split, &ranker, &Oracle(vec![]))
            .unwrap();
        assert_eq!(report, EvaluationReport::default());
    }

    #[test]
    fn test_hand_computed_metrics() {
        // User 1 holds out items 3 (positive) and 4 (negative); train has 1, 2
        let split = Split {
            train: RatingMatrix::from_ratings(vec![Rating::new(1, 1, 5.0), Rating::new(1, 2, 1.0)]),
            validation: RatingMatrix::from_ratings(vec![Rating::new(1, 3, 5.0), Rating::new(1, 4, 1.0)]),
        };
        let ranker = Recommender::new(vec![1, 2, 3, 4]);
        let report = Evaluator::new(EvalConfig::default().with_k(2))
            .evaluate(&split, &ranker, &Oracle(vec![4]))
            .unwrap();

        // Recommends [4, 3]: one hit out of two, the only positive found
        assert_eq!(report.precision, 0.5);
        assert_eq!(report.recall, 1.0);
        // Both held-out ratings misclassified
        assert_eq!(report.accuracy, 0.0);
        assert_eq!(report.users_evaluated, 1);
    }
}
