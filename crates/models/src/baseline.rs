//! Bias baseline: `predict(u, i) = mean + user_bias[u] + item_bias[i]`.
//!
//! ## Algorithm
//! 1. Compute the global mean once over all training ratings
//! 2. For `passes` rounds:
//!    a. item_bias[i] = sum(r - mean - user_bias[u]) / (lambda + count(i))
//!    b. user_bias[u] = sum(r - mean - item_bias[i]) / (lambda + count(u))
//!
//! Each step is the closed-form L2-regularized least-squares solution with
//! the other side held fixed.

use crate::error::{ModelError, Result};
use crate::traits::Scorer;
use data_loader::{ItemId, RatingMatrix, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// L2 regularization strength
    pub lambda: f32,
    /// Alternating passes; 5-10 is plenty at MovieLens scale
    pub passes: usize,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            lambda: 10.0,
            passes: 8,
        }
    }
}

impl BaselineConfig {
    pub fn with_lambda(mut self, lambda: f32) -> Self {
        self.lambda = lambda;
        self
    }

    pub fn with_passes(mut self, passes: usize) -> Self {
        self.passes = passes;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.lambda.is_finite() || self.lambda < 0.0 {
            return Err(ModelError::invalid("lambda", self.lambda));
        }
        Ok(())
    }
}

/// Fitted global mean plus per-user and per-item offsets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasBaseline {
    global_mean: f32,
    user_bias: HashMap<UserId, f32>,
    item_bias: HashMap<ItemId, f32>,
}

impl BiasBaseline {
    #[instrument(skip_all, fields(ratings = matrix.len(), passes = config.passes))]
    pub fn fit(matrix: &RatingMatrix, config: &BaselineConfig) -> Result<Self> {
        config.validate()?;

        let mean = matrix.global_mean() as f64;
        let lambda = config.lambda as f64;
        let user_ids = matrix.user_ids();
        let item_ids = matrix.item_ids();

        let mut user_bias: HashMap<UserId, f64> = user_ids.iter().map(|&u| (u, 0.0)).collect();
        let mut item_bias: HashMap<ItemId, f64> = item_ids.iter().map(|&i| (i, 0.0)).collect();

        for pass in 0..config.passes {
            for &item_id in &item_ids {
                let ratings = matrix.item_ratings(item_id);
                let residual: f64 = ratings
                    .iter()
                    .map(|r| r.rating as f64 - mean - user_bias[&r.user_id])
                    .sum();
                item_bias.insert(item_id, residual / (lambda + ratings.len() as f64));
            }

            for &user_id in &user_ids {
                let ratings = matrix.user_ratings(user_id);
                let residual: f64 = ratings
                    .iter()
                    .map(|r| r.rating as f64 - mean - item_bias[&r.item_id])
                    .sum();
                user_bias.insert(user_id, residual / (lambda + ratings.len() as f64));
            }

            if tracing::enabled!(tracing::Level::DEBUG) {
                let rmse = training_rmse(matrix, mean, &user_bias, &item_bias);
                debug!(pass, rmse, "baseline pass complete");
            }
        }

        Ok(Self {
            global_mean: mean as f32,
            user_bias: user_bias.into_iter().map(|(k, v)| (k, v as f32)).collect(),
            item_bias: item_bias.into_iter().map(|(k, v)| (k, v as f32)).collect(),
        })
    }

    /// Predicted rating; unknown users or items contribute no offset
    pub fn predict(&self, user_id: UserId, item_id: ItemId) -> f32 {
        self.global_mean + self.user_bias(user_id) + self.item_bias(item_id)
    }

    pub fn global_mean(&self) -> f32 {
        self.global_mean
    }

    pub fn user_bias(&self, user_id: UserId) -> f32 {
        self.user_bias.get(&user_id).copied().unwrap_or(0.0)
    }

    pub fn item_bias(&self, item_id: ItemId) -> f32 {
        self.item_bias.get(&item_id).copied().unwrap_or(0.0)
    }

    pub fn user_biases(&self) -> &HashMap<UserId, f32> {
        &self.user_bias
    }

    pub fn item_biases(&self) -> &HashMap<ItemId, f32> {
        &self.item_bias
    }
}

impl Scorer for BiasBaseline {
    fn name(&self) -> &str {
        "baseline"
    }

    fn score(&self, user_id: UserId, item_id: ItemId) -> f32 {
        self.predict(user_id, item_id)
    }

    /// Predictions are on the rating scale, so compare with the threshold
    fn classify(&self, user_id: UserId, item_id: ItemId, threshold: f32) -> bool {
        self.predict(user_id, item_id) >= threshold
    }
}

fn training_rmse(
    matrix: &RatingMatrix,
    mean: f64,
    user_bias: &HashMap<UserId, f64>,
    item_bias: &HashMap<ItemId, f64>,
) -> f64 {
    if matrix.is_empty() {
        return 0.0;
    }
    let sse: f64 = matrix
        .ratings()
        .iter()
        .map(|r| {
            let err = r.rating as f64 - mean - user_bias[&r.user_id] - item_bias[&r.item_id];
            err * err
        })
        .sum();
    (sse / matrix.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_loader::Rating;

    #[test]
    fn test_single_item_zero_lambda() {
        let matrix = RatingMatrix::from_ratings(
            (1..=5).map(|u| Rating::new(u, 7, 5.0)).collect(),
        );
        let config = BaselineConfig::default().with_lambda(0.0).with_passes(5);
        let model = BiasBaseline::fit(&matrix, &config).unwrap();

        assert_eq!(model.item_bias(7), 5.0 - model.global_mean());
        for u in 1..=5 {
            assert_eq!(model.predict(u, 7), 5.0);
        }
    }

    #[test]
    fn test_mean_and_unknown_ids() {
        let matrix = RatingMatrix::from_ratings(vec![
            Rating::new(1, 10, 5.0),
            Rating::new(1, 20, 1.0),
            Rating::new(2, 10, 4.0),
            Rating::new(2, 30, 5.0),
        ]);
        let model = BiasBaseline::fit(&matrix, &BaselineConfig::default()).unwrap();
        assert_eq!(model.global_mean(), 3.75);
        assert_eq!(model.predict(99, 999), 3.75);
    }

    #[test]
    fn test_biases_follow_ratings() {
        let matrix = RatingMatrix::from_ratings(vec![
            Rating::new(1, 10, 5.0),
            Rating::new(2, 10, 5.0),
            Rating::new(1, 20, 1.0),
            Rating::new(2, 20, 2.0),
        ]);
        let config = BaselineConfig::default().with_lambda(1.0);
        let model = BiasBaseline::fit(&matrix, &config).unwrap();
        assert!(model.item_bias(10) > 0.0);
        assert!(model.item_bias(20) < 0.0);
        assert!(model.predict(1, 10) > model.predict(1, 20));
        assert!(model.classify(1, 10, 4.0));
        assert!(!model.classify(1, 20, 4.0));
    }

    #[test]
    fn test_empty_matrix() {
        let model = BiasBaseline::fit(&RatingMatrix::default(), &BaselineConfig::default()).unwrap();
        assert_eq!(model.predict(1, 1), 0.0);
    }

    #[test]
    fn test_rejects_negative_lambda() {
        let config = BaselineConfig::default().with_lambda(-1.0);
        let result = BiasBaseline::fit(&RatingMatrix::default(), &config);
        assert!(matches!(result, Err(ModelError::InvalidConfig { field: "lambda", .. })));
    }
}
