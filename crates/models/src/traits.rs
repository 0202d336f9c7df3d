//! Seams between the fitted models and the ranking/evaluation code.

use data_loader::{Dataset, ItemId, UserId};
use serde::{Deserialize, Serialize};

/// An item with the score a model assigned to it for some user
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item_id: ItemId,
    pub score: f32,
}

impl ScoredItem {
    pub fn new(item_id: ItemId, score: f32) -> Self {
        Self { item_id, score }
    }
}

/// A trained, read-only scoring function.
///
/// `Send + Sync` so one trained snapshot can be shared by reference across
/// whatever serves it.
pub trait Scorer: Send + Sync {
    /// Short name for logs and reports
    fn name(&self) -> &str;

    /// Affinity of `user_id` for `item_id`; higher is better
    fn score(&self, user_id: UserId, item_id: ItemId) -> f32;

    /// Binary "the user likes this item" decision.
    ///
    /// The default treats `score` as a probability. Scorers whose output is
    /// on the rating scale override this and compare against `threshold`.
    fn classify(&self, user_id: UserId, item_id: ItemId, threshold: f32) -> bool {
        let _ = threshold;
        self.score(user_id, item_id) >= 0.5
    }
}

/// Categorical side features for users and items
pub trait FeatureSource {
    fn user_features(&self, user_id: UserId) -> Vec<String>;
    fn item_features(&self, item_id: ItemId) -> Vec<String>;
}

/// No side features at all; every entity falls back to its id
pub struct NoFeatures;

impl FeatureSource for NoFeatures {
    fn user_features(&self, _user_id: UserId) -> Vec<String> {
        Vec::new()
    }

    fn item_features(&self, _item_id: ItemId) -> Vec<String> {
        Vec::new()
    }
}

impl FeatureSource for Dataset {
    fn user_features(&self, user_id: UserId) -> Vec<String> {
        self.get_user(user_id)
            .map(|user| user.feature_tokens())
            .unwrap_or_default()
    }

    fn item_features(&self, item_id: ItemId) -> Vec<String> {
        self.get_item(item_id)
            .map(|item| item.feature_tokens())
            .unwrap_or_default()
    }
}
