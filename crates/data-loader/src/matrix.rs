//! The interaction index: ratings grouped by user and by item.
//!
//! Both groupings are built in one pass over the rating list and are
//! read-only afterwards. The original rating order is kept as well, because
//! the training split and SGD sampling are defined over it.

use crate::types::{ItemId, Rating, UserId};
use std::collections::{HashMap, HashSet};

/// Sparse user x item rating store
#[derive(Debug, Clone, Default)]
pub struct RatingMatrix {
    ratings: Vec<Rating>,
    /// All ratings made by each user
    user_ratings: HashMap<UserId, Vec<Rating>>,
    /// All ratings received by each item
    item_ratings: HashMap<ItemId, Vec<Rating>>,
    /// Membership set backing `has_rated`
    user_items: HashMap<UserId, HashSet<ItemId>>,
}

impl RatingMatrix {
    /// Build both groupings from a rating list in a single pass
    pub fn from_ratings(ratings: Vec<Rating>) -> Self {
        let mut user_ratings: HashMap<UserId, Vec<Rating>> = HashMap::new();
        let mut item_ratings: HashMap<ItemId, Vec<Rating>> = HashMap::new();
        let mut user_items: HashMap<UserId, HashSet<ItemId>> = HashMap::new();

        for rating in &ratings {
            user_ratings.entry(rating.user_id).or_default().push(*rating);
            item_ratings.entry(rating.item_id).or_default().push(*rating);
            user_items
                .entry(rating.user_id)
                .or_default()
                .insert(rating.item_id);
        }

        Self {
            ratings,
            user_ratings,
            item_ratings,
            user_items,
        }
    }

    /// Every rating, in the order it was loaded
    pub fn ratings(&self) -> &[Rating] {
        &self.ratings
    }

    /// All ratings made by a user; empty if the user has none
    pub fn user_ratings(&self, user_id: UserId) -> &[Rating] {
        self.user_ratings
            .get(&user_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// All ratings received by an item; empty if the item has none
    pub fn item_ratings(&self, item_id: ItemId) -> &[Rating] {
        self.item_ratings
            .get(&item_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Has `user_id` rated `item_id`?
    pub fn has_rated(&self, user_id: UserId, item_id: ItemId) -> bool {
        self.user_items
            .get(&user_id)
            .is_some_and(|items| items.contains(&item_id))
    }

    /// Items the user has rated
    pub fn rated_items(&self, user_id: UserId) -> HashSet<ItemId> {
        self.user_items.get(&user_id).cloned().unwrap_or_default()
    }

    /// Users with at least one rating, ascending
    pub fn user_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.user_ratings.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Items with at least one rating, ascending
    pub fn item_ids(&self) -> Vec<ItemId> {
        let mut ids: Vec<ItemId> = self.item_ratings.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }

    /// Mean of all rating values, 0 for an empty matrix
    pub fn global_mean(&self) -> f32 {
        if self.ratings.is_empty() {
            return 0.0;
        }
        let total: f64 = self.ratings.iter().map(|r| r.rating as f64).sum();
        (total / self.ratings.len() as f64) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RatingMatrix {
        RatingMatrix::from_ratings(vec![
            Rating::new(1, 10, 5.0),
            Rating::new(1, 20, 1.0),
            Rating::new(2, 10, 4.0),
            Rating::new(2, 30, 5.0),
        ])
    }

    fn assert_counts_agree(matrix: &RatingMatrix) {
        let by_user: usize = matrix.user_ids().iter().map(|&u| matrix.user_ratings(u).len()).sum();
        let by_item: usize = matrix.item_ids().iter().map(|&i| matrix.item_ratings(i).len()).sum();
        assert_eq!(by_user, matrix.len());
        assert_eq!(by_item, matrix.len());
    }

    #[test]
    fn test_counts_agree() {
        assert_counts_agree(&sample());
        assert_counts_agree(&RatingMatrix::default());
    }

    #[test]
    fn test_counts_agree_on_random_matrices() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        for seed in 0..8u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let users = rng.random_range(1..=50u32);
            let items = rng.random_range(1..=80u32);
            let n = rng.random_range(0..=500usize);
            // Repeated (user, item) pairs are allowed and count twice
            let ratings: Vec<Rating> = (0..n)
                .map(|_| {
                    Rating::new(
                        rng.random_range(1..=users),
                        rng.random_range(1..=items),
                        rng.random_range(1..=5u32) as f32,
                    )
                })
                .collect();
            let matrix = RatingMatrix::from_ratings(ratings);
            assert_eq!(matrix.len(), n);
            assert_counts_agree(&matrix);
        }
    }

    #[test]
    fn test_lookups() {
        let matrix = sample();
        assert!(matrix.has_rated(1, 20));
        assert!(!matrix.has_rated(1, 30));
        assert!(!matrix.has_rated(99, 10));
        assert_eq!(matrix.item_ratings(10).len(), 2);
        assert!(matrix.user_ratings(99).is_empty());
        assert_eq!(matrix.user_ids(), vec![1, 2]);
        assert_eq!(matrix.item_ids(), vec![10, 20, 30]);
    }

    #[test]
    fn test_global_mean() {
        assert_eq!(sample().global_mean(), 3.75);
        assert_eq!(RatingMatrix::default().global_mean(), 0.0);
    }
}
