//! Candidate and user-context types shared by filters and the ranker.

use data_loader::{ItemId, RatingMatrix, UserId};
use std::collections::HashSet;

/// An item under consideration for one user
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub item_id: ItemId,
    /// Model score; 0.0 until the candidate has been scored
    pub score: f32,
}

impl Candidate {
    pub fn new(item_id: ItemId) -> Self {
        Self { item_id, score: 0.0 }
    }

    pub fn scored(item_id: ItemId, score: f32) -> Self {
        Self { item_id, score }
    }
}

/// What filters need to know about the user being served
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: UserId,
    pub rated_items: HashSet<ItemId>,
}

impl UserContext {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            rated_items: HashSet::new(),
        }
    }

    /// Context whose history is everything the user rated in `matrix`
    pub fn from_matrix(matrix: &RatingMatrix, user_id: UserId) -> Self {
        Self {
            user_id,
            rated_items: matrix.rated_items(user_id),
        }
    }
}
