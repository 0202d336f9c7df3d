//! # Data Loader Crate
//!
//! Loads MovieLens-style rating datasets into typed, indexed, in-memory
//! tables.
//!
//! ## Main Components
//!
//! - **types**: Core domain types (User, Item, Rating, GenreTable)
//! - **parser**: Lenient line parsers (ratings, items, users, genres, audio
//!   tracks); bad rows are skipped, never fatal
//! - **matrix**: The rating matrix, indexed by user and by item
//! - **dataset**: Assembles everything and owns the secondary indices
//! - **error**: Error types for data loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::{Dataset, DatasetLayout};
//! use std::path::Path;
//!
//! let dataset = Dataset::load_from_files(Path::new("data/ml-100k"), &DatasetLayout::default())?;
//!
//! let item = dataset.get_item(1).unwrap();
//! let ratings = dataset.matrix().user_ratings(1);
//! println!("User 1 rated {} items, e.g. {}", ratings.len(), item.title);
//! ```

// Public modules
pub mod dataset;
pub mod error;
pub mod matrix;
pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use dataset::{DataSources, Dataset, DatasetLayout};
pub use error::{DataLoadError, Result};
pub use matrix::RatingMatrix;
pub use types::{
    // Type aliases
    ItemId,
    UserId,
    // Core types
    GenreTable,
    Item,
    ItemStats,
    LoadReport,
    Rating,
    User,
    // Enums
    AgeGroup,
    Gender,
    // Audio features
    audio_feature_range,
    AUDIO_FEATURE_NAMES,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_dataset() {
        let dataset = Dataset::from_parts(vec![], vec![], vec![]);
        let (users, items, ratings) = dataset.counts();

        assert_eq!(users, 0);
        assert_eq!(items, 0);
        assert_eq!(ratings, 0);
        assert!(dataset.catalog().is_empty());
    }

    #[test]
    fn test_from_parts_synthesizes_users() {
        let dataset = Dataset::from_parts(
            vec![],
            vec![Item::new(1193, "One Flew Over the Cuckoo's Nest").with_year(1975)],
            vec![Rating::new(1, 1193, 5.0)],
        );

        let user = dataset.get_user(1).unwrap();
        assert!(user.feature_tokens().is_empty());
        assert_eq!(dataset.matrix().user_ratings(1).len(), 1);
        assert_eq!(dataset.matrix().item_ratings(1193)[0].rating, 5.0);
    }

    #[test]
    fn test_empty_queries() {
        let dataset = Dataset::from_parts(vec![], vec![], vec![]);

        assert!(dataset.get_user(999).is_none());
        assert!(dataset.get_item(999).is_none());
        assert!(dataset.matrix().user_ratings(999).is_empty());
        assert!(dataset.matrix().item_ratings(999).is_empty());
        assert!(dataset.get_items_by_genre("Action").is_empty());
    }
}
