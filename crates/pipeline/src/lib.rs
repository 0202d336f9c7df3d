//! Ranking and offline evaluation on top of trained models.
//!
//! This crate provides:
//! - Filter trait and implementations for candidate filtering
//! - FilterPipeline for composing filters
//! - Recommender: top-K unseen items for a user under any `Scorer`
//! - Evaluator: seeded holdout split, precision@K, recall@K, accuracy
//!
//! ## Architecture
//! The ranker processes candidates in stages:
//! 1. Every catalog item becomes a candidate
//! 2. Filters remove unwanted candidates (already rated)
//! 3. The scorer scores the survivors; score filters may drop weak ones
//! 4. Candidates are sorted and cut to K
//!
//! ## Example Usage
//! ```ignore
//! use pipeline::{Recommender, UserContext};
//!
//! let ranker = Recommender::new(dataset.catalog());
//! let context = UserContext::from_matrix(dataset.matrix(), 1);
//! let top = ranker.recommend(&context, &baseline, 10)?;
//! ```

pub mod evaluation;
pub mod filter_pipeline;
pub mod filters;
pub mod ranker;
pub mod traits;
pub mod types;

// Re-export main types
pub use evaluation::{split_train_validation, EvalConfig, EvaluationReport, Evaluator, Split};
pub use filter_pipeline::FilterPipeline;
pub use ranker::Recommender;
pub use traits::Filter;
pub use types::{Candidate, UserContext};
