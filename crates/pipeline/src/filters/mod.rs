//! Concrete filters that can be composed into a FilterPipeline.

pub mod already_rated;
pub mod minimum_score;

pub use already_rated::AlreadyRatedFilter;
pub use minimum_score::MinimumScoreFilter;
