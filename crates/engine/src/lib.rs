//! Engine crate for the recommendation workspace.
//!
//! The engine owns the loaded dataset and the trained model snapshot, and
//! is the only place that touches the async runtime (for the initial file
//! load). Everything the CLI shows goes through it.

pub mod config;
pub mod error;
pub mod orchestrator;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use orchestrator::{
    ItemSummary, ModelKind, Recommendation, RecommendationEngine, TrainingSummary, UserProfile,
};
