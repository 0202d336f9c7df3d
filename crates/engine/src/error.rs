//! Error types for the recommendation engine.

use data_loader::{DataLoadError, ItemId, UserId};
use models::ModelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Scoring or evaluation was requested before `train` committed a snapshot
    #[error("Model not ready: call train() first")]
    ModelNotReady,

    #[error("Failed to load dataset: {0}")]
    Load(#[from] DataLoadError),

    #[error("Invalid model configuration: {0}")]
    Model(#[from] ModelError),

    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown user: {0}")]
    UnknownUser(UserId),

    #[error("Unknown item: {0}")]
    UnknownItem(ItemId),

    /// The blocking load task panicked or was cancelled
    #[error("Background task failed: {0}")]
    TaskFailed(String),

    /// Ranking or evaluation failed inside the filter pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
