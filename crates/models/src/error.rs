//! Error types for model fitting.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// A hyperparameter is outside the range the fitter can work with
    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: &'static str, value: String },
}

impl ModelError {
    pub(crate) fn invalid(field: &'static str, value: impl ToString) -> Self {
        ModelError::InvalidConfig {
            field,
            value: value.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
