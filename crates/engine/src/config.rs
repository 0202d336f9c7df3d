//! Engine configuration.
//!
//! Every field has a default, so a JSON file only needs the keys it wants
//! to override:
//!
//! ```json
//! { "seed": 7, "latent": { "dim": 32, "tower": "ids_and_features" } }
//! ```

use data_loader::DatasetLayout;
use models::{BaselineConfig, LatentConfig};
use pipeline::EvalConfig;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub layout: DatasetLayout,
    /// Give up on the initial file read after this long
    pub load_timeout_secs: u64,
    pub baseline: BaselineConfig,
    pub latent: LatentConfig,
    pub evaluation: EvalConfig,
    /// Share of each user's ratings held out for evaluation
    pub validation_fraction: f64,
    /// Seed for the train/validation split
    pub seed: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            layout: DatasetLayout::default(),
            load_timeout_secs: 30,
            baseline: BaselineConfig::default(),
            latent: LatentConfig::default(),
            evaluation: EvalConfig::default(),
            validation_fraction: 0.2,
            seed: 42,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Seed both the split and the latent trainer
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self.latent.seed = seed;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.latent.epochs = epochs;
        self
    }

    pub fn with_validation_fraction(mut self, fraction: f64) -> Self {
        self.validation_fraction = fraction;
        self
    }

    /// Rating at or above which an interaction counts as positive, both for
    /// latent training labels and for evaluation
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.latent.threshold = threshold;
        self.evaluation.threshold = threshold;
        self
    }

    /// Reject settings that would make training and evaluation disagree
    pub fn validate(&self) -> Result<()> {
        if self.latent.threshold != self.evaluation.threshold {
            return Err(EngineError::InvalidConfig(format!(
                "latent.threshold ({}) must equal evaluation.threshold ({})",
                self.latent.threshold, self.evaluation.threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.validation_fraction) {
            return Err(EngineError::InvalidConfig(format!(
                "validation_fraction must be within [0, 1], got {}",
                self.validation_fraction
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::Tower;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            EngineConfig::from_json(r#"{ "seed": 7, "latent": { "dim": 32, "tower": "ids_and_features" } }"#)
                .unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.latent.dim, 32);
        assert_eq!(config.latent.tower, Tower::IdsAndFeatures);
        assert_eq!(config.latent.epochs, LatentConfig::default().epochs);
        assert_eq!(config.layout.ratings_file, "u.data");
        assert_eq!(config.validation_fraction, 0.2);
    }

    #[test]
    fn test_rejects_unknown_tower() {
        assert!(EngineConfig::from_json(r#"{ "latent": { "tower": "pixels" } }"#).is_err());
    }

    #[test]
    fn test_thresholds_must_agree() {
        assert!(EngineConfig::default().validate().is_ok());

        let config = EngineConfig::from_json(r#"{ "latent": { "threshold": 3.0 } }"#).unwrap();
        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));

        let config = config.with_threshold(3.5);
        assert_eq!(config.latent.threshold, 3.5);
        assert_eq!(config.evaluation.threshold, 3.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_fraction() {
        let config = EngineConfig::default().with_validation_fraction(1.5);
        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_with_seed_sets_both_seeds() {
        let config = EngineConfig::default().with_seed(9);
        assert_eq!(config.seed, 9);
        assert_eq!(config.latent.seed, 9);
    }
}
