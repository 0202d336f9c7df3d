//! # Models Crate
//!
//! Rating-prediction models fitted on a `RatingMatrix`.
//!
//! ## Components
//!
//! ### Bias Baseline
//! `mean + user_bias + item_bias`, fitted by alternating regularized least
//! squares. Scores are on the rating scale.
//!
//! ### Latent-Factor Model
//! Two-tower embeddings trained with per-example SGD on a logistic loss.
//! Towers are composed from id tokens, side-feature tokens, or both.
//! Scores are probabilities.
//!
//! ### Content Similarity
//! Cosine similarity between standardized item feature vectors and a user's
//! mean taste profile.
//!
//! All randomness goes through `Mulberry32`, so a seed fully determines a
//! trained model.
//!
//! ## Example Usage
//!
//! ```ignore
//! use models::{BaselineConfig, BiasBaseline, Entities, LatentConfig, LatentTrainer, NoFeatures};
//!
//! let baseline = BiasBaseline::fit(dataset.matrix(), &BaselineConfig::default())?;
//! let latent = LatentTrainer::new(LatentConfig::default().with_seed(7))
//!     .fit(dataset.matrix(), &NoFeatures, &Entities::from_dataset(&dataset))?;
//!
//! println!("{} vs {}", baseline.predict(1, 50), latent.score(1, 50));
//! ```

pub mod baseline;
pub mod content;
pub mod error;
pub mod latent;
pub mod rng;
pub mod traits;

pub use baseline::{BaselineConfig, BiasBaseline};
pub use content::{cosine_similarity, ContentIndex, ProfileScorer};
pub use error::{ModelError, Result};
pub use latent::{Entities, EpochStats, LatentConfig, LatentModel, LatentTrainer, Tower};
pub use rng::Mulberry32;
pub use traits::{FeatureSource, NoFeatures, ScoredItem, Scorer};
