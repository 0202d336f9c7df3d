//! # Recommendation Engine
//!
//! Owns one loaded dataset and, after `train`, one trained snapshot:
//! 1. Load the dataset on a blocking task, under a timeout
//! 2. Split ratings into train/validation with the configured seed
//! 3. Fit the bias baseline and the latent-factor model on the train split
//! 4. Build the content scorer from the same split
//! 5. Commit all of it as one snapshot
//!
//! Serving (`recommend`) and evaluation read the snapshot only. A second
//! `train` builds a fresh snapshot and swaps it in whole, so nothing ever
//! sees a half-trained model.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use data_loader::{DataLoadError, Dataset, Item, ItemId, LoadReport, User, UserId};
use models::{
    BiasBaseline, ContentIndex, Entities, EpochStats, LatentModel, LatentTrainer, Mulberry32,
    ProfileScorer, ScoredItem, Scorer,
};
use pipeline::{split_train_validation, EvaluationReport, Evaluator, Recommender, Split, UserContext};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Which trained scorer to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Baseline,
    Latent,
    Content,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::Baseline, ModelKind::Latent, ModelKind::Content];
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelKind::Baseline => "baseline",
            ModelKind::Latent => "latent",
            ModelKind::Content => "content",
        };
        f.write_str(name)
    }
}

/// A ranked item with display metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub item_id: ItemId,
    pub title: String,
    pub year: Option<u16>,
    pub genres: Vec<String>,
    pub score: f32,
}

/// Catalog entry returned by search and browse
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSummary {
    pub item_id: ItemId,
    pub title: String,
    pub year: Option<u16>,
    pub genres: Vec<String>,
    pub avg_rating: f32,
    pub rating_count: u32,
}

/// What the dataset knows about one user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub demographics: Option<User>,
    pub ratings_count: usize,
    pub mean_rating: f32,
    /// Genres of the user's rated items, most frequent first
    pub top_genres: Vec<(String, usize)>,
    /// Highest-rated items first
    pub top_rated: Vec<(ItemId, f32)>,
}

/// Outcome of one `train` call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingSummary {
    pub train_size: usize,
    pub validation_size: usize,
    pub epochs_completed: usize,
    pub final_loss: Option<f32>,
    pub elapsed_ms: u128,
}

/// Everything produced by one training run
struct Snapshot {
    split: Split,
    baseline: BiasBaseline,
    latent: LatentModel,
    content: ProfileScorer,
}

impl Snapshot {
    fn scorer(&self, kind: ModelKind) -> &dyn Scorer {
        match kind {
            ModelKind::Baseline => &self.baseline,
            ModelKind::Latent => &self.latent,
            ModelKind::Content => &self.content,
        }
    }
}

/// Main engine that ties loading, training, serving and evaluation together
pub struct RecommendationEngine {
    dataset: Arc<Dataset>,
    config: EngineConfig,
    ranker: Recommender,
    content_index: ContentIndex,
    snapshot: Option<Arc<Snapshot>>,
}

impl RecommendationEngine {
    /// Load a dataset directory.
    ///
    /// The read runs on tokio's blocking pool and is abandoned after
    /// `load_timeout_secs`; a timeout is reported as `ResourceUnavailable`.
    #[instrument(skip(config))]
    pub async fn load(data_dir: PathBuf, config: EngineConfig) -> Result<Self> {
        let start = Instant::now();
        let timeout = Duration::from_secs(config.load_timeout_secs);

        let task = tokio::task::spawn_blocking({
            let dir = data_dir.clone();
            let layout = config.layout.clone();
            move || Dataset::load_from_files(&dir, &layout)
        });

        let dataset = match tokio::time::timeout(timeout, task).await {
            Err(_) => {
                warn!(timeout_secs = config.load_timeout_secs, "Dataset load timed out");
                return Err(DataLoadError::ResourceUnavailable {
                    path: data_dir.display().to_string(),
                    reason: format!("load timed out after {}s", config.load_timeout_secs),
                }
                .into());
            }
            Ok(Err(join_err)) => return Err(EngineError::TaskFailed(join_err.to_string())),
            Ok(Ok(loaded)) => loaded?,
        };

        info!(elapsed = ?start.elapsed(), "Dataset ready");
        Ok(Self::from_dataset(dataset, config))
    }

    /// Wrap an already-built dataset (no I/O)
    pub fn from_dataset(dataset: Dataset, config: EngineConfig) -> Self {
        let ranker = Recommender::new(dataset.catalog());
        let content_index = ContentIndex::from_dataset(&dataset);
        Self {
            dataset: Arc::new(dataset),
            config,
            ranker,
            content_index,
            snapshot: None,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn load_report(&self) -> &LoadReport {
        self.dataset.report()
    }

    pub fn is_trained(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Split, fit every model, and commit the result.
    ///
    /// `on_epoch` sees each latent-factor epoch; returning `Break` ends that
    /// training early and the snapshot keeps the last completed epoch.
    #[instrument(skip_all)]
    pub fn train<C>(&mut self, on_epoch: C) -> Result<TrainingSummary>
    where
        C: FnMut(&EpochStats) -> ControlFlow<()>,
    {
        self.config.validate()?;
        let start = Instant::now();
        let dataset: &Dataset = &self.dataset;

        let mut rng = Mulberry32::new(self.config.seed);
        let split = split_train_validation(dataset.matrix(), self.config.validation_fraction, &mut rng);

        info!("Fitting bias baseline");
        let baseline = BiasBaseline::fit(&split.train, &self.config.baseline)?;

        info!("Training latent-factor model");
        let latent = LatentTrainer::new(self.config.latent.clone()).fit_with_progress(
            &split.train,
            dataset,
            &Entities::from_dataset(dataset),
            on_epoch,
        )?;

        let content = ProfileScorer::new(
            self.content_index.clone(),
            &split.train,
            self.config.evaluation.threshold,
        );

        let summary = TrainingSummary {
            train_size: split.train.len(),
            validation_size: split.validation.len(),
            epochs_completed: latent.epochs_completed(),
            final_loss: latent.history().last().map(|s| s.mean_loss),
            elapsed_ms: start.elapsed().as_millis(),
        };

        self.snapshot = Some(Arc::new(Snapshot {
            split,
            baseline,
            latent,
            content,
        }));
        info!(
            epochs = summary.epochs_completed,
            elapsed_ms = summary.elapsed_ms,
            "Training complete, snapshot committed"
        );
        Ok(summary)
    }

    fn snapshot(&self) -> Result<&Snapshot> {
        self.snapshot.as_deref().ok_or(EngineError::ModelNotReady)
    }

    fn ensure_user(&self, user_id: UserId) -> Result<()> {
        if self.dataset.get_user(user_id).is_some() || !self.dataset.matrix().user_ratings(user_id).is_empty() {
            Ok(())
        } else {
            Err(EngineError::UnknownUser(user_id))
        }
    }

    /// Top `limit` items the user has not rated anywhere in the dataset
    #[instrument(skip(self))]
    pub fn recommend(&self, user_id: UserId, limit: usize, kind: ModelKind) -> Result<Vec<Recommendation>> {
        let snapshot = self.snapshot()?;
        self.ensure_user(user_id)?;

        let context = UserContext::from_matrix(self.dataset.matrix(), user_id);
        let scored = self.ranker.recommend(&context, snapshot.scorer(kind), limit)?;
        Ok(scored.into_iter().map(|s| self.describe(s)).collect())
    }

    /// Raw score of one (user, item) pair
    pub fn score(&self, user_id: UserId, item_id: ItemId, kind: ModelKind) -> Result<f32> {
        Ok(self.snapshot()?.scorer(kind).score(user_id, item_id))
    }

    /// Evaluate one model on the held-out split
    pub fn evaluate(&self, kind: ModelKind) -> Result<EvaluationReport> {
        let snapshot = self.snapshot()?;
        let evaluator = Evaluator::new(self.config.evaluation);
        Ok(evaluator.evaluate(&snapshot.split, &self.ranker, snapshot.scorer(kind))?)
    }

    /// Evaluate every model
    pub fn evaluate_all(&self) -> Result<Vec<(ModelKind, EvaluationReport)>> {
        ModelKind::ALL
            .iter()
            .map(|&kind| Ok((kind, self.evaluate(kind)?)))
            .collect()
    }

    /// Content neighbours of an item; needs no training
    pub fn similar_items(&self, item_id: ItemId, limit: usize) -> Result<Vec<Recommendation>> {
        if !self.content_index.contains(item_id) {
            return Err(EngineError::UnknownItem(item_id));
        }
        Ok(self
            .content_index
            .similar_items(item_id, limit)
            .into_iter()
            .map(|s| self.describe(s))
            .collect())
    }

    /// Content recommendations from a user's profile after named feature shifts.
    ///
    /// A known user with no training-split ratings gets a profile built from
    /// all of their ratings (zeros when they have none).
    pub fn recommend_adjusted(
        &self,
        user_id: UserId,
        adjustments: &[(&str, f32)],
        limit: usize,
    ) -> Result<Vec<Recommendation>> {
        let snapshot = self.snapshot()?;
        self.ensure_user(user_id)?;
        let adjusted = match snapshot.content.profile(user_id) {
            Some(profile) => self.content_index.adjust(profile, adjustments),
            None => {
                let profile = self
                    .content_index
                    .taste_profile(self.dataset.matrix().user_ratings(user_id), self.config.evaluation.threshold);
                self.content_index.adjust(&profile, adjustments)
            }
        };
        let exclude: HashSet<ItemId> = self.dataset.matrix().rated_items(user_id);
        Ok(self
            .content_index
            .recommend(&adjusted, limit, &exclude)
            .into_iter()
            .map(|s| self.describe(s))
            .collect())
    }

    pub fn user_profile(&self, user_id: UserId) -> Result<UserProfile> {
        self.ensure_user(user_id)?;
        let ratings = self.dataset.matrix().user_ratings(user_id);

        let mean_rating = if ratings.is_empty() {
            0.0
        } else {
            ratings.iter().map(|r| r.rating).sum::<f32>() / ratings.len() as f32
        };

        let mut genre_counts: HashMap<&str, usize> = HashMap::new();
        for rating in ratings {
            if let Some(item) = self.dataset.get_item(rating.item_id) {
                for genre in &item.genres {
                    *genre_counts.entry(genre.as_str()).or_insert(0) += 1;
                }
            }
        }
        let mut top_genres: Vec<(String, usize)> = genre_counts
            .into_iter()
            .map(|(genre, count)| (genre.to_string(), count))
            .collect();
        top_genres.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_genres.truncate(5);

        let mut top_rated: Vec<(ItemId, f32)> = ratings.iter().map(|r| (r.item_id, r.rating)).collect();
        top_rated.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_rated.truncate(10);

        Ok(UserProfile {
            user_id,
            demographics: self.dataset.get_user(user_id).cloned(),
            ratings_count: ratings.len(),
            mean_rating,
            top_genres,
            top_rated,
        })
    }

    /// Case-insensitive title search
    pub fn search(&self, query: &str, limit: usize) -> Vec<ItemSummary> {
        self.dataset
            .search_titles(query)
            .into_iter()
            .take(limit)
            .map(|item| self.summarize(item))
            .collect()
    }

    /// Items matching an optional genre and an optional inclusive year range,
    /// ordered by popularity
    pub fn browse(&self, genre: Option<&str>, years: Option<(u16, u16)>, limit: usize) -> Vec<ItemSummary> {
        let by_genre: Option<HashSet<ItemId>> =
            genre.map(|g| self.dataset.get_items_by_genre(g).iter().copied().collect());
        let by_year: Option<HashSet<ItemId>> =
            years.map(|(start, end)| self.dataset.get_items_in_year_range(start, end).into_iter().collect());

        let mut items: Vec<&Item> = self
            .dataset
            .items()
            .into_iter()
            .filter(|item| by_genre.as_ref().is_none_or(|ids| ids.contains(&item.id)))
            .filter(|item| by_year.as_ref().is_none_or(|ids| ids.contains(&item.id)))
            .collect();

        let popularity = |id: ItemId| {
            self.dataset
                .get_item_stats(id)
                .map(|s| s.popularity_score)
                .unwrap_or(0.0)
        };
        items.sort_by(|a, b| popularity(b.id).total_cmp(&popularity(a.id)).then_with(|| a.id.cmp(&b.id)));

        items.into_iter().take(limit).map(|item| self.summarize(item)).collect()
    }

    /// Number of catalog items per genre
    pub fn genre_counts(&self) -> BTreeMap<String, usize> {
        self.dataset
            .genre_table()
            .names()
            .into_iter()
            .map(|name| {
                let count = self.dataset.get_items_by_genre(&name).len();
                (name, count)
            })
            .filter(|(_, count)| *count > 0)
            .collect()
    }

    fn describe(&self, scored: ScoredItem) -> Recommendation {
        match self.dataset.get_item(scored.item_id) {
            Some(item) => Recommendation {
                item_id: item.id,
                title: item.title.clone(),
                year: item.year,
                genres: item.genres.clone(),
                score: scored.score,
            },
            None => Recommendation {
                item_id: scored.item_id,
                title: format!("Item #{}", scored.item_id),
                year: None,
                genres: Vec::new(),
                score: scored.score,
            },
        }
    }

    fn summarize(&self, item: &Item) -> ItemSummary {
        let stats = self.dataset.get_item_stats(item.id);
        ItemSummary {
            item_id: item.id,
            title: item.title.clone(),
            year: item.year,
            genres: item.genres.clone(),
            avg_rating: stats.map(|s| s.avg_rating).unwrap_or(0.0),
            rating_count: stats.map(|s| s.rating_count).unwrap_or(0),
        }
    }
}
