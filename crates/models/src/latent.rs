//! Latent-factor (two-tower) model trained with per-example SGD.
//!
//! A user vector is the sum of the embedding rows of the user's active
//! tokens, and likewise for items. With `Tower::Ids` every entity has exactly
//! one token (its id); with `Tower::Features` the tokens are side features
//! (genres, decade, age bucket, ...), so items sharing a genre share that
//! part of their embedding and never-rated items still get a vector.
//!
//! ## Training
//! - label y = 1 if rating >= threshold else 0
//! - p = sigmoid(u . v), logistic loss
//! - g = p - y, then for every active user row w: w -= lr * (g * v + decay * w)
//!   and for every active item row w: w -= lr * (g * u + decay * w)
//!
//! Everything random (initialization, the optional example cap, the
//! per-epoch order) is drawn from one `Mulberry32` seeded from the config.

use crate::error::{ModelError, Result};
use crate::rng::Mulberry32;
use crate::traits::{FeatureSource, Scorer};
use data_loader::{Dataset, ItemId, RatingMatrix, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::ops::ControlFlow;
use tracing::{debug, info, instrument};

/// How an entity's embedding is composed from token embeddings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tower {
    /// One embedding per raw id
    #[default]
    Ids,
    /// Sum of side-feature embeddings; featureless entities fall back to their id
    Features,
    /// Id embedding plus side-feature embeddings
    IdsAndFeatures,
}

impl Tower {
    fn tokens(&self, id_token: String, features: Vec<String>) -> Vec<String> {
        match self {
            Tower::Ids => vec![id_token],
            Tower::Features if features.is_empty() => vec![id_token],
            Tower::Features => features,
            Tower::IdsAndFeatures => {
                let mut tokens = vec![id_token];
                tokens.extend(features);
                tokens
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatentConfig {
    /// Embedding dimension K
    pub dim: usize,
    pub epochs: usize,
    pub learning_rate: f32,
    pub weight_decay: f32,
    /// Ratings at or above this are positives
    pub threshold: f32,
    /// Train on a shuffled sample of at most this many ratings
    pub max_examples: Option<usize>,
    pub seed: u32,
    /// Initial weights are uniform in [-init_scale, init_scale)
    pub init_scale: f32,
    pub tower: Tower,
}

impl Default for LatentConfig {
    fn default() -> Self {
        Self {
            dim: 16,
            epochs: 10,
            learning_rate: 0.05,
            weight_decay: 1e-4,
            threshold: 4.0,
            max_examples: None,
            seed: 42,
            init_scale: 0.1,
            tower: Tower::Ids,
        }
    }
}

impl LatentConfig {
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = dim;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_max_examples(mut self, max_examples: usize) -> Self {
        self.max_examples = Some(max_examples);
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_tower(mut self, tower: Tower) -> Self {
        self.tower = tower;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.dim == 0 {
            return Err(ModelError::invalid("dim", self.dim));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(ModelError::invalid("learning_rate", self.learning_rate));
        }
        if !self.weight_decay.is_finite() || self.weight_decay < 0.0 {
            return Err(ModelError::invalid("weight_decay", self.weight_decay));
        }
        if !self.init_scale.is_finite() || self.init_scale < 0.0 {
            return Err(ModelError::invalid("init_scale", self.init_scale));
        }
        Ok(())
    }
}

/// Reported after every committed epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based
    pub epoch: usize,
    pub mean_loss: f32,
    pub examples: usize,
}

/// Users and items the model should have vectors for.
///
/// Ids from the training matrix are always included; these lists add
/// entities that have no training ratings (e.g. the rest of the catalog).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entities {
    pub users: Vec<UserId>,
    pub items: Vec<ItemId>,
}

impl Entities {
    pub fn from_dataset(dataset: &Dataset) -> Self {
        Self {
            users: dataset.user_ids(),
            items: dataset.catalog(),
        }
    }
}

/// Row-major `rows x dim` weight table
#[derive(Debug, Clone, PartialEq)]
struct EmbeddingTable {
    dim: usize,
    weights: Vec<f32>,
}

impl EmbeddingTable {
    fn random(rows: usize, dim: usize, scale: f32, rng: &mut Mulberry32) -> Self {
        let weights = (0..rows * dim).map(|_| rng.uniform(-scale, scale)).collect();
        Self { dim, weights }
    }

    fn row(&self, row: usize) -> &[f32] {
        &self.weights[row * self.dim..(row + 1) * self.dim]
    }

    fn row_mut(&mut self, row: usize) -> &mut [f32] {
        &mut self.weights[row * self.dim..(row + 1) * self.dim]
    }

    /// out = sum of the given rows
    fn sum_rows(&self, rows: &[usize], out: &mut [f32]) {
        out.fill(0.0);
        for &row in rows {
            for (acc, w) in out.iter_mut().zip(self.row(row)) {
                *acc += w;
            }
        }
    }

    /// w -= lr * (g * other + decay * w) for every given row
    fn step(&mut self, rows: &[usize], g: f32, other: &[f32], lr: f32, decay: f32) {
        for &row in rows {
            for (w, o) in self.row_mut(row).iter_mut().zip(other) {
                *w -= lr * (g * o + decay * *w);
            }
        }
    }
}

/// Token vocabulary plus each entity's active token rows
#[derive(Debug, Clone, Default)]
struct Side<K> {
    token_index: HashMap<String, usize>,
    rows: HashMap<K, Vec<usize>>,
}

impl<K: std::hash::Hash + Eq + Copy> Side<K> {
    fn add(&mut self, key: K, tokens: Vec<String>) {
        let mut rows: Vec<usize> = Vec::with_capacity(tokens.len());
        for token in tokens {
            let next = self.token_index.len();
            let row = *self.token_index.entry(token).or_insert(next);
            if !rows.contains(&row) {
                rows.push(row);
            }
        }
        self.rows.insert(key, rows);
    }

    fn vocab_len(&self) -> usize {
        self.token_index.len()
    }
}

#[derive(Debug, Clone, Copy)]
struct Example {
    user: UserId,
    item: ItemId,
    label: f32,
}

/// Fits a `LatentModel`
#[derive(Debug, Clone, Default)]
pub struct LatentTrainer {
    config: LatentConfig,
}

impl LatentTrainer {
    pub fn new(config: LatentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LatentConfig {
        &self.config
    }

    /// Train for the configured number of epochs
    pub fn fit<F: FeatureSource + ?Sized>(
        &self,
        matrix: &RatingMatrix,
        features: &F,
        entities: &Entities,
    ) -> Result<LatentModel> {
        self.fit_with_progress(matrix, features, entities, |_| ControlFlow::Continue(()))
    }

    /// Train, calling `on_epoch` after every epoch.
    ///
    /// Returning `ControlFlow::Break` stops training; the model returned is
    /// the state at the end of that last completed epoch.
    #[instrument(skip_all, fields(ratings = matrix.len(), dim = self.config.dim, epochs = self.config.epochs))]
    pub fn fit_with_progress<F, C>(
        &self,
        matrix: &RatingMatrix,
        features: &F,
        entities: &Entities,
        mut on_epoch: C,
    ) -> Result<LatentModel>
    where
        F: FeatureSource + ?Sized,
        C: FnMut(&EpochStats) -> ControlFlow<()>,
    {
        let config = &self.config;
        config.validate()?;

        let mut rng = Mulberry32::new(config.seed);

        // Deterministic entity order: ascending ids
        let user_ids: BTreeSet<UserId> = matrix
            .user_ids()
            .into_iter()
            .chain(entities.users.iter().copied())
            .collect();
        let item_ids: BTreeSet<ItemId> = matrix
            .item_ids()
            .into_iter()
            .chain(entities.items.iter().copied())
            .collect();

        let mut users: Side<UserId> = Side::default();
        for &user_id in &user_ids {
            let tokens = config
                .tower
                .tokens(format!("user:{}", user_id), features.user_features(user_id));
            users.add(user_id, tokens);
        }
        let mut items: Side<ItemId> = Side::default();
        for &item_id in &item_ids {
            let tokens = config
                .tower
                .tokens(format!("item:{}", item_id), features.item_features(item_id));
            items.add(item_id, tokens);
        }

        let dim = config.dim;
        let mut user_table = EmbeddingTable::random(users.vocab_len(), dim, config.init_scale, &mut rng);
        let mut item_table = EmbeddingTable::random(items.vocab_len(), dim, config.init_scale, &mut rng);

        let mut examples: Vec<Example> = matrix
            .ratings()
            .iter()
            .map(|r| Example {
                user: r.user_id,
                item: r.item_id,
                label: if r.rating >= config.threshold { 1.0 } else { 0.0 },
            })
            .collect();
        if let Some(cap) = config.max_examples {
            if examples.len() > cap {
                rng.shuffle(&mut examples);
                examples.truncate(cap);
            }
        }

        info!(
            users = user_ids.len(),
            items = item_ids.len(),
            user_tokens = users.vocab_len(),
            item_tokens = items.vocab_len(),
            examples = examples.len(),
            "Training latent-factor model"
        );

        let mut u = vec![0.0f32; dim];
        let mut v = vec![0.0f32; dim];
        let mut history: Vec<EpochStats> = Vec::with_capacity(config.epochs);

        for epoch in 1..=config.epochs {
            rng.shuffle(&mut examples);

            let mut total_loss = 0.0f64;
            for example in &examples {
                let user_rows = &users.rows[&example.user];
                let item_rows = &items.rows[&example.item];

                user_table.sum_rows(user_rows, &mut u);
                item_table.sum_rows(item_rows, &mut v);

                let p = sigmoid(dot(&u, &v));
                total_loss += log_loss(p, example.label) as f64;
                let g = p - example.label;

                user_table.step(user_rows, g, &v, config.learning_rate, config.weight_decay);
                item_table.step(item_rows, g, &u, config.learning_rate, config.weight_decay);
            }

            let stats = EpochStats {
                epoch,
                mean_loss: if examples.is_empty() {
                    0.0
                } else {
                    (total_loss / examples.len() as f64) as f32
                },
                examples: examples.len(),
            };
            debug!(epoch, mean_loss = stats.mean_loss, "epoch complete");
            history.push(stats);

            if on_epoch(&stats).is_break() {
                info!(epoch, "Training stopped by caller");
                break;
            }
        }

        Ok(LatentModel {
            dim,
            user_table,
            item_table,
            user_rows: users.rows,
            item_rows: items.rows,
            history,
        })
    }
}

/// A trained, read-only latent-factor model
#[derive(Debug, Clone)]
pub struct LatentModel {
    dim: usize,
    user_table: EmbeddingTable,
    item_table: EmbeddingTable,
    user_rows: HashMap<UserId, Vec<usize>>,
    item_rows: HashMap<ItemId, Vec<usize>>,
    history: Vec<EpochStats>,
}

impl LatentModel {
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn user_embedding(&self, user_id: UserId) -> Option<Vec<f32>> {
        let rows = self.user_rows.get(&user_id)?;
        let mut out = vec![0.0; self.dim];
        self.user_table.sum_rows(rows, &mut out);
        Some(out)
    }

    pub fn item_embedding(&self, item_id: ItemId) -> Option<Vec<f32>> {
        let rows = self.item_rows.get(&item_id)?;
        let mut out = vec![0.0; self.dim];
        self.item_table.sum_rows(rows, &mut out);
        Some(out)
    }

    /// sigmoid(user . item); an unknown user or item scores 0.5
    pub fn score(&self, user_id: UserId, item_id: ItemId) -> f32 {
        match (self.user_embedding(user_id), self.item_embedding(item_id)) {
            (Some(u), Some(v)) => sigmoid(dot(&u, &v)),
            _ => 0.5,
        }
    }

    pub fn epochs_completed(&self) -> usize {
        self.history.len()
    }

    pub fn history(&self) -> &[EpochStats] {
        &self.history
    }
}

impl Scorer for LatentModel {
    fn name(&self) -> &str {
        "latent"
    }

    fn score(&self, user_id: UserId, item_id: ItemId) -> f32 {
        LatentModel::score(self, user_id, item_id)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sigmoid(z: f32) -> f32 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

fn log_loss(p: f32, label: f32) -> f32 {
    const EPS: f32 = 1e-7;
    let p = p.clamp(EPS, 1.0 - EPS);
    -(label * p.ln() + (1.0 - label) * (1.0 - p).ln())
}
