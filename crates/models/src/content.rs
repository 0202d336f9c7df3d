//! Content similarity over standardized item feature vectors.
//!
//! Each item gets one feature row: its continuous audio features when the
//! catalog carries them, a genre one-hot otherwise. Columns are z-scored so
//! that no single feature dominates the cosine.

use crate::traits::{ScoredItem, Scorer};
use data_loader::{Dataset, ItemId, Rating, RatingMatrix, UserId};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument};

pub use data_loader::AUDIO_FEATURE_NAMES;

/// Adjusted profile components stay within this many standard deviations
pub const PROFILE_LIMIT: f32 = 3.0;

/// Share of a mood shift passed on to a coupled feature
pub const COUPLING_RATE: f32 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Coupling {
    /// Halve the coupled component
    Soften,
    /// Add `COUPLING_RATE * |delta|`
    Raise,
    /// Subtract `COUPLING_RATE * |delta|`
    Lower,
}

/// (shifted feature, shifted upward, coupled feature, effect)
const COUPLINGS: [(&str, bool, &str, Coupling); 8] = [
    ("acousticness", true, "energy", Coupling::Soften),
    ("acousticness", true, "instrumentalness", Coupling::Raise),
    ("energy", true, "valence", Coupling::Raise),
    ("energy", true, "tempo", Coupling::Raise),
    ("energy", false, "tempo", Coupling::Lower),
    ("valence", true, "energy", Coupling::Raise),
    ("valence", false, "energy", Coupling::Lower),
    ("valence", false, "acousticness", Coupling::Raise),
];

/// Standardized feature rows for every catalog item
#[derive(Debug, Clone)]
pub struct ContentIndex {
    feature_names: Vec<String>,
    /// Ascending item ids; row `r` of `rows` belongs to `item_ids[r]`
    item_ids: Vec<ItemId>,
    rows: Vec<Vec<f32>>,
    positions: HashMap<ItemId, usize>,
}

impl ContentIndex {
    /// Build from item metadata.
    ///
    /// Items without metadata (rated-only ids) get no row and are never
    /// recommended by content. Once any item carries audio features, only
    /// items with a vector of that width are indexed.
    #[instrument(skip_all)]
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let items = dataset.items();

        let audio_width = items
            .iter()
            .find_map(|item| item.audio_features.as_ref())
            .map(|f| f.len())
            .filter(|&width| width > 0);

        let (names, vectors): (Vec<String>, Vec<(ItemId, Vec<f32>)>) = match audio_width {
            Some(width) => {
                let names = if width == AUDIO_FEATURE_NAMES.len() {
                    AUDIO_FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
                } else {
                    (0..width).map(|i| format!("feature_{}", i)).collect()
                };
                let vectors: Vec<(ItemId, Vec<f32>)> = items
                    .iter()
                    .filter_map(|item| Some((item.id, item.audio_features.clone()?)))
                    .filter(|(_, f)| f.len() == width)
                    .collect();
                if vectors.len() < items.len() {
                    debug!(
                        unindexed = items.len() - vectors.len(),
                        "items without audio features left out of the content index"
                    );
                }
                (names, vectors)
            }
            None => {
                let mut names = dataset.genre_table().names();
                // Genres that only appear on items (e.g. from a hand-built dataset)
                for item in &items {
                    for genre in &item.genres {
                        if !names.contains(genre) {
                            names.push(genre.clone());
                        }
                    }
                }
                let column: HashMap<&str, usize> = names
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (name.as_str(), i))
                    .collect();
                let vectors = items
                    .iter()
                    .map(|item| {
                        let mut row = vec![0.0; names.len()];
                        for genre in &item.genres {
                            if let Some(&c) = column.get(genre.as_str()) {
                                row[c] = 1.0;
                            }
                        }
                        (item.id, row)
                    })
                    .collect();
                (names, vectors)
            }
        };

        info!(
            items = vectors.len(),
            features = names.len(),
            audio = audio_width.is_some(),
            "Built content index"
        );
        Self::from_vectors(names, vectors)
    }

    /// Build from raw (unstandardized) feature vectors.
    ///
    /// Rows shorter than `feature_names` are zero-padded; longer rows are
    /// truncated.
    pub fn from_vectors(feature_names: Vec<String>, vectors: Vec<(ItemId, Vec<f32>)>) -> Self {
        let width = feature_names.len();
        let mut vectors = vectors;
        vectors.sort_by_key(|(id, _)| *id);
        vectors.dedup_by_key(|(id, _)| *id);

        let mut rows: Vec<Vec<f32>> = vectors
            .iter()
            .map(|(_, v)| {
                let mut row = v.clone();
                row.resize(width, 0.0);
                row
            })
            .collect();
        standardize(&mut rows, width);

        let item_ids: Vec<ItemId> = vectors.into_iter().map(|(id, _)| id).collect();
        let positions = item_ids.iter().enumerate().map(|(r, &id)| (id, r)).collect();

        Self {
            feature_names,
            item_ids,
            rows,
            positions,
        }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }

    pub fn contains(&self, item_id: ItemId) -> bool {
        self.positions.contains_key(&item_id)
    }

    /// Standardized row for one item
    pub fn vector(&self, item_id: ItemId) -> Option<&[f32]> {
        self.positions.get(&item_id).map(|&r| self.rows[r].as_slice())
    }

    /// Mean standardized vector of the given items; zeros if none are indexed
    pub fn profile(&self, items: &[ItemId]) -> Vec<f32> {
        let mut profile = vec![0.0f32; self.feature_names.len()];
        let mut count = 0usize;
        for row in items.iter().filter_map(|&id| self.vector(id)) {
            for (acc, x) in profile.iter_mut().zip(row) {
                *acc += x;
            }
            count += 1;
        }
        if count > 0 {
            for x in &mut profile {
                *x /= count as f32;
            }
        }
        profile
    }

    /// Profile of one user's ratings: the mean of the items rated at or
    /// above `threshold`, or of everything rated when nothing qualifies
    pub fn taste_profile(&self, ratings: &[Rating], threshold: f32) -> Vec<f32> {
        let liked: Vec<ItemId> = ratings
            .iter()
            .filter(|r| r.rating >= threshold)
            .map(|r| r.item_id)
            .collect();
        if liked.is_empty() {
            let all: Vec<ItemId> = ratings.iter().map(|r| r.item_id).collect();
            self.profile(&all)
        } else {
            self.profile(&liked)
        }
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|n| n == name)
    }

    /// Shift named profile components, clamping to +-PROFILE_LIMIT.
    ///
    /// A shift of acousticness, energy or valence also moves the features
    /// coupled to it (see `COUPLINGS`), unless the caller shifts that
    /// feature directly. Unknown feature names are ignored.
    pub fn adjust(&self, profile: &[f32], adjustments: &[(&str, f32)]) -> Vec<f32> {
        let mut adjusted = profile.to_vec();
        for &(name, delta) in adjustments {
            let Some(c) = self.column(name) else {
                debug!(feature = name, "ignoring unknown feature");
                continue;
            };
            if let Some(x) = adjusted.get_mut(c) {
                *x = (*x + delta).clamp(-PROFILE_LIMIT, PROFILE_LIMIT);
            }
        }

        let shifted_directly = |feature: &str| {
            adjustments
                .iter()
                .any(|&(name, delta)| name == feature && delta != 0.0)
        };
        for &(name, delta) in adjustments {
            if delta == 0.0 {
                continue;
            }
            for &(source, upward, coupled, effect) in &COUPLINGS {
                if source != name || upward != (delta > 0.0) || shifted_directly(coupled) {
                    continue;
                }
                let Some(x) = self.column(coupled).and_then(|c| adjusted.get_mut(c)) else {
                    continue;
                };
                let step = COUPLING_RATE * delta.abs();
                *x = match effect {
                    Coupling::Soften => *x * 0.5,
                    Coupling::Raise => (*x + step).clamp(-PROFILE_LIMIT, PROFILE_LIMIT),
                    Coupling::Lower => (*x - step).clamp(-PROFILE_LIMIT, PROFILE_LIMIT),
                };
            }
        }
        adjusted
    }

    /// Items most similar to `profile`, best first.
    ///
    /// Excluded ids and items with similarity <= 0 are dropped; ties go to
    /// the lower id.
    pub fn recommend(&self, profile: &[f32], k: usize, exclude: &HashSet<ItemId>) -> Vec<ScoredItem> {
        let mut scored: Vec<ScoredItem> = self
            .item_ids
            .iter()
            .zip(&self.rows)
            .filter(|(id, _)| !exclude.contains(id))
            .map(|(&id, row)| ScoredItem::new(id, cosine_similarity(profile, row)))
            .filter(|s| s.score > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
        scored.truncate(k);
        scored
    }

    /// Nearest neighbours of one item, excluding the item itself
    pub fn similar_items(&self, item_id: ItemId, k: usize) -> Vec<ScoredItem> {
        let Some(row) = self.vector(item_id) else {
            return Vec::new();
        };
        let exclude = HashSet::from([item_id]);
        self.recommend(row, k, &exclude)
    }
}

/// Cosine of the angle between `a` and `b`; 0 when either has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        dot += x as f64 * y as f64;
        norm_a += x as f64 * x as f64;
        norm_b += y as f64 * y as f64;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

/// Z-score every column in place (population std); constant columns become 0
fn standardize(rows: &mut [Vec<f32>], width: usize) {
    if rows.is_empty() {
        return;
    }
    let n = rows.len() as f64;
    for c in 0..width {
        let mean = rows.iter().map(|r| r[c] as f64).sum::<f64>() / n;
        let var = rows
            .iter()
            .map(|r| {
                let d = r[c] as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        let std = var.sqrt();
        for row in rows.iter_mut() {
            row[c] = if std > 0.0 {
                ((row[c] as f64 - mean) / std) as f32
            } else {
                0.0
            };
        }
    }
}

/// Content-based `Scorer`: cosine between a user's taste profile and an item.
///
/// Profiles come from `ContentIndex::taste_profile` over the fitting matrix.
#[derive(Debug, Clone)]
pub struct ProfileScorer {
    index: ContentIndex,
    profiles: HashMap<UserId, Vec<f32>>,
}

impl ProfileScorer {
    pub fn new(index: ContentIndex, matrix: &RatingMatrix, threshold: f32) -> Self {
        let profiles = matrix
            .user_ids()
            .into_iter()
            .map(|user_id| (user_id, index.taste_profile(matrix.user_ratings(user_id), threshold)))
            .collect();
        Self { index, profiles }
    }

    pub fn index(&self) -> &ContentIndex {
        &self.index
    }

    pub fn profile(&self, user_id: UserId) -> Option<&[f32]> {
        self.profiles.get(&user_id).map(Vec::as_slice)
    }
}

impl Scorer for ProfileScorer {
    fn name(&self) -> &str {
        "content"
    }

    /// Cosine in [-1, 1]; 0 for unknown users or items
    fn score(&self, user_id: UserId, item_id: ItemId) -> f32 {
        match (self.profiles.get(&user_id), self.index.vector(item_id)) {
            (Some(profile), Some(row)) => cosine_similarity(profile, row),
            _ => 0.0,
        }
    }

    fn classify(&self, user_id: UserId, item_id: ItemId, _threshold: f32) -> bool {
        self.score(user_id, item_id) > 0.0
    }
}
