//! Dataset assembly: parsed rows -> resolved, indexed, in-memory tables.
//!
//! `Dataset::from_sources` is a pure function of the input text. File
//! access lives only in `Dataset::load_from_files`, which reads the required
//! and optional resources in parallel and then defers to `from_sources`.

use crate::error::{DataLoadError, Result};
use crate::matrix::RatingMatrix;
use crate::parser;
use crate::types::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// File names inside a dataset directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetLayout {
    pub ratings_file: String,
    pub items_file: String,
    pub users_file: String,
    pub genres_file: String,
    /// Optional audio-feature tracks file
    pub tracks_file: String,
}

impl Default for DatasetLayout {
    /// MovieLens 100k names
    fn default() -> Self {
        Self {
            ratings_file: "u.data".to_string(),
            items_file: "u.item".to_string(),
            users_file: "u.user".to_string(),
            genres_file: "u.genre".to_string(),
            tracks_file: "tracks.csv".to_string(),
        }
    }
}

/// Raw text of every resource a dataset is built from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataSources {
    pub ratings: String,
    pub items: String,
    pub users: Option<String>,
    pub genres: Option<String>,
    pub tracks: Option<String>,
}

/// Users, items and ratings with their lookup indices.
///
/// Built once per load and read-only afterwards; a new load replaces the
/// whole value.
#[derive(Debug, Clone)]
pub struct Dataset {
    users: HashMap<UserId, User>,
    items: HashMap<ItemId, Item>,
    matrix: RatingMatrix,
    genre_table: GenreTable,

    // Secondary indices
    genre_index: HashMap<String, Vec<ItemId>>,
    year_index: BTreeMap<u16, Vec<ItemId>>,
    item_stats: HashMap<ItemId, ItemStats>,

    report: LoadReport,
}

impl Dataset {
    /// Load a dataset directory.
    ///
    /// Ratings and items are required: if either cannot be read the load
    /// fails with `ResourceUnavailable` and nothing is kept. The users, genre
    /// and tracks files are optional and only degrade features when missing.
    pub fn load_from_files(data_dir: &Path, layout: &DatasetLayout) -> Result<Self> {
        info!(dir = %data_dir.display(), "Loading dataset");

        let ratings_path = data_dir.join(&layout.ratings_file);
        let items_path = data_dir.join(&layout.items_file);
        let users_path = data_dir.join(&layout.users_file);
        let genres_path = data_dir.join(&layout.genres_file);
        let tracks_path = data_dir.join(&layout.tracks_file);

        let ((ratings, items), (users, (genres, tracks))) = rayon::join(
            || {
                rayon::join(
                    || parser::read_text(&ratings_path),
                    || parser::read_text(&items_path),
                )
            },
            || {
                rayon::join(
                    || read_optional(&users_path),
                    || rayon::join(|| read_optional(&genres_path), || read_optional(&tracks_path)),
                )
            },
        );

        let sources = DataSources {
            ratings: ratings?,
            items: items?,
            users,
            genres,
            tracks,
        };
        let dataset = Self::from_sources(&sources);

        let (users, items, ratings) = dataset.counts();
        info!(users, items, ratings, "Dataset loaded");
        Ok(dataset)
    }

    /// Build a dataset from raw file contents
    pub fn from_sources(sources: &DataSources) -> Self {
        let mut report = LoadReport {
            users_file_present: sources.users.is_some(),
            genre_file_present: sources.genres.is_some(),
            tracks_file_present: sources.tracks.is_some(),
            ..LoadReport::default()
        };

        let genre_table = match &sources.genres {
            Some(content) => {
                let parsed = parser::parse_genres(content);
                report.skipped_genres = parsed.skipped;
                if parsed.records.is_empty() {
                    warn!("Genre file has no usable rows, using built-in genre names");
                    GenreTable::default()
                } else {
                    GenreTable::from_pairs(parsed.records)
                }
            }
            None => GenreTable::default(),
        };

        let items = parser::parse_items(&sources.items, &genre_table);
        report.skipped_items = items.skipped;
        let mut items = items.records;

        if let Some(content) = &sources.tracks {
            let (tracks, clipped) = parser::parse_tracks(content);
            report.skipped_tracks = tracks.skipped;
            report.clipped_track_values = clipped;
            if clipped > 0 {
                warn!(clipped, "Clipped out-of-range track features");
            }
            merge_tracks(&mut items, tracks.records);
        }

        let ratings = parser::parse_ratings(&sources.ratings);
        report.skipped_ratings = ratings.skipped;

        let users = sources.users.as_deref().map(|content| {
            let parsed = parser::parse_users(content);
            report.skipped_users = parsed.skipped;
            parsed.records
        });

        Self::assemble(users, items, ratings.records, genre_table, report)
    }

    /// Build a dataset from already-typed rows.
    ///
    /// An empty `users` list behaves like a missing users file: users are
    /// synthesized from the rating ids.
    pub fn from_parts(users: Vec<User>, items: Vec<Item>, ratings: Vec<Rating>) -> Self {
        let users = if users.is_empty() { None } else { Some(users) };
        let report = LoadReport {
            users_file_present: users.is_some(),
            ..LoadReport::default()
        };
        Self::assemble(users, items, ratings, GenreTable::default(), report)
    }

    fn assemble(
        users: Option<Vec<User>>,
        items: Vec<Item>,
        ratings: Vec<Rating>,
        genre_table: GenreTable,
        mut report: LoadReport,
    ) -> Self {
        let items: HashMap<ItemId, Item> = items.into_iter().map(|i| (i.id, i)).collect();
        let matrix = RatingMatrix::from_ratings(ratings);

        let users: HashMap<UserId, User> = match users {
            Some(users) => users.into_iter().map(|u| (u.id, u)).collect(),
            None => matrix
                .user_ids()
                .into_iter()
                .map(|id| (id, User::bare(id)))
                .collect(),
        };

        // Unresolved ids are kept for training; only logged and counted here
        let unknown_users: Vec<DataLoadError> = matrix
            .user_ids()
            .into_iter()
            .filter(|id| !users.contains_key(id))
            .map(|id| DataLoadError::unknown("user", id))
            .collect();
        let unknown_items: Vec<DataLoadError> = matrix
            .item_ids()
            .into_iter()
            .filter(|id| !items.contains_key(id))
            .map(|id| DataLoadError::unknown("item", id))
            .collect();
        for err in unknown_users.iter().chain(&unknown_items) {
            debug!(%err, "rating kept without metadata");
        }
        report.unknown_users = unknown_users.len();
        report.unknown_items = unknown_items.len();
        if report.unknown_users > 0 || report.unknown_items > 0 {
            warn!(
                unknown_users = report.unknown_users,
                unknown_items = report.unknown_items,
                "Ratings reference ids missing from the metadata tables"
            );
        }

        let mut dataset = Self {
            users,
            items,
            matrix,
            genre_table,
            genre_index: HashMap::new(),
            year_index: BTreeMap::new(),
            item_stats: HashMap::new(),
            report,
        };
        dataset.build_secondary_indices();
        dataset.compute_item_stats();
        dataset
    }

    /// Build genre -> items and year -> items lookups
    fn build_secondary_indices(&mut self) {
        let mut ids: Vec<ItemId> = self.items.keys().copied().collect();
        ids.sort_unstable();

        for id in ids {
            let item = &self.items[&id];
            for genre in &item.genres {
                self.genre_index.entry(genre.clone()).or_default().push(id);
            }
            if let Some(year) = item.year {
                self.year_index.entry(year).or_default().push(id);
            }
        }
    }

    /// Compute average, count and popularity for every rated item
    fn compute_item_stats(&mut self) {
        let item_ids = self.matrix.item_ids();
        let matrix = &self.matrix;
        self.item_stats = item_ids
            .par_iter()
            .map(|&item_id| {
                let ratings = matrix.item_ratings(item_id);
                let rating_count = ratings.len() as u32;
                let avg_rating = if rating_count > 0 {
                    let total: f32 = ratings.iter().map(|r| r.rating).sum();
                    total / rating_count as f32
                } else {
                    0.0
                };
                (
                    item_id,
                    ItemStats {
                        avg_rating,
                        rating_count,
                        popularity_score: compute_popularity_score(avg_rating, rating_count),
                    },
                )
            })
            .collect();
    }

    // Getters

    pub fn get_user(&self, id: UserId) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn get_item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    /// The full interaction index
    pub fn matrix(&self) -> &RatingMatrix {
        &self.matrix
    }

    pub fn ratings(&self) -> &[Rating] {
        self.matrix.ratings()
    }

    pub fn genre_table(&self) -> &GenreTable {
        &self.genre_table
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn get_item_stats(&self, id: ItemId) -> Option<&ItemStats> {
        self.item_stats.get(&id)
    }

    /// Known users plus any user id that only appears in ratings, ascending
    pub fn user_ids(&self) -> Vec<UserId> {
        let mut ids: HashSet<UserId> = self.users.keys().copied().collect();
        ids.extend(self.matrix.user_ids());
        let mut ids: Vec<UserId> = ids.into_iter().collect();
        ids.sort_unstable();
        ids
    }

    /// Every recommendable item: metadata items plus rated-only ids, ascending
    pub fn catalog(&self) -> Vec<ItemId> {
        let mut ids: HashSet<ItemId> = self.items.keys().copied().collect();
        ids.extend(self.matrix.item_ids());
        let mut ids: Vec<ItemId> = ids.into_iter().collect();
        ids.sort_unstable();
        ids
    }

    /// Items with metadata, ascending
    pub fn items(&self) -> Vec<&Item> {
        let mut items: Vec<&Item> = self.items.values().collect();
        items.sort_unstable_by_key(|item| item.id);
        items
    }

    pub fn get_items_by_genre(&self, genre: &str) -> &[ItemId] {
        self.genre_index
            .get(genre)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Items released in `[start, end]`, by year then id
    pub fn get_items_in_year_range(&self, start: u16, end: u16) -> Vec<ItemId> {
        if start > end {
            return Vec::new();
        }
        self.year_index
            .range(start..=end)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }

    /// Case-insensitive title search.
    ///
    /// Exact matches come first, then substring matches; within each group
    /// higher average rating wins, then lower id.
    pub fn search_titles(&self, query: &str) -> Vec<&Item> {
        let query = query.to_lowercase();
        let mut matches: Vec<(u8, f32, &Item)> = self
            .items
            .values()
            .filter_map(|item| {
                let title = item.title.to_lowercase();
                let rank = if title == query {
                    0
                } else if title.contains(&query) {
                    1
                } else {
                    return None;
                };
                let avg = self
                    .get_item_stats(item.id)
                    .map(|s| s.avg_rating)
                    .unwrap_or(0.0);
                Some((rank, avg, item))
            })
            .collect();

        matches.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| b.1.total_cmp(&a.1))
                .then_with(|| a.2.id.cmp(&b.2.id))
        });
        matches.into_iter().map(|(_, _, item)| item).collect()
    }

    /// (users, items, ratings)
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.users.len(), self.items.len(), self.matrix.len())
    }
}

/// Attach track features to items with the same id; other tracks become items
fn merge_tracks(items: &mut Vec<Item>, tracks: Vec<Item>) {
    let mut positions: HashMap<ItemId, usize> =
        items.iter().enumerate().map(|(pos, item)| (item.id, pos)).collect();
    for track in tracks {
        match positions.get(&track.id) {
            Some(&pos) => {
                let item = &mut items[pos];
                item.audio_features = track.audio_features;
                item.artist = track.artist;
                item.popularity = track.popularity;
                if item.genres.is_empty() {
                    item.genres = track.genres;
                }
            }
            None => {
                positions.insert(track.id, items.len());
                items.push(track);
            }
        }
    }
}

fn read_optional(path: &Path) -> Option<String> {
    match parser::read_text(path) {
        Ok(content) => Some(content),
        Err(err) => {
            warn!(%err, "Optional resource missing, continuing without it");
            None
        }
    }
}

/// avg_rating * ln(rating_count + 1): rewards both high ratings and many ratings
fn compute_popularity_score(avg_rating: f32, rating_count: u32) -> f32 {
    avg_rating * (rating_count as f32 + 1.0).ln()
}
