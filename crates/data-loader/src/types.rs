//! Core domain types for MovieLens-style rating datasets.
//!
//! Users and items carry optional side features. Those features are exposed
//! as flat categorical tokens (`genre:Action`, `age:25-34`, ...) so that the
//! models crate can compose embeddings from them without knowing the schema.

use serde::{Deserialize, Serialize};

// =============================================================================
// Type Aliases
// =============================================================================

/// Identifier for a user, taken verbatim from the data files
pub type UserId = u32;

/// Identifier for an item (movie, track, ...), taken verbatim from the data files
pub type ItemId = u32;

// =============================================================================
// User-related Types
// =============================================================================

/// A user and whatever demographics the optional users file provided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub age: Option<u8>,
    pub gender: Option<Gender>,
    pub occupation: Option<String>,
    pub zipcode: Option<String>,
}

impl User {
    /// A user known only by id (no users file, or id missing from it)
    pub fn bare(id: UserId) -> Self {
        Self {
            id,
            age: None,
            gender: None,
            occupation: None,
            zipcode: None,
        }
    }

    /// Categorical side-feature tokens for this user
    pub fn feature_tokens(&self) -> Vec<String> {
        let mut tokens = Vec::new();
        if let Some(age) = self.age {
            tokens.push(format!("age:{}", AgeGroup::from_age(age).label()));
        }
        if let Some(gender) = self.gender {
            tokens.push(format!("gender:{}", gender.code()));
        }
        if let Some(occupation) = &self.occupation {
            tokens.push(format!("occupation:{}", occupation));
        }
        tokens
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn code(&self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
        }
    }
}

/// Age buckets used by MovieLens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgeGroup {
    Under18,
    Age18To24,
    Age25To34,
    Age35To44,
    Age45To49,
    Age50To55,
    Age56Plus,
}

impl AgeGroup {
    /// Bucket a raw age in years
    pub fn from_age(age: u8) -> Self {
        match age {
            0..=17 => AgeGroup::Under18,
            18..=24 => AgeGroup::Age18To24,
            25..=34 => AgeGroup::Age25To34,
            35..=44 => AgeGroup::Age35To44,
            45..=49 => AgeGroup::Age45To49,
            50..=55 => AgeGroup::Age50To55,
            _ => AgeGroup::Age56Plus,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgeGroup::Under18 => "<18",
            AgeGroup::Age18To24 => "18-24",
            AgeGroup::Age25To34 => "25-34",
            AgeGroup::Age35To44 => "35-44",
            AgeGroup::Age45To49 => "45-49",
            AgeGroup::Age50To55 => "50-55",
            AgeGroup::Age56Plus => "56+",
        }
    }
}

// =============================================================================
// Item-related Types
// =============================================================================

/// Represents an item in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// Display title with any trailing "(1995)" stripped
    pub title: String,
    pub year: Option<u16>,
    pub release_date: Option<String>,
    /// Decoded category names, in flag order
    pub genres: Vec<String>,
    /// Performing artist, for catalogs built from a tracks file
    pub artist: Option<String>,
    /// Source popularity (0-100 for Spotify tracks)
    pub popularity: Option<u32>,
    /// Continuous features, in `AUDIO_FEATURE_NAMES` order for tracks
    pub audio_features: Option<Vec<f32>>,
}

impl Item {
    pub fn new(id: ItemId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            year: None,
            release_date: None,
            genres: Vec::new(),
            artist: None,
            popularity: None,
            audio_features: None,
        }
    }

    pub fn with_year(mut self, year: u16) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.genres = genres.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_audio_features(mut self, features: Vec<f32>) -> Self {
        self.audio_features = Some(features);
        self
    }

    /// Categorical side-feature tokens for this item
    pub fn feature_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self
            .genres
            .iter()
            .map(|genre| format!("genre:{}", genre))
            .collect();
        if let Some(year) = self.year {
            tokens.push(format!("decade:{}", year / 10 * 10));
        }
        tokens
    }
}

/// Audio feature columns of a tracks file, in column order
pub const AUDIO_FEATURE_NAMES: [&str; 9] = [
    "acousticness",
    "danceability",
    "energy",
    "instrumentalness",
    "liveness",
    "loudness",
    "speechiness",
    "tempo",
    "valence",
];

/// Valid range of each audio feature; tracks outside it are clipped.
/// Loudness (dB) is left as is.
pub fn audio_feature_range(name: &str) -> Option<(f32, f32)> {
    match name {
        "loudness" => None,
        "tempo" => Some((0.0, 300.0)),
        _ => Some((0.0, 1.0)),
    }
}

/// Index -> name table for the genre flag columns of the items file.
///
/// Indices the table does not name render as `genre_<index>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreTable {
    names: Vec<Option<String>>,
}

/// Genre columns of MovieLens 100k `u.item`, in flag order
pub const DEFAULT_GENRES: [&str; 19] = [
    "unknown",
    "Action",
    "Adventure",
    "Animation",
    "Children's",
    "Comedy",
    "Crime",
    "Documentary",
    "Drama",
    "Fantasy",
    "Film-Noir",
    "Horror",
    "Musical",
    "Mystery",
    "Romance",
    "Sci-Fi",
    "Thriller",
    "War",
    "Western",
];

impl GenreTable {
    /// Build from explicit `(index, name)` pairs; gaps stay unnamed
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (usize, String)>,
    {
        let mut names: Vec<Option<String>> = Vec::new();
        for (index, name) in pairs {
            if index >= names.len() {
                names.resize(index + 1, None);
            }
            names[index] = Some(name);
        }
        Self { names }
    }

    /// Name for a flag column
    pub fn name(&self, index: usize) -> String {
        match self.names.get(index) {
            Some(Some(name)) => name.clone(),
            _ => format!("genre_{}", index),
        }
    }

    /// Number of column slots the table knows about (named or not)
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// All names in column order, placeholders included
    pub fn names(&self) -> Vec<String> {
        (0..self.names.len()).map(|i| self.name(i)).collect()
    }
}

impl Default for GenreTable {
    fn default() -> Self {
        Self::from_pairs(
            DEFAULT_GENRES
                .iter()
                .enumerate()
                .map(|(i, name)| (i, name.to_string())),
        )
    }
}

// =============================================================================
// Rating Type
// =============================================================================

/// A single rating from a user for an item
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub rating: f32,
    /// Unix timestamp, when the file provides one
    pub timestamp: Option<i64>,
}

impl Rating {
    pub fn new(user_id: UserId, item_id: ItemId, rating: f32) -> Self {
        Self {
            user_id,
            item_id,
            rating,
            timestamp: None,
        }
    }
}

// =============================================================================
// Statistics Types
// =============================================================================

/// Precomputed statistics for an item
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemStats {
    pub avg_rating: f32,
    pub rating_count: u32,
    /// Popularity score derived from rating count and average
    pub popularity_score: f32,
}

/// What the loader skipped or could not resolve
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub skipped_ratings: usize,
    pub skipped_items: usize,
    pub skipped_users: usize,
    pub skipped_genres: usize,
    pub skipped_tracks: usize,
    /// Track feature values pulled back into their valid range
    pub clipped_track_values: usize,
    pub unknown_users: usize,
    pub unknown_items: usize,
    pub users_file_present: bool,
    pub genre_file_present: bool,
    pub tracks_file_present: bool,
}
