//! Parsers for MovieLens-style data files.
//!
//! - ratings: `userId<TAB>itemId<TAB>rating<TAB>timestamp` (any whitespace, or `::`)
//! - items:   `itemId|title (year)|releaseDate|...|flag_0|...|flag_{G-1}`
//! - users:   `userId|age|gender|occupation|zipcode`
//! - genres:  `name|index`
//! - tracks:  `id|name|artist|genre|popularity|<9 audio features>` (`|` or `,`),
//!   with an optional header row
//!
//! Every parser works on already-decoded text and is a pure function of it.
//! A row that fails to parse is logged at debug level, counted and skipped;
//! it never aborts the file.

use crate::error::{DataLoadError, Result};
use crate::types::*;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Records parsed from one file plus the number of rows that were skipped
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub records: Vec<T>,
    pub skipped: usize,
}

impl<T> Default for Parsed<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: 0,
        }
    }
}

/// Read a whole file as text.
///
/// Any failure to open or read the file becomes `ResourceUnavailable`,
/// which is the only error a caller of the loader has to handle.
pub fn read_text(path: &Path) -> Result<String> {
    let unavailable = |e: std::io::Error| DataLoadError::ResourceUnavailable {
        path: path.display().to_string(),
        reason: e.to_string(),
    };
    let mut file = File::open(path).map_err(unavailable)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(unavailable)?;
    Ok(decode_text(bytes))
}

/// Decode bytes as UTF-8, falling back to ISO-8859-1 (Latin-1).
///
/// MovieLens 100k ships Latin-1 titles; each Latin-1 byte maps directly to
/// the Unicode code point of the same value.
pub fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => err.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

fn parse_lines<T>(
    content: &str,
    file: &str,
    mut parse_line: impl FnMut(&str, usize) -> Result<T>,
) -> Parsed<T> {
    let mut parsed = Parsed::default();
    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line_trimmed = line.trim();
        if line_trimmed.is_empty() {
            continue;
        }
        match parse_line(line_trimmed, line_no) {
            Ok(record) => parsed.records.push(record),
            Err(err) => {
                debug!(file, %err, "skipping row");
                parsed.skipped += 1;
            }
        }
    }
    parsed
}

// =============================================================================
// Ratings
// =============================================================================

/// Parse the interactions file
pub fn parse_ratings(content: &str) -> Parsed<Rating> {
    parse_lines(content, "ratings", parse_rating_line)
}

fn parse_rating_line(line: &str, line_no: usize) -> Result<Rating> {
    const FILE: &str = "ratings";
    let fields: Vec<&str> = if line.contains("::") {
        line.split("::").map(str::trim).collect()
    } else {
        line.split_whitespace().collect()
    };

    if fields.len() < 3 {
        return Err(DataLoadError::malformed(
            FILE,
            line_no,
            format!("expected at least 3 fields, found {}", fields.len()),
        ));
    }

    let user_id = fields[0]
        .parse()
        .map_err(|e| DataLoadError::malformed(FILE, line_no, format!("Invalid userId: {}", e)))?;
    let item_id = fields[1]
        .parse()
        .map_err(|e| DataLoadError::malformed(FILE, line_no, format!("Invalid itemId: {}", e)))?;
    let rating: f32 = fields[2]
        .parse()
        .map_err(|e| DataLoadError::malformed(FILE, line_no, format!("Invalid rating: {}", e)))?;
    if !rating.is_finite() {
        return Err(DataLoadError::malformed(FILE, line_no, "rating is not finite"));
    }
    let timestamp = match fields.get(3) {
        Some(raw) => Some(raw.parse().map_err(|e| {
            DataLoadError::malformed(FILE, line_no, format!("Invalid timestamp: {}", e))
        })?),
        None => None,
    };

    Ok(Rating {
        user_id,
        item_id,
        rating,
        timestamp,
    })
}

// =============================================================================
// Items
// =============================================================================

/// Parse the items file, decoding genre flags with `genres`
pub fn parse_items(content: &str, genres: &GenreTable) -> Parsed<Item> {
    parse_lines(content, "items", |line, line_no| {
        parse_item_line(line, line_no, genres)
    })
}

fn parse_item_line(line: &str, line_no: usize, genres: &GenreTable) -> Result<Item> {
    const FILE: &str = "items";
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    if fields.len() < 2 {
        return Err(DataLoadError::malformed(FILE, line_no, "Missing title"));
    }

    let id = fields[0]
        .parse()
        .map_err(|e| DataLoadError::malformed(FILE, line_no, format!("Invalid itemId: {}", e)))?;
    let (title, title_year) = extract_year_from_title(fields[1]);

    // Flags are the trailing run of 0/1 columns after the title, ignoring
    // empty fields left by a trailing '|'
    let mut end = fields.len();
    while end > 2 && fields[end - 1].is_empty() {
        end -= 1;
    }
    let fields = &fields[..end];
    let mut flags_start = fields.len();
    while flags_start > 2 && is_flag(fields[flags_start - 1]) {
        flags_start -= 1;
    }
    let release_date = fields[2..flags_start]
        .first()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    let genre_names = fields[flags_start..]
        .iter()
        .enumerate()
        .filter(|(_, flag)| **flag == "1")
        .map(|(idx, _)| genres.name(idx))
        .collect();

    let year = title_year.or_else(|| release_date.as_deref().and_then(year_from_release_date));

    Ok(Item {
        id,
        title,
        year,
        release_date,
        genres: genre_names,
        artist: None,
        popularity: None,
        audio_features: None,
    })
}

fn is_flag(field: &str) -> bool {
    field == "0" || field == "1"
}

/// Split a trailing "(1995)" off a title.
///
/// Example: "Toy Story (1995)" -> ("Toy Story", Some(1995))
///          "Movie Title"      -> ("Movie Title", None)
fn extract_year_from_title(title: &str) -> (String, Option<u16>) {
    let trimmed = title.trim_end();
    let parsed = trimmed
        .strip_suffix(')')
        .and_then(|rest| rest.rsplit_once('('))
        .filter(|(_, year)| year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|(prefix, year)| Some((prefix.trim_end().to_string(), year.parse::<u16>().ok()?)));

    match parsed {
        Some((display, year)) if !display.is_empty() => (display, Some(year)),
        _ => (trimmed.to_string(), None),
    }
}

/// "01-Jan-1995" -> Some(1995)
fn year_from_release_date(date: &str) -> Option<u16> {
    let tail = date.get(date.len().checked_sub(4)?..)?;
    if tail.bytes().all(|b| b.is_ascii_digit()) {
        tail.parse().ok()
    } else {
        None
    }
}

// =============================================================================
// Users
// =============================================================================

/// Parse the optional users file
pub fn parse_users(content: &str) -> Parsed<User> {
    parse_lines(content, "users", parse_user_line)
}

fn parse_user_line(line: &str, line_no: usize) -> Result<User> {
    const FILE: &str = "users";
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    if fields.len() < 4 {
        return Err(DataLoadError::malformed(
            FILE,
            line_no,
            format!("expected at least 4 fields, found {}", fields.len()),
        ));
    }

    let id = fields[0]
        .parse()
        .map_err(|e| DataLoadError::malformed(FILE, line_no, format!("Invalid userId: {}", e)))?;
    let age = fields[1]
        .parse()
        .map_err(|e| DataLoadError::malformed(FILE, line_no, format!("Invalid age: {}", e)))?;
    let gender = parse_gender(fields[2])
        .map_err(|e| DataLoadError::malformed(FILE, line_no, e.to_string()))?;
    let occupation = Some(fields[3]).filter(|s| !s.is_empty()).map(str::to_string);
    let zipcode = fields
        .get(4)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    Ok(User {
        id,
        age: Some(age),
        gender,
        occupation,
        zipcode,
    })
}

fn parse_gender(s: &str) -> Result<Option<Gender>> {
    match s {
        "M" => Ok(Some(Gender::Male)),
        "F" => Ok(Some(Gender::Female)),
        "" => Ok(None),
        _ => Err(DataLoadError::InvalidValue {
            field: "gender".to_string(),
            value: s.to_string(),
        }),
    }
}

// =============================================================================
// Genre names
// =============================================================================

/// Parse the optional genre-name file into a table
pub fn parse_genres(content: &str) -> Parsed<(usize, String)> {
    parse_lines(content, "genres", |line, line_no| {
        let (name, index) = line
            .rsplit_once('|')
            .ok_or_else(|| DataLoadError::malformed("genres", line_no, "Missing index"))?;
        let index = index.trim().parse().map_err(|e| {
            DataLoadError::malformed("genres", line_no, format!("Invalid index: {}", e))
        })?;
        Ok((index, name.trim().to_string()))
    })
}

// =============================================================================
// Tracks
// =============================================================================

const TRACK_META_FIELDS: usize = 5;

/// Parse the optional tracks file into items carrying audio features.
///
/// Rows missing any feature are skipped. Out-of-range values are clipped
/// (see `audio_feature_range`); the second value is how many were.
pub fn parse_tracks(content: &str) -> (Parsed<Item>, usize) {
    let (offset, body) = match content.split_once('\n') {
        Some((first, rest)) if is_track_header(first) => (1, rest),
        None if is_track_header(content) => (1, ""),
        _ => (0, content),
    };

    let mut clipped = 0usize;
    let parsed = parse_lines(body, "tracks", |line, line_no| {
        let (item, clipped_here) = parse_track_line(line, line_no + offset)?;
        clipped += clipped_here;
        Ok(item)
    });
    (parsed, clipped)
}

fn is_track_header(line: &str) -> bool {
    let first = line.split(['|', ',']).next().unwrap_or("").trim();
    first.eq_ignore_ascii_case("id") || first.eq_ignore_ascii_case("track_id")
}

fn parse_track_line(line: &str, line_no: usize) -> Result<(Item, usize)> {
    const FILE: &str = "tracks";
    let separator = if line.contains('|') { '|' } else { ',' };
    let fields: Vec<&str> = line.split(separator).map(str::trim).collect();
    let expected = TRACK_META_FIELDS + AUDIO_FEATURE_NAMES.len();
    if fields.len() < expected {
        return Err(DataLoadError::malformed(
            FILE,
            line_no,
            format!("expected {} fields, found {}", expected, fields.len()),
        ));
    }

    let id = fields[0]
        .parse()
        .map_err(|e| DataLoadError::malformed(FILE, line_no, format!("Invalid track id: {}", e)))?;
    let popularity = match fields[4] {
        "" => None,
        raw => Some(raw.parse().map_err(|e| {
            DataLoadError::malformed(FILE, line_no, format!("Invalid popularity: {}", e))
        })?),
    };

    let mut clipped = 0usize;
    let mut features = Vec::with_capacity(AUDIO_FEATURE_NAMES.len());
    for (name, raw) in AUDIO_FEATURE_NAMES.iter().zip(&fields[TRACK_META_FIELDS..expected]) {
        let value: f32 = raw
            .parse()
            .map_err(|e| DataLoadError::malformed(FILE, line_no, format!("Invalid {}: {}", name, e)))?;
        if !value.is_finite() {
            return Err(DataLoadError::malformed(FILE, line_no, format!("{} is not finite", name)));
        }
        let value = match audio_feature_range(name) {
            Some((lo, hi)) if value < lo || value > hi => {
                clipped += 1;
                value.clamp(lo, hi)
            }
            _ => value,
        };
        features.push(value);
    }

    let item = Item {
        id,
        title: fields[1].to_string(),
        year: None,
        release_date: None,
        genres: Some(fields[3])
            .filter(|g| !g.is_empty())
            .map(|g| vec![g.to_string()])
            .unwrap_or_default(),
        artist: Some(fields[2]).filter(|a| !a.is_empty()).map(str::to_string),
        popularity,
        audio_features: Some(features),
    };
    Ok((item, clipped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_year() {
        assert_eq!(
            extract_year_from_title("Toy Story (1995)"),
            ("Toy Story".to_string(), Some(1995))
        );
        assert_eq!(
            extract_year_from_title("Shanghai Triad (Yao a yao yao dao waipo qiao) (1995)"),
            ("Shanghai Triad (Yao a yao yao dao waipo qiao)".to_string(), Some(1995))
        );
        assert_eq!(
            extract_year_from_title("Movie Title"),
            ("Movie Title".to_string(), None)
        );
        assert_eq!(
            extract_year_from_title("Sequel (II)"),
            ("Sequel (II)".to_string(), None)
        );
    }

    #[test]
    fn test_parse_ratings_skips_bad_rows() {
        let content = "1\t10\t5\t881250949\n\
                       2\t20\n\
                       x\t30\t4\t1\n\
                       3\t30\tfour\t1\n\
                       4\t40\t3\n\
                       \n\n";
        let parsed = parse_ratings(content);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.skipped, 3);
        assert_eq!(parsed.records[0].timestamp, Some(881250949));
        assert_eq!(parsed.records[1].timestamp, None);
        assert_eq!(parsed.records[1].item_id, 40);
    }

    #[test]
    fn test_parse_ratings_double_colon() {
        let parsed = parse_ratings("1::1193::5::978300760\n");
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].item_id, 1193);
        assert_eq!(parsed.records[0].rating, 5.0);
    }

    #[test]
    fn test_parse_item_with_flags() {
        let line = "1|Toy Story (1995)|01-Jan-1995||http://example.com|0|0|0|1|1|1|0|0|0|0|0|0|0|0|0|0|0|0|0";
        let parsed = parse_items(line, &GenreTable::default());
        assert_eq!(parsed.skipped, 0);
        let item = &parsed.records[0];
        assert_eq!(item.id, 1);
        assert_eq!(item.title, "Toy Story");
        assert_eq!(item.year, Some(1995));
        assert_eq!(item.release_date.as_deref(), Some("01-Jan-1995"));
        assert_eq!(item.genres, vec!["Animation", "Children's", "Comedy"]);
    }

    #[test]
    fn test_parse_item_placeholder_genres() {
        let table = GenreTable::from_pairs(vec![(0, "Rock".to_string())]);
        let parsed = parse_items("7|Song|1|0|1", &table);
        assert_eq!(parsed.records[0].genres, vec!["Rock", "genre_2"]);
        assert_eq!(parsed.records[0].year, None);
        assert_eq!(parsed.records[0].release_date, None);
    }

    #[test]
    fn test_year_from_release_date() {
        let parsed = parse_items("267|unknown|01-Jan-1996||", &GenreTable::default());
        assert_eq!(parsed.records[0].year, Some(1996));
        assert_eq!(year_from_release_date("Jan"), None);
    }

    #[test]
    fn test_parse_item_trailing_separator() {
        let line = "1|Toy Story (1995)|01-Jan-1995||http://example.com|0|0|0|1|1|1|0|0|0|0|0|0|0|0|0|0|0|0|0|";
        let parsed = parse_items(line, &GenreTable::default());
        assert_eq!(parsed.records[0].genres, vec!["Animation", "Children's", "Comedy"]);
        assert_eq!(parsed.records[0].release_date.as_deref(), Some("01-Jan-1995"));

        let parsed = parse_items("7|Song|1|0|1||", &GenreTable::default());
        assert_eq!(parsed.records[0].genres, vec!["unknown", "Adventure"]);
    }

    #[test]
    fn test_parse_items_skips_bad_rows() {
        let content = "abc|Bad Id\nonlyid\n2|Good (2000)\n";
        let parsed = parse_items(content, &GenreTable::default());
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.skipped, 2);
    }

    #[test]
    fn test_parse_users() {
        let content = "1|24|M|technician|85711\n2|53|F|other\n3|x|M|writer|1\n4|20|Q|writer|1\n5|30\n";
        let parsed = parse_users(content);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.skipped, 3);
        assert_eq!(parsed.records[0].gender, Some(Gender::Male));
        assert_eq!(parsed.records[1].zipcode, None);
    }

    #[test]
    fn test_parse_genres() {
        let parsed = parse_genres("unknown|0\nAction|1\n\nbroken\n");
        assert_eq!(parsed.records, vec![(0, "unknown".to_string()), (1, "Action".to_string())]);
        assert_eq!(parsed.skipped, 1);
    }

    #[test]
    fn test_parse_tracks() {
        let content = "track_id,track_name,artists,track_genre,popularity,acousticness,danceability,energy,instrumentalness,liveness,loudness,speechiness,tempo,valence\n\
                       1,Calm,Ana,ambient,40,0.9,0.3,0.2,0.8,0.1,-18.0,0.04,70.0,0.2\n\
                       2,Loud,Bo,metal,,1.4,0.4,0.95,0.0,0.3,-4.0,0.1,350.0,-0.2\n\
                       3,Broken,Cy,pop,50,0.1,0.5\n\
                       4,Gap,Di,pop,50,0.1,,0.5,0.0,0.1,-6.0,0.05,120.0,0.6\n";
        let (parsed, clipped) = parse_tracks(content);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.skipped, 2);
        assert_eq!(clipped, 3);

        let calm = &parsed.records[0];
        assert_eq!(calm.title, "Calm");
        assert_eq!(calm.artist.as_deref(), Some("Ana"));
        assert_eq!(calm.genres, vec!["ambient"]);
        assert_eq!(calm.popularity, Some(40));
        assert_eq!(calm.audio_features.as_ref().unwrap()[5], -18.0);

        let loud = parsed.records[1].audio_features.as_ref().unwrap();
        assert_eq!(parsed.records[1].popularity, None);
        assert_eq!(loud[0], 1.0);
        assert_eq!(loud[7], 300.0);
        assert_eq!(loud[8], 0.0);
    }

    #[test]
    fn test_parse_tracks_pipe_without_header() {
        let (parsed, clipped) = parse_tracks("9|Song|Eve|pop|70|0.1|0.8|0.7|0.0|0.1|-5.0|0.05|120.0|0.9\n");
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.skipped, 0);
        assert_eq!(clipped, 0);
        assert_eq!(parsed.records[0].id, 9);
    }

    #[test]
    fn test_decode_latin1() {
        let text = decode_text(vec![b'C', 0xE9, b'z']);
        assert_eq!(text, "Céz");
    }
}
