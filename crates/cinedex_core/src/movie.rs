//! The movie record: the versioned resource guarded by optimistic concurrency.

use crate::validator::{unique, Validator};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Earliest accepted release year.
pub const MIN_YEAR: i32 = 1888;

/// Maximum title length in bytes.
pub const MAX_TITLE_BYTES: usize = 500;

/// Maximum number of genres per movie.
pub const MAX_GENRES: usize = 5;

/// A movie in the catalog.
///
/// `version` starts at 1 and is incremented by exactly one on every
/// successful update. Callers submit the version they last observed; the
/// store rejects the write if it no longer matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Movie {
    /// Unique id assigned by the store (`>= 1` once persisted).
    pub id: i64,
    /// Creation timestamp assigned by the store.
    #[serde(skip_serializing)]
    pub created_at: DateTime<Utc>,
    /// Title.
    pub title: String,
    /// Release year.
    pub year: i32,
    /// Running time.
    pub runtime: Runtime,
    /// Genres, unique within the movie.
    pub genres: Vec<String>,
    /// Optimistic concurrency version.
    pub version: i32,
}

impl Movie {
    /// Creates an unsaved movie. `id` and `created_at` are filled in by the store.
    pub fn new(title: impl Into<String>, year: i32, runtime: Runtime, genres: Vec<String>) -> Self {
        Self {
            id: 0,
            created_at: Utc::now(),
            title: title.into(),
            year,
            runtime,
            genres,
            version: 1,
        }
    }

    /// Applies the fields present in `patch`.
    pub fn apply(&mut self, patch: MoviePatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(year) = patch.year {
            self.year = year;
        }
        if let Some(runtime) = patch.runtime {
            self.runtime = runtime;
        }
        if let Some(genres) = patch.genres {
            self.genres = genres;
        }
    }
}

/// Fields accepted when creating a movie.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MovieInput {
    /// Title.
    #[serde(default)]
    pub title: String,
    /// Release year.
    #[serde(default)]
    pub year: i32,
    /// Running time.
    #[serde(default)]
    pub runtime: Runtime,
    /// Genres.
    #[serde(default)]
    pub genres: Vec<String>,
}

impl From<MovieInput> for Movie {
    fn from(input: MovieInput) -> Self {
        Movie::new(input.title, input.year, input.runtime, input.genres)
    }
}

/// A partial update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoviePatch {
    /// New title.
    pub title: Option<String>,
    /// New release year.
    pub year: Option<i32>,
    /// New running time.
    pub runtime: Option<Runtime>,
    /// New genres.
    pub genres: Option<Vec<String>>,
}

/// Checks every movie field against the catalog rules.
pub fn validate_movie(v: &mut Validator, movie: &Movie) {
    v.check(!movie.title.is_empty(), "title", "must be provided");
    v.check(
        movie.title.len() <= MAX_TITLE_BYTES,
        "title",
        "must not be more than 500 bytes long",
    );

    v.check(movie.year != 0, "year", "must be provided");
    v.check(movie.year >= MIN_YEAR, "year", "must be greater than 1888");
    v.check(
        movie.year <= Utc::now().year(),
        "year",
        "must not be in the future",
    );

    v.check(movie.runtime.0 != 0, "runtime", "must be provided");
    v.check(movie.runtime.0 > 0, "runtime", "must be a positive integer");

    v.check(!movie.genres.is_empty(), "genres", "must contain at least 1 genre");
    v.check(
        movie.genres.len() <= MAX_GENRES,
        "genres",
        "must not contain more than 5 genres",
    );
    v.check(unique(&movie.genres), "genres", "must not contain duplicate values");
}

/// Error returned when a runtime string is not of the form `"<n> mins"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid runtime format")]
pub struct InvalidRuntimeFormat;

/// A running time in minutes. The JSON form is the string `"<n> mins"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Runtime(pub i32);

impl Runtime {
    /// Returns the number of minutes.
    pub fn minutes(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mins", self.0)
    }
}

impl FromStr for Runtime {
    type Err = InvalidRuntimeFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(' ');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(n), Some("mins"), None) => n
                .parse::<i32>()
                .map(Runtime)
                .map_err(|_| InvalidRuntimeFormat),
            _ => Err(InvalidRuntimeFormat),
        }
    }
}

impl Serialize for Runtime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
