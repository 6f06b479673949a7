//! Optimistic concurrency store for movies.
//!
//! The catalog owns the conflict-detection decision. It never locks a
//! record: an update is a single conditional write against the backend
//! ("set fields and `version = version + 1` where id and version match"),
//! and a write that matches nothing is reported as a conflict.
//!
//! A zero-match is only unambiguous if the caller read the record just
//! before writing. [`Catalog::patch`] does that read itself; callers of
//! [`Catalog::update`] must hold a freshly read record.
//!
//! Every backend call is bounded by [`CatalogConfig::op_timeout`]. An
//! elapsed bound becomes [`StoreError::Timeout`] and is never retried here.

use crate::error::{CoreResult, StoreError, StoreResult};
use crate::filters::{validate_filters, MovieQuery, MOVIE_SORT_SAFELIST};
use crate::movie::{validate_movie, Movie, MoviePatch};
use crate::store::RecordStore;
use crate::validator::Validator;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on a single backend operation.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(3);

/// Catalog configuration.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Bound on each backend operation.
    pub op_timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }
}

impl CatalogConfig {
    /// Sets the per-operation timeout.
    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }
}

/// Version-checked access to movie records.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn RecordStore>,
    config: CatalogConfig,
}

impl Catalog {
    /// Creates a catalog over `store`.
    pub fn new(store: Arc<dyn RecordStore>, config: CatalogConfig) -> Self {
        Self { store, config }
    }

    /// Validates and inserts a new movie.
    pub async fn create(&self, mut movie: Movie) -> CoreResult<Movie> {
        let mut v = Validator::new();
        validate_movie(&mut v, &movie);
        v.finish()?;

        bounded("movie.insert", self.config.op_timeout, self.store.insert(&mut movie)).await?;
        tracing::debug!(id = movie.id, "movie created");
        Ok(movie)
    }

    /// Fetches a movie. Ids below 1 are `NotFound` without a backend call.
    pub async fn get(&self, id: i64) -> StoreResult<Movie> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        bounded("movie.get", self.config.op_timeout, self.store.get(id)).await
    }

    /// Conditionally writes a freshly read `movie`.
    ///
    /// On success `movie.version` holds the new version, which is also
    /// returned. A stale version yields [`StoreError::EditConflict`]; the
    /// write is not retried.
    pub async fn update(&self, movie: &mut Movie) -> StoreResult<i32> {
        let observed = movie.version;
        bounded("movie.update", self.config.op_timeout, self.store.update(movie)).await?;
        tracing::debug!(id = movie.id, from = observed, to = movie.version, "movie updated");
        Ok(movie.version)
    }

    /// Reads, patches, validates and conditionally writes a movie.
    ///
    /// When `expected_version` is given and differs from the stored
    /// version, the patch is rejected as a conflict before any write.
    pub async fn patch(
        &self,
        id: i64,
        expected_version: Option<i32>,
        patch: MoviePatch,
    ) -> CoreResult<Movie> {
        let mut movie = self.get(id).await?;

        if let Some(expected) = expected_version {
            if expected != movie.version {
                tracing::debug!(id, expected, stored = movie.version, "stale expected version");
                return Err(StoreError::EditConflict.into());
            }
        }

        movie.apply(patch);
        let mut v = Validator::new();
        validate_movie(&mut v, &movie);
        v.finish()?;

        self.update(&mut movie).await?;
        Ok(movie)
    }

    /// Deletes a movie. Ids below 1 are `NotFound` without a backend call.
    pub async fn delete(&self, id: i64) -> StoreResult<()> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        bounded("movie.delete", self.config.op_timeout, self.store.delete(id)).await
    }

    /// Validates the query filters and returns one page of movies.
    pub async fn list(&self, query: &MovieQuery) -> CoreResult<(Vec<Movie>, u64)> {
        let mut v = Validator::new();
        validate_filters(&mut v, &query.filters, MOVIE_SORT_SAFELIST);
        v.finish()?;

        Ok(bounded("movie.list", self.config.op_timeout, self.store.list(query)).await?)
    }
}

/// Runs a backend operation under `limit` and logs infrastructure failures.
pub(crate) async fn bounded<T, F>(op: &'static str, limit: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    let result = match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout),
    };

    if let Err(err) = &result {
        if err.is_fatal() {
            tracing::error!(op, error = %err, "storage defect");
        } else if err.is_transient() {
            tracing::warn!(op, error = %err, "storage unavailable");
        }
    }
    result
}
