//! Persistent collaborator traits.
//!
//! Backends own durable state. They perform no in-process locking on
//! behalf of callers: the conditional write in [`RecordStore::update`] and
//! [`CredentialStore::update_user`] is the only consistency mechanism, so
//! several server processes may share one backend.

use crate::error::StoreResult;
use crate::filters::MovieQuery;
use crate::movie::Movie;
use crate::token::{Token, TokenHash, TokenScope};
use crate::user::User;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Storage for movie records.
///
/// # Invariants
///
/// - `insert` assigns `id`, `created_at` and `version = 1`
/// - `update` writes only if the stored version equals `movie.version`,
///   atomically increments it and writes the new value back into `movie`
/// - `update` that matches no row returns [`StoreError::EditConflict`]
///
/// [`StoreError::EditConflict`]: crate::StoreError::EditConflict
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts a new movie, filling in `id`, `created_at` and `version`.
    async fn insert(&self, movie: &mut Movie) -> StoreResult<()>;

    /// Fetches a movie by id.
    async fn get(&self, id: i64) -> StoreResult<Movie>;

    /// Conditionally writes `movie` and refreshes `movie.version`.
    async fn update(&self, movie: &mut Movie) -> StoreResult<()>;

    /// Deletes a movie by id.
    async fn delete(&self, id: i64) -> StoreResult<()>;

    /// Returns one page of matching movies and the total match count.
    async fn list(&self, query: &MovieQuery) -> StoreResult<(Vec<Movie>, u64)>;
}

/// Storage for users and their tokens.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Inserts a new user. Fails with `DuplicateEmail` if the email is taken.
    async fn insert_user(&self, user: &mut User) -> StoreResult<()>;

    /// Fetches a user by email.
    async fn user_by_email(&self, email: &str) -> StoreResult<User>;

    /// Fetches the owner of an unexpired token with the given scope and hash.
    async fn user_for_token(
        &self,
        scope: TokenScope,
        hash: &TokenHash,
        now: DateTime<Utc>,
    ) -> StoreResult<User>;

    /// Conditionally writes `user` and refreshes `user.version`.
    async fn update_user(&self, user: &mut User) -> StoreResult<()>;

    /// Stores a token hash.
    async fn insert_token(&self, token: &Token) -> StoreResult<()>;

    /// Deletes every token of `scope` owned by `user_id`.
    async fn delete_tokens_for_user(&self, scope: TokenScope, user_id: i64) -> StoreResult<()>;
}
