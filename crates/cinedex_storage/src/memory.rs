//! In-memory record and credential backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cinedex_core::{
    CredentialStore, Movie, MovieQuery, RecordStore, StoreError, StoreResult, Token, TokenHash,
    TokenScope, User,
};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

/// An in-memory backend implementing both collaborator traits.
///
/// This backend is suitable for:
/// - Unit and integration tests
/// - Running the server without a database (`--storage memory`)
///
/// # Conditional Writes
///
/// `update` and `update_user` compare the submitted version with the stored
/// one and bump it under a single write lock, so concurrent writers from the
/// same version see exactly one success.
///
/// # Example
///
/// ```rust,ignore
/// use cinedex_storage::MemoryBackend;
/// use std::sync::Arc;
///
/// let backend = Arc::new(MemoryBackend::new());
/// let catalog = Catalog::new(backend.clone(), CatalogConfig::default());
/// ```
#[derive(Debug, Default)]
pub struct MemoryBackend {
    movies: RwLock<Table<Movie>>,
    users: RwLock<Table<User>>,
    tokens: RwLock<HashMap<TokenHash, StoredToken>>,
    offline: AtomicBool,
}

#[derive(Debug)]
struct Table<T> {
    rows: BTreeMap<i64, T>,
    next_id: i64,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<T> Table<T> {
    fn allocate(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[derive(Debug, Clone)]
struct StoredToken {
    user_id: i64,
    expiry: DateTime<Utc>,
    scope: TokenScope,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates losing (or regaining) the connection to storage.
    ///
    /// While offline every operation fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, AtomicOrdering::SeqCst);
    }

    /// Returns the number of stored movies.
    #[must_use]
    pub fn movie_count(&self) -> usize {
        self.movies.read().rows.len()
    }

    /// Returns the number of stored tokens.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.tokens.read().len()
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Unavailable("memory backend offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryBackend {
    async fn insert(&self, movie: &mut Movie) -> StoreResult<()> {
        self.check_online()?;
        let mut movies = self.movies.write();
        movie.id = movies.allocate();
        movie.created_at = Utc::now();
        movie.version = 1;
        movies.rows.insert(movie.id, movie.clone());
        Ok(())
    }

    async fn get(&self, id: i64) -> StoreResult<Movie> {
        self.check_online()?;
        self.movies
            .read()
            .rows
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, movie: &mut Movie) -> StoreResult<()> {
        self.check_online()?;
        let mut movies = self.movies.write();
        let stored = match movies.rows.get_mut(&movie.id) {
            Some(stored) if stored.version == movie.version => stored,
            _ => return Err(StoreError::EditConflict),
        };

        stored.title.clone_from(&movie.title);
        stored.year = movie.year;
        stored.runtime = movie.runtime;
        stored.genres.clone_from(&movie.genres);
        stored.version += 1;
        movie.version = stored.version;
        Ok(())
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        self.check_online()?;
        self.movies
            .write()
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn list(&self, query: &MovieQuery) -> StoreResult<(Vec<Movie>, u64)> {
        self.check_online()?;
        let words = title_words(&query.title);
        let mut matches: Vec<Movie> = self
            .movies
            .read()
            .rows
            .values()
            .filter(|movie| matches_title(movie, &words) && matches_genres(movie, &query.genres))
            .cloned()
            .collect();

        let column = query.filters.sort_column();
        let descending = query.filters.sort.starts_with('-');
        matches.sort_by(|a, b| {
            let primary = compare_by(column, a, b);
            let primary = if descending { primary.reverse() } else { primary };
            primary.then_with(|| a.id.cmp(&b.id))
        });

        let total = matches.len() as u64;
        let offset = usize::try_from(query.filters.offset()).unwrap_or(usize::MAX);
        let page = matches
            .into_iter()
            .skip(offset)
            .take(query.filters.limit() as usize)
            .collect();
        Ok((page, total))
    }
}

fn title_words(title: &str) -> Vec<String> {
    title.split_whitespace().map(str::to_lowercase).collect()
}

/// Every query word must appear as a word of the title, ignoring case.
fn matches_title(movie: &Movie, words: &[String]) -> bool {
    if words.is_empty() {
        return true;
    }
    let title = title_words(&movie.title);
    words.iter().all(|w| title.contains(w))
}

/// The movie must carry every requested genre.
fn matches_genres(movie: &Movie, genres: &[String]) -> bool {
    genres.iter().all(|g| movie.genres.contains(g))
}

fn compare_by(column: &str, a: &Movie, b: &Movie) -> Ordering {
    match column {
        "title" => a.title.cmp(&b.title),
        "year" => a.year.cmp(&b.year),
        "runtime" => a.runtime.cmp(&b.runtime),
        _ => a.id.cmp(&b.id),
    }
}

#[async_trait]
impl CredentialStore for MemoryBackend {
    async fn insert_user(&self, user: &mut User) -> StoreResult<()> {
        self.check_online()?;
        let mut users = self.users.write();
        if users
            .rows
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::DuplicateEmail);
        }
        user.id = users.allocate();
        user.created_at = Utc::now();
        user.version = 1;
        users.rows.insert(user.id, user.clone());
        Ok(())
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<User> {
        self.check_online()?;
        self.users
            .read()
            .rows
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn user_for_token(
        &self,
        scope: TokenScope,
        hash: &TokenHash,
        now: DateTime<Utc>,
    ) -> StoreResult<User> {
        self.check_online()?;
        let user_id = match self.tokens.read().get(hash) {
            Some(token) if token.scope == scope && token.expiry > now => token.user_id,
            _ => return Err(StoreError::NotFound),
        };
        self.users
            .read()
            .rows
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_user(&self, user: &mut User) -> StoreResult<()> {
        self.check_online()?;
        let mut users = self.users.write();
        if users
            .rows
            .values()
            .any(|u| u.id != user.id && u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::DuplicateEmail);
        }
        let stored = match users.rows.get_mut(&user.id) {
            Some(stored) if stored.version == user.version => stored,
            _ => return Err(StoreError::EditConflict),
        };

        stored.name.clone_from(&user.name);
        stored.email.clone_from(&user.email);
        stored.password_hash.clone_from(&user.password_hash);
        stored.activated = user.activated;
        stored.version += 1;
        user.version = stored.version;
        Ok(())
    }

    async fn insert_token(&self, token: &Token) -> StoreResult<()> {
        self.check_online()?;
        if !self.users.read().rows.contains_key(&token.user_id) {
            return Err(StoreError::Fatal(format!(
                "token references unknown user {}",
                token.user_id
            )));
        }
        self.tokens.write().insert(
            token.hash,
            StoredToken {
                user_id: token.user_id,
                expiry: token.expiry,
                scope: token.scope,
            },
        );
        Ok(())
    }

    async fn delete_tokens_for_user(&self, scope: TokenScope, user_id: i64) -> StoreResult<()> {
        self.check_online()?;
        self.tokens
            .write()
            .retain(|_, t| !(t.scope == scope && t.user_id == user_id));
        Ok(())
    }
}
