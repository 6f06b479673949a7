//! # Cinedex Core
//!
//! Domain model and record-level concurrency control for the cinedex API.
//!
//! This crate provides:
//! - Movie, user and token types with their validation rules
//! - The [`RecordStore`] and [`CredentialStore`] collaborator traits
//! - [`Catalog`]: version-checked reads and conditional writes of movies
//! - [`Accounts`]: registration, activation and bearer-token issue
//! - [`Clock`] abstractions for deterministic time in tests
//!
//! ## Concurrency Model
//!
//! Records carry a `version` counter that starts at 1. Writers read a
//! record, modify it and submit it back; the backend applies the write only
//! if the stored version still equals the one read. Exactly one of several
//! writers racing from the same version succeeds and every other one
//! observes [`StoreError::EditConflict`].
//!
//! ## Example
//!
//! ```rust,ignore
//! let catalog = Catalog::new(store, CatalogConfig::default());
//! let mut movie = catalog.get(42).await?;
//! movie.title = "Heat".into();
//! match catalog.update(&mut movie).await {
//!     Ok(version) => println!("now at version {version}"),
//!     Err(StoreError::EditConflict) => println!("someone else got there first"),
//!     Err(err) => return Err(err.into()),
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod accounts;
mod catalog;
mod clock;
mod error;
pub mod filters;
pub mod movie;
mod principal;
mod store;
pub mod token;
pub mod user;
pub mod validator;

pub use accounts::{Accounts, AccountsConfig};
pub use catalog::{Catalog, CatalogConfig, DEFAULT_OP_TIMEOUT};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, CoreResult, StoreError, StoreResult};
pub use filters::{Filters, Metadata, MovieQuery, SortDirection, MOVIE_SORT_SAFELIST};
pub use movie::{Movie, MovieInput, MoviePatch, Runtime};
pub use principal::{Identity, Principal};
pub use store::{CredentialStore, RecordStore};
pub use token::{Token, TokenHash, TokenScope};
pub use user::User;
pub use validator::{ValidationErrors, Validator};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
