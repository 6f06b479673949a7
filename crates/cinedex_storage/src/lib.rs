//! # Cinedex Storage
//!
//! Implementations of the [`RecordStore`] and [`CredentialStore`]
//! collaborators.
//!
//! ## Design Principles
//!
//! - Backends hold durable state and perform the conditional write; they
//!   never take in-process locks on behalf of a caller across calls
//! - Time bounds and logging live in `cinedex_core`, not here
//! - Driver errors are classified into `NotFound`, `EditConflict`,
//!   transient and fatal failures
//!
//! ## Available Backends
//!
//! - [`MemoryBackend`] - For tests and database-less development
//! - [`PostgresBackend`] - For production use through an sqlx pool
//!
//! [`RecordStore`]: cinedex_core::RecordStore
//! [`CredentialStore`]: cinedex_core::CredentialStore

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod postgres;
mod schema;

pub use memory::MemoryBackend;
pub use postgres::{PostgresBackend, PostgresConfig};
pub use schema::MIGRATIONS;
