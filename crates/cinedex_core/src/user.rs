//! Users and password handling.

use crate::validator::{is_email, Validator};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// bcrypt cost used for stored passwords.
pub const DEFAULT_PASSWORD_COST: u32 = 12;

/// A registered user.
///
/// Users carry a `version` and are updated with the same conditional-write
/// protocol as movies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Unique id assigned by the store.
    pub id: i64,
    /// Registration time.
    pub created_at: DateTime<Utc>,
    /// Display name.
    pub name: String,
    /// Login email, unique across users.
    pub email: String,
    /// bcrypt hash of the password.
    #[serde(skip)]
    pub password_hash: String,
    /// Whether the account has been activated.
    pub activated: bool,
    /// Optimistic concurrency version.
    #[serde(skip)]
    pub version: i32,
}

impl User {
    /// Creates an unsaved, non-activated user.
    pub fn new(name: impl Into<String>, email: impl Into<String>, password_hash: String) -> Self {
        Self {
            id: 0,
            created_at: Utc::now(),
            name: name.into(),
            email: email.into(),
            password_hash,
            activated: false,
            version: 1,
        }
    }
}

/// Hashes `plaintext` with bcrypt at `cost`.
pub fn hash_password(plaintext: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(plaintext, cost)
}

/// Returns true if `plaintext` matches the stored `hash`.
///
/// A mismatch is `Ok(false)`; only a malformed hash is an error.
pub fn password_matches(plaintext: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    bcrypt::verify(plaintext, hash)
}

/// Records an `email` error when `email` is missing or malformed.
pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(is_email(email), "email", "must be a valid email address");
}

/// Records a `password` error when `plaintext` is out of bounds.
pub fn validate_password_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "password", "must be provided");
    v.check(
        plaintext.len() >= 8,
        "password",
        "must be at least 8 bytes long",
    );
    v.check(
        plaintext.len() <= 72,
        "password",
        "must not be more than 72 bytes long",
    );
}

/// Checks the fields of a new registration.
pub fn validate_registration(v: &mut Validator, name: &str, email: &str, password: &str) {
    v.check(!name.is_empty(), "name", "must be provided");
    v.check(name.len() >= 5, "name", "must be at least 5 bytes long");
    v.check(
        name.len() <= 500,
        "name",
        "must not be more than 500 bytes long",
    );
    validate_email(v, email);
    validate_password_plaintext(v, password);
}
