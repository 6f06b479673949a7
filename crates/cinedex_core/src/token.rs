//! Opaque bearer tokens.
//!
//! ## Token Format
//!
//! The plaintext is 16 random bytes hex-encoded (32 lowercase hex digits).
//! Only the SHA-256 of the plaintext is stored, so a leaked token table
//! cannot be replayed.

use crate::validator::Validator;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

/// Length of a token plaintext in characters.
pub const TOKEN_PLAINTEXT_LEN: usize = 32;

/// What a token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenScope {
    /// One-shot account activation.
    Activation,
    /// Bearer credential for API requests.
    Authentication,
}

impl TokenScope {
    /// Returns the stored name of the scope.
    pub fn as_str(self) -> &'static str {
        match self {
            TokenScope::Activation => "activation",
            TokenScope::Authentication => "authentication",
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SHA-256 of a token plaintext.
pub type TokenHash = [u8; 32];

/// An issued token. The plaintext is only available right after issue.
#[derive(Clone, Serialize)]
pub struct Token {
    /// Plaintext handed to the client.
    #[serde(rename = "token")]
    pub plaintext: String,
    /// Stored hash of the plaintext.
    #[serde(skip)]
    pub hash: TokenHash,
    /// Owning user.
    #[serde(skip)]
    pub user_id: i64,
    /// Expiry time.
    pub expiry: DateTime<Utc>,
    /// Scope.
    #[serde(skip)]
    pub scope: TokenScope,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("user_id", &self.user_id)
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl Token {
    /// Generates a fresh random token for `user_id`, valid for `ttl`.
    pub fn generate(user_id: i64, ttl: Duration, scope: TokenScope) -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let plaintext = hex::encode(bytes);
        let hash = hash_plaintext(&plaintext);
        let now = Utc::now();
        let expiry = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            plaintext,
            hash,
            user_id,
            expiry,
            scope,
        }
    }
}

/// Hashes a token plaintext for lookup.
pub fn hash_plaintext(plaintext: &str) -> TokenHash {
    Sha256::digest(plaintext.as_bytes()).into()
}

/// Returns true if `plaintext` has the surface form of an issued token.
///
/// This is a cheap check done before any lookup.
pub fn is_well_formed(plaintext: &str) -> bool {
    plaintext.len() == TOKEN_PLAINTEXT_LEN && plaintext.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Records a `token` error when `plaintext` is missing or malformed.
pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(
        plaintext.len() == TOKEN_PLAINTEXT_LEN,
        "token",
        "must be 32 bytes long",
    );
    v.check(is_well_formed(plaintext), "token", "must be hexadecimal");
}
