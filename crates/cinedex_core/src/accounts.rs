//! Registration, activation and token issue.

use crate::catalog::{bounded, DEFAULT_OP_TIMEOUT};
use crate::error::{CoreError, CoreResult, StoreError, StoreResult};
use crate::store::CredentialStore;
use crate::token::{hash_plaintext, validate_token_plaintext, Token, TokenScope};
use crate::user::{
    hash_password, password_matches, validate_email, validate_password_plaintext,
    validate_registration, User, DEFAULT_PASSWORD_COST,
};
use crate::validator::{ValidationErrors, Validator};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for [`Accounts`].
#[derive(Debug, Clone)]
pub struct AccountsConfig {
    /// Bound on each backend operation.
    pub op_timeout: Duration,
    /// bcrypt cost for new passwords.
    pub password_cost: u32,
    /// Lifetime of activation tokens.
    pub activation_ttl: Duration,
    /// Lifetime of authentication tokens.
    pub authentication_ttl: Duration,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            op_timeout: DEFAULT_OP_TIMEOUT,
            password_cost: DEFAULT_PASSWORD_COST,
            activation_ttl: Duration::from_secs(3 * 24 * 60 * 60),
            authentication_ttl: Duration::from_secs(60 * 60),
        }
    }
}

impl AccountsConfig {
    /// Sets the per-operation timeout.
    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Sets the bcrypt cost.
    pub fn with_password_cost(mut self, cost: u32) -> Self {
        self.password_cost = cost;
        self
    }

    /// Sets the authentication token lifetime.
    pub fn with_authentication_ttl(mut self, ttl: Duration) -> Self {
        self.authentication_ttl = ttl;
        self
    }
}

/// User lifecycle over a [`CredentialStore`].
#[derive(Clone)]
pub struct Accounts {
    store: Arc<dyn CredentialStore>,
    config: AccountsConfig,
}

impl Accounts {
    /// Creates an account service over `store`.
    pub fn new(store: Arc<dyn CredentialStore>, config: AccountsConfig) -> Self {
        Self { store, config }
    }

    /// Registers a non-activated user and issues an activation token.
    ///
    /// The returned token plaintext is meant for the welcome notification.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> CoreResult<(User, Token)> {
        let mut v = Validator::new();
        validate_registration(&mut v, name, email, password);
        v.finish()?;

        let hash = self.hash(password).await?;
        let mut user = User::new(name, email, hash);

        match bounded("user.insert", self.config.op_timeout, self.store.insert_user(&mut user)).await {
            Ok(()) => {}
            Err(StoreError::DuplicateEmail) => {
                return Err(ValidationErrors::single(
                    "email",
                    "a user with this email address already exists",
                )
                .into());
            }
            Err(err) => return Err(err.into()),
        }

        let token = self.issue(user.id, self.config.activation_ttl, TokenScope::Activation).await?;
        tracing::info!(user_id = user.id, "user registered");
        Ok((user, token))
    }

    /// Activates the owner of an activation token.
    ///
    /// The user row is updated with the conditional-write protocol, so a
    /// concurrent change to the same user surfaces as `EditConflict`.
    pub async fn activate(&self, plaintext: &str) -> CoreResult<User> {
        let mut v = Validator::new();
        validate_token_plaintext(&mut v, plaintext);
        v.finish()?;

        let mut user = match self.user_for_token(TokenScope::Activation, plaintext).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                return Err(
                    ValidationErrors::single("token", "invalid or expired activation token").into(),
                );
            }
            Err(err) => return Err(err.into()),
        };

        user.activated = true;
        bounded("user.update", self.config.op_timeout, self.store.update_user(&mut user)).await?;
        bounded(
            "token.delete_for_user",
            self.config.op_timeout,
            self.store.delete_tokens_for_user(TokenScope::Activation, user.id),
        )
        .await?;

        tracing::info!(user_id = user.id, "user activated");
        Ok(user)
    }

    /// Checks email and password and issues an authentication token.
    pub async fn authenticate(&self, email: &str, password: &str) -> CoreResult<Token> {
        let mut v = Validator::new();
        validate_email(&mut v, email);
        validate_password_plaintext(&mut v, password);
        v.finish()?;

        let user = match bounded("user.by_email", self.config.op_timeout, self.store.user_by_email(email)).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Err(CoreError::InvalidCredentials),
            Err(err) => return Err(err.into()),
        };

        let password = password.to_string();
        let hash = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || password_matches(&password, &hash))
            .await
            .map_err(|e| CoreError::Hashing(e.to_string()))??;
        if !matches {
            return Err(CoreError::InvalidCredentials);
        }

        self.issue(user.id, self.config.authentication_ttl, TokenScope::Authentication)
            .await
    }

    /// Looks up the owner of an unexpired token.
    ///
    /// The plaintext is hashed here; the store only ever sees hashes.
    pub async fn user_for_token(&self, scope: TokenScope, plaintext: &str) -> StoreResult<User> {
        let hash = hash_plaintext(plaintext);
        bounded(
            "user.for_token",
            self.config.op_timeout,
            self.store.user_for_token(scope, &hash, Utc::now()),
        )
        .await
    }

    async fn issue(&self, user_id: i64, ttl: Duration, scope: TokenScope) -> CoreResult<Token> {
        let token = Token::generate(user_id, ttl, scope);
        bounded("token.insert", self.config.op_timeout, self.store.insert_token(&token)).await?;
        Ok(token)
    }

    async fn hash(&self, password: &str) -> CoreResult<String> {
        let password = password.to_string();
        let cost = self.config.password_cost;
        Ok(tokio::task::spawn_blocking(move || hash_password(&password, cost))
            .await
            .map_err(|e| CoreError::Hashing(e.to_string()))??)
    }
}
