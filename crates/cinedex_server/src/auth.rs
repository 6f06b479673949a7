//! Bearer-token authentication.
//!
//! ## Credential Format
//!
//! `Authorization: Bearer <token>` where `<token>` is the 32 hex digit
//! plaintext issued by `POST /v1/tokens/authentication`.
//!
//! ## Resolution
//!
//! 1. No header: the request proceeds as [`Principal::Anonymous`]
//! 2. Wrong shape or scheme: [`AuthOutcome::MalformedCredential`]
//! 3. Token fails the surface check: [`AuthOutcome::InvalidOrExpiredCredential`]
//! 4. Lookup finds nothing: [`AuthOutcome::InvalidOrExpiredCredential`]
//! 5. Lookup fails for any other reason: [`AuthOutcome::LookupFailure`]
//!
//! Responses always carry `Vary: Authorization`, whatever the outcome.

use crate::error::ServerError;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use cinedex_core::token::is_well_formed;
use cinedex_core::{Accounts, Principal, StoreError, TokenScope};
use std::sync::Arc;

/// How a request's credential was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// No credential was presented.
    Anonymous,
    /// The credential resolved to a user.
    Authenticated,
    /// The header was not `Bearer <token>`.
    MalformedCredential,
    /// The token is malformed, unknown or expired.
    InvalidOrExpiredCredential,
    /// The credential store could not answer.
    LookupFailure,
}

impl AuthOutcome {
    /// Returns the rejection for this outcome, if the request must stop.
    pub fn rejection(self) -> Option<ServerError> {
        match self {
            AuthOutcome::Anonymous | AuthOutcome::Authenticated => None,
            AuthOutcome::MalformedCredential | AuthOutcome::InvalidOrExpiredCredential => {
                Some(ServerError::InvalidToken)
            }
            AuthOutcome::LookupFailure => Some(ServerError::Internal(
                "credential lookup failed".to_string(),
            )),
        }
    }
}

/// Resolves the `Authorization` header to a [`Principal`].
#[derive(Clone)]
pub struct Authenticator {
    accounts: Accounts,
}

impl Authenticator {
    /// Creates an authenticator over the account service.
    pub fn new(accounts: Accounts) -> Self {
        Self { accounts }
    }

    /// Resolves a credential header.
    ///
    /// The principal is [`Principal::Anonymous`] unless the outcome is
    /// [`AuthOutcome::Authenticated`].
    pub async fn resolve(&self, authorization: Option<&HeaderValue>) -> (Principal, AuthOutcome) {
        let Some(value) = authorization else {
            return (Principal::Anonymous, AuthOutcome::Anonymous);
        };

        let Some(token) = value.to_str().ok().and_then(bearer_token) else {
            tracing::debug!("malformed authorization header");
            return (Principal::Anonymous, AuthOutcome::MalformedCredential);
        };

        if !is_well_formed(token) {
            tracing::debug!("authentication token failed surface check");
            return (Principal::Anonymous, AuthOutcome::InvalidOrExpiredCredential);
        }

        match self
            .accounts
            .user_for_token(TokenScope::Authentication, token)
            .await
        {
            Ok(user) => (
                Principal::identified(&user, TokenScope::Authentication),
                AuthOutcome::Authenticated,
            ),
            Err(StoreError::NotFound) => {
                tracing::debug!("unknown or expired authentication token");
                (Principal::Anonymous, AuthOutcome::InvalidOrExpiredCredential)
            }
            Err(err) => {
                tracing::warn!(error = %err, "credential lookup failed");
                (Principal::Anonymous, AuthOutcome::LookupFailure)
            }
        }
    }
}

/// Splits `Bearer <token>`; anything else is `None`.
fn bearer_token(header: &str) -> Option<&str> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Some(token),
        _ => None,
    }
}

/// Middleware attaching the resolved [`Principal`] to the request.
pub async fn authenticate(
    State(auth): State<Arc<Authenticator>>,
    mut request: Request,
    next: Next,
) -> Response {
    let (principal, outcome) = auth
        .resolve(request.headers().get(header::AUTHORIZATION))
        .await;

    let mut response = match outcome.rejection() {
        Some(err) => err.into_response(),
        None => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
    };

    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

/// Middleware admitting only activated users.
///
/// Runs after [`authenticate`] and only inspects the principal it attached.
pub async fn require_activated(request: Request, next: Next) -> Response {
    let principal = request
        .extensions()
        .get::<Principal>()
        .cloned()
        .unwrap_or(Principal::Anonymous);

    match principal.identity() {
        None => ServerError::AuthenticationRequired.into_response(),
        Some(identity) if !identity.activated => {
            tracing::debug!(user_id = identity.id, "inactive account rejected");
            ServerError::InactiveAccount.into_response()
        }
        Some(_) => next.run(request).await,
    }
}
