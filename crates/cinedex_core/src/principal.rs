//! The identity attached to a request.

use crate::token::TokenScope;
use crate::user::User;

/// Who is making a request.
///
/// Anonymous is a variant, not a shared sentinel instance: code asks
/// [`Principal::is_anonymous`] instead of comparing identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// No credential was presented.
    Anonymous,
    /// A credential resolved to this user.
    Identified(Identity),
}

/// A resolved user as seen by request handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// User id.
    pub id: i64,
    /// Login email.
    pub email: String,
    /// Whether the account has been activated.
    pub activated: bool,
    /// Scope of the token the user presented.
    pub scope: TokenScope,
}

impl Principal {
    /// Identifies `user` through a token of `scope`.
    pub fn identified(user: &User, scope: TokenScope) -> Self {
        Principal::Identified(Identity {
            id: user.id,
            email: user.email.clone(),
            activated: user.activated,
            scope,
        })
    }

    /// Returns true for the anonymous principal.
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }

    /// Returns the identity, if any.
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Principal::Anonymous => None,
            Principal::Identified(identity) => Some(identity),
        }
    }

    /// Returns true if the principal is an activated user.
    pub fn is_activated(&self) -> bool {
        self.identity().is_some_and(|identity| identity.activated)
    }
}
