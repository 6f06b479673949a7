//! Error types for catalog and credential operations.

use crate::validator::ValidationErrors;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for catalog and account operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while reading or writing persistent records.
///
/// Variants fall into three groups: outcomes the caller is expected to
/// handle (`NotFound`, `EditConflict`, `DuplicateEmail`), transient
/// infrastructure failures (`Unavailable`, `Timeout`) and defects (`Fatal`).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("record not found")]
    NotFound,

    /// A conditional write matched no row: the submitted version is stale.
    #[error("edit conflict")]
    EditConflict,

    /// A user with this email address already exists.
    #[error("duplicate email")]
    DuplicateEmail,

    /// The storage backend could not be reached. Safe to retry.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The operation exceeded its time bound. Safe to retry.
    #[error("storage operation timed out")]
    Timeout,

    /// Malformed query, schema mismatch or corrupt row. Not retryable.
    #[error("fatal storage error: {0}")]
    Fatal(String),
}

impl StoreError {
    /// Returns true if retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout)
    }

    /// Returns true if the error indicates a defect rather than a runtime condition.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Fatal(_))
    }
}

/// Errors returned by [`Catalog`](crate::Catalog) and [`Accounts`](crate::Accounts).
#[derive(Debug, Error)]
pub enum CoreError {
    /// The persistent collaborator failed or reported an outcome.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Input failed validation.
    #[error("validation failed: {0}")]
    Invalid(ValidationErrors),

    /// Email and password did not match a user.
    #[error("invalid authentication credentials")]
    InvalidCredentials,

    /// Password hashing failed.
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

impl From<ValidationErrors> for CoreError {
    fn from(errors: ValidationErrors) -> Self {
        CoreError::Invalid(errors)
    }
}

impl From<bcrypt::BcryptError> for CoreError {
    fn from(err: bcrypt::BcryptError) -> Self {
        CoreError::Hashing(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(StoreError::Timeout.is_transient());
        assert!(StoreError::Unavailable("refused".into()).is_transient());
        assert!(!StoreError::EditConflict.is_transient());
        assert!(!StoreError::NotFound.is_transient());
        assert!(StoreError::Fatal("bad column".into()).is_fatal());
        assert!(!StoreError::Timeout.is_fatal());
    }

    #[test]
    fn error_display() {
        assert_eq!(StoreError::EditConflict.to_string(), "edit conflict");
        assert_eq!(StoreError::NotFound.to_string(), "record not found");
        assert_eq!(
            CoreError::from(StoreError::EditConflict).to_string(),
            "edit conflict"
        );
    }
}
