//! Classification of driver errors.

use cinedex_core::StoreError;

/// Maps a driver error onto the store taxonomy.
///
/// Connectivity problems are transient. A missing row is `NotFound`; callers
/// of conditional writes remap it to `EditConflict` themselves.
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateEmail,
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StoreError::Unavailable(err.to_string()),
        other => StoreError::Fatal(other.to_string()),
    }
}
