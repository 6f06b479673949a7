//! CLI command implementations.

pub mod migrate;
pub mod serve;

use cinedex_core::StoreError;
use cinedex_server::ServerError;
use thiserror::Error;

/// Errors surfaced to the process exit path.
#[derive(Debug, Error)]
pub enum CliError {
    /// A flag combination cannot be honoured.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The storage backend failed to start or migrate.
    #[error("storage: {0}")]
    Store(#[from] StoreError),

    /// The server failed or did not shut down cleanly.
    #[error("server: {0}")]
    Server(#[from] ServerError),

    /// Binding the listener failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;
