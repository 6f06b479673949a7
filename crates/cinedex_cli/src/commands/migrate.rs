//! Schema migration command.

use super::CliResult;
use cinedex_storage::{PostgresBackend, PostgresConfig, MIGRATIONS};
use tracing::info;

/// Applies every migration statement to the database at `dsn`.
///
/// Statements are idempotent, so running this twice is harmless.
pub async fn run(dsn: &str) -> CliResult<()> {
    let backend = PostgresBackend::connect(&PostgresConfig::new(dsn).with_max_connections(1)).await?;
    info!(statements = MIGRATIONS.len(), "applying schema");
    let result = backend.migrate().await;
    backend.close().await;
    result?;

    println!("Applied {} schema statements.", MIGRATIONS.len());
    Ok(())
}
