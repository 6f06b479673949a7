//! Table definitions.

use crate::error::map_sqlx_error;
use cinedex_core::StoreResult;
use sqlx::PgPool;

/// Statements run in order by [`migrate`]. Each one is idempotent.
pub const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS movies (
        id bigserial PRIMARY KEY,
        created_at timestamp(0) with time zone NOT NULL DEFAULT NOW(),
        title text NOT NULL,
        year integer NOT NULL,
        runtime integer NOT NULL,
        genres text[] NOT NULL,
        version integer NOT NULL DEFAULT 1
    )",
    "CREATE INDEX IF NOT EXISTS movies_title_idx ON movies USING GIN (to_tsvector('simple', title))",
    "CREATE INDEX IF NOT EXISTS movies_genres_idx ON movies USING GIN (genres)",
    "CREATE TABLE IF NOT EXISTS users (
        id bigserial PRIMARY KEY,
        created_at timestamp(0) with time zone NOT NULL DEFAULT NOW(),
        name text NOT NULL,
        email text NOT NULL,
        password_hash text NOT NULL,
        activated bool NOT NULL,
        version integer NOT NULL DEFAULT 1
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS users_email_key ON users (lower(email))",
    "CREATE TABLE IF NOT EXISTS tokens (
        hash bytea PRIMARY KEY,
        user_id bigint NOT NULL REFERENCES users ON DELETE CASCADE,
        expiry timestamp(0) with time zone NOT NULL,
        scope text NOT NULL
    )",
];

pub(crate) async fn migrate(pool: &PgPool) -> StoreResult<()> {
    for (step, statement) in MIGRATIONS.iter().enumerate() {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(map_sqlx_error)?;
        tracing::debug!(step, "migration applied");
    }
    tracing::info!(steps = MIGRATIONS.len(), "schema up to date");
    Ok(())
}
