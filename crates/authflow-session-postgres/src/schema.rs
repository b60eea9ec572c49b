//! Schema bootstrap for the session table.

use sqlx_core::query::query;

use crate::{PgPool, StorageResult};

/// Fully qualified session table name.
pub const SESSION_TABLE: &str = "authflow.authorize_sessions";

const STATEMENTS: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS authflow",
    r#"
    CREATE TABLE IF NOT EXISTS authflow.authorize_sessions (
        key_digest  TEXT PRIMARY KEY,
        data        JSONB NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL,
        expires_at  TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS authorize_sessions_expires_at_idx
        ON authflow.authorize_sessions (expires_at)
    "#,
];

/// Creates the schema, table and expiry index if they do not exist.
///
/// # Errors
///
/// Returns an error if any statement fails.
pub async fn ensure_schema(pool: &PgPool) -> StorageResult<()> {
    for statement in STATEMENTS {
        query(statement).execute(pool).await?;
    }
    tracing::info!(table = SESSION_TABLE, "Session schema ready");
    Ok(())
}
