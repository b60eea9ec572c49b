//! PostgreSQL storage for authorize-flow sessions.
//!
//! Each [`SessionBackend`] method maps to exactly one statement:
//!
//! - `insert` - `INSERT ... ON CONFLICT DO UPDATE ... WHERE expired`
//! - `fetch` - `SELECT ... WHERE expires_at > now`
//! - `attach` - one CTE that locks, classifies and updates the row
//! - `take` - `DELETE ... RETURNING`
//! - `purge_expired` - `DELETE ... WHERE expires_at <= now`
//!
//! The current time is bound by the caller rather than read from `NOW()`, so
//! expiry is judged by the same clock for every backend.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;

use authflow_session::{
    AttachOutcome, Authentication, InsertOutcome, SessionBackend, SessionData, SessionKey,
    SessionRecord, SessionResult,
};

use crate::{PgPool, StorageResult, schema};

/// PostgreSQL session backend.
///
/// Owns an `Arc<PgPool>` so it can be shared as `Arc<dyn SessionBackend>`.
#[derive(Debug, Clone)]
pub struct PostgresSessionBackend {
    pool: Arc<PgPool>,
}

impl PostgresSessionBackend {
    /// Create a new backend with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create a new backend by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Ok(Self::new(crate::connect(database_url).await?))
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the session table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub async fn ensure_schema(&self) -> StorageResult<()> {
        schema::ensure_schema(&self.pool).await
    }

    async fn insert_row(
        &self,
        key: &SessionKey,
        record: SessionRecord,
        now: OffsetDateTime,
    ) -> StorageResult<InsertOutcome> {
        let data = serde_json::to_value(&record.data)?;

        // A conflicting row is replaced only if it has already expired.
        let row: Option<(String,)> = query_as(
            r#"
            INSERT INTO authflow.authorize_sessions
                (key_digest, data, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (key_digest) DO UPDATE
                SET data = EXCLUDED.data,
                    created_at = EXCLUDED.created_at,
                    expires_at = EXCLUDED.expires_at
                WHERE authflow.authorize_sessions.expires_at <= $5
            RETURNING key_digest
            "#,
        )
        .bind(key.digest())
        .bind(&data)
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(now)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(match row {
            Some(_) => InsertOutcome::Inserted,
            None => InsertOutcome::Collision,
        })
    }

    async fn fetch_row(
        &self,
        key: &SessionKey,
        now: OffsetDateTime,
    ) -> StorageResult<Option<SessionData>> {
        let row: Option<(serde_json::Value,)> = query_as(
            r#"
            SELECT data
            FROM authflow.authorize_sessions
            WHERE key_digest = $1 AND expires_at > $2
            "#,
        )
        .bind(key.digest())
        .bind(now)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(|(data,)| serde_json::from_value(data))
            .transpose()
            .map_err(Into::into)
    }

    async fn attach_row(
        &self,
        key: &SessionKey,
        authentication: Authentication,
        now: OffsetDateTime,
    ) -> StorageResult<AttachOutcome> {
        let authentication = serde_json::to_value(&authentication)?;

        // `FOR UPDATE` serializes concurrent attaches; a row deleted by a
        // concurrent consume drops out of `target` entirely.
        let row: Option<(bool, bool)> = query_as(
            r#"
            WITH target AS (
                SELECT key_digest, (data -> 'authentication') IS NOT NULL AS authenticated
                FROM authflow.authorize_sessions
                WHERE key_digest = $1 AND expires_at > $3
                FOR UPDATE
            ),
            updated AS (
                UPDATE authflow.authorize_sessions s
                SET data = jsonb_set(s.data, '{authentication}', $2)
                FROM target
                WHERE s.key_digest = target.key_digest AND NOT target.authenticated
                RETURNING s.key_digest
            )
            SELECT target.authenticated, EXISTS (SELECT 1 FROM updated)
            FROM target
            "#,
        )
        .bind(key.digest())
        .bind(&authentication)
        .bind(now)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(match row {
            None => AttachOutcome::NotFound,
            Some((_, true)) => AttachOutcome::Attached,
            Some((_, false)) => AttachOutcome::AlreadyAuthenticated,
        })
    }

    async fn take_row(
        &self,
        key: &SessionKey,
        now: OffsetDateTime,
    ) -> StorageResult<Option<SessionData>> {
        let row: Option<(serde_json::Value,)> = query_as(
            r#"
            DELETE FROM authflow.authorize_sessions
            WHERE key_digest = $1 AND expires_at > $2
            RETURNING data
            "#,
        )
        .bind(key.digest())
        .bind(now)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(|(data,)| serde_json::from_value(data))
            .transpose()
            .map_err(Into::into)
    }

    async fn purge_rows(&self, now: OffsetDateTime) -> StorageResult<u64> {
        let result = query(
            r#"
            DELETE FROM authflow.authorize_sessions
            WHERE expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SessionBackend for PostgresSessionBackend {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn insert(
        &self,
        key: &SessionKey,
        record: SessionRecord,
        now: OffsetDateTime,
    ) -> SessionResult<InsertOutcome> {
        Ok(self.insert_row(key, record, now).await?)
    }

    async fn fetch(
        &self,
        key: &SessionKey,
        now: OffsetDateTime,
    ) -> SessionResult<Option<SessionData>> {
        Ok(self.fetch_row(key, now).await?)
    }

    async fn attach(
        &self,
        key: &SessionKey,
        authentication: Authentication,
        now: OffsetDateTime,
    ) -> SessionResult<AttachOutcome> {
        Ok(self.attach_row(key, authentication, now).await?)
    }

    async fn take(
        &self,
        key: &SessionKey,
        now: OffsetDateTime,
    ) -> SessionResult<Option<SessionData>> {
        Ok(self.take_row(key, now).await?)
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> SessionResult<u64> {
        Ok(self.purge_rows(now).await?)
    }
}
