//! PostgreSQL backend for authflow-session.
//!
//! Sessions are stored in `authflow.authorize_sessions`, keyed by the SHA-256
//! digest of the session key. Every backend operation is a single SQL
//! statement, so concurrent workers sharing the database observe each
//! session change atomically.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use authflow_session::{SessionStore, SessionStoreConfig};
//! use authflow_session_postgres::PostgresSessionBackend;
//!
//! let backend = PostgresSessionBackend::connect("postgres://localhost/authflow").await?;
//! backend.ensure_schema().await?;
//!
//! let store = SessionStore::new(Arc::new(backend), SessionStoreConfig::default())?;
//! ```

pub mod authorize_session;
pub mod schema;

use std::sync::Arc;

use authflow_session::SessionError;
use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;

pub use authorize_session::PostgresSessionBackend;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during session storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Returns `true` if this is a database error.
    #[must_use]
    pub fn is_database_error(&self) -> bool {
        matches!(self, Self::Database(_))
    }

    /// Returns `true` if this is a serialization error.
    #[must_use]
    pub fn is_serialization_error(&self) -> bool {
        matches!(self, Self::Serialization(_))
    }
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Database(e) => {
                tracing::error!(error = %e, "Session database operation failed");
                SessionError::store_unavailable(e.to_string())
            }
            StorageError::Serialization(e) => SessionError::serialization(e.to_string()),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Opens a connection pool.
///
/// # Errors
///
/// Returns an error if the connection fails.
pub async fn connect(database_url: &str) -> StorageResult<Arc<PgPool>> {
    use sqlx_core::pool::PoolOptions;
    let pool = PoolOptions::<Postgres>::new().connect(database_url).await?;
    Ok(Arc::new(pool))
}
