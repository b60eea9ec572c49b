//! Session backend trait.
//!
//! A backend is the storage behind a [`SessionStore`](crate::SessionStore).
//! The store owns key generation, timeouts and logging; the backend owns
//! atomicity.
//!
//! # Implementation Notes
//!
//! Implementations must:
//!
//! - Perform every method as a single atomic step per key. In particular
//!   [`take`](SessionBackend::take) must read and delete in one operation so
//!   two concurrent callers can never both observe the session.
//! - Treat a record as absent once `now >= expires_at`, whether or not it has
//!   been physically removed.
//! - Never overwrite a live record on [`insert`](SessionBackend::insert).
//! - Leave no partial state if the returned future is dropped mid-operation.
//!
//! # Implementations
//!
//! - [`InMemorySessionBackend`](crate::memory::InMemorySessionBackend)
//! - PostgreSQL (in `authflow-session-postgres` crate)

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::SessionResult;
use crate::key::SessionKey;
use crate::model::{Authentication, SessionData, SessionRecord};

/// Result of [`SessionBackend::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was stored.
    Inserted,
    /// A live session already holds this key; nothing was written.
    Collision,
}

/// Result of [`SessionBackend::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// The authentication was attached.
    Attached,
    /// No live session holds this key.
    NotFound,
    /// The session already carries an authentication; nothing was written.
    AlreadyAuthenticated,
}

/// Storage trait for authorize-flow sessions.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Stores a new record under `key` unless a live record already holds it.
    ///
    /// An expired record under the same key may be replaced.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the backend cannot accept writes.
    async fn insert(
        &self,
        key: &SessionKey,
        record: SessionRecord,
        now: OffsetDateTime,
    ) -> SessionResult<InsertOutcome>;

    /// Returns the session if it exists and has not expired at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn fetch(&self, key: &SessionKey, now: OffsetDateTime)
    -> SessionResult<Option<SessionData>>;

    /// Attaches `authentication` to a live, unauthenticated session.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn attach(
        &self,
        key: &SessionKey,
        authentication: Authentication,
        now: OffsetDateTime,
    ) -> SessionResult<AttachOutcome>;

    /// Atomically removes and returns a live session.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn take(&self, key: &SessionKey, now: OffsetDateTime)
    -> SessionResult<Option<SessionData>>;

    /// Deletes sessions that expired at or before `now`.
    ///
    /// # Returns
    ///
    /// Returns the number of sessions deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup operation fails.
    async fn purge_expired(&self, now: OffsetDateTime) -> SessionResult<u64>;
}
