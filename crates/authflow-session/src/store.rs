//! Authorize-flow session store.
//!
//! [`SessionStore`] is the entry point used by the authorization endpoint and
//! its follow-up legs:
//!
//! 1. `create` when the authorization request arrives
//! 2. `get` to render login and consent screens
//! 3. `update` once the user has authenticated
//! 4. `consume` when the code or token is issued
//!
//! Sessions have a fixed lifetime from creation. No operation extends it.

use std::future::Future;
use std::sync::Arc;

use time::OffsetDateTime;

use crate::SessionResult;
use crate::backend::{AttachOutcome, InsertOutcome, SessionBackend};
use crate::config::{ConfigError, SessionStoreConfig};
use crate::error::SessionError;
use crate::key::{KeyGenerator, OsKeyGenerator, SessionKey};
use crate::model::{AuthenticatedUser, Authentication, OAuthParameters, SessionData, SessionRecord};
use crate::reaper::{ReaperHandle, SessionReaper};

/// Concurrency-safe, time-bounded store of authorize-flow sessions.
///
/// Cheap to clone; clones share the same backend.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    key_generator: Arc<dyn KeyGenerator>,
    config: SessionStoreConfig,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish()
    }
}

impl SessionStore {
    /// Creates a store over `backend`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `config` does not validate.
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        config: SessionStoreConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            backend,
            key_generator: Arc::new(OsKeyGenerator),
            config,
        })
    }

    /// Replaces the key generator.
    #[must_use]
    pub fn with_key_generator(mut self, key_generator: Arc<dyn KeyGenerator>) -> Self {
        self.key_generator = key_generator;
        self
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &SessionStoreConfig {
        &self.config
    }

    /// Returns the backend name.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Starts a background task that purges expired sessions every
    /// `cleanup_interval`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start_reaper(&self) -> ReaperHandle {
        SessionReaper::new(self.clone(), self.config.cleanup_interval).start()
    }

    /// Creates a session for an authorization request and returns its key.
    ///
    /// # Errors
    ///
    /// - `StoreUnavailable` if the backend cannot accept writes in time
    /// - `KeyGenerationFailed` if every generated key collided with a live
    ///   session
    pub async fn create(&self, params: OAuthParameters) -> SessionResult<SessionKey> {
        let attempts = self.config.key_generation_attempts;
        let data = SessionData::new(params);

        for attempt in 1..=attempts {
            let key = self.key_generator.generate();
            let now = OffsetDateTime::now_utc();
            let record = SessionRecord::new(data.clone(), now, self.config.ttl())
                .ok_or_else(|| {
                    SessionError::store_unavailable("session expiry is out of range")
                })?;

            match self
                .bounded("create", self.backend.insert(&key, record, now))
                .await?
            {
                InsertOutcome::Inserted => {
                    tracing::debug!(
                        key = %key.fingerprint(),
                        client_id = %data.oauth_parameters().client_id,
                        backend = self.backend.name(),
                        "Authorize session created"
                    );
                    return Ok(key);
                }
                InsertOutcome::Collision => {
                    tracing::warn!(
                        attempt,
                        backend = self.backend.name(),
                        "Generated session key collided with a live session"
                    );
                }
            }
        }

        tracing::error!(attempts, "Failed to generate a unique session key");
        Err(SessionError::key_generation_failed(attempts))
    }

    /// Returns the current state of a session.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` if the key is malformed, unknown, expired or
    ///   consumed
    /// - `StoreUnavailable` on backend failure or timeout
    pub async fn get(&self, key: &str) -> SessionResult<SessionData> {
        let key = Self::parse_key(key)?;
        let now = OffsetDateTime::now_utc();

        self.bounded("get", self.backend.fetch(&key, now))
            .await?
            .ok_or(SessionError::SessionNotFound)
    }

    /// Attaches the authentication outcome to a session.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` under the same rules as [`get`](Self::get)
    /// - `AlreadyAuthenticated` if a user is already attached
    /// - `StoreUnavailable` on backend failure or timeout; the outcome is then
    ///   unknown and must be re-checked with `get` before retrying
    pub async fn update(
        &self,
        key: &str,
        user: AuthenticatedUser,
        auth_time: OffsetDateTime,
    ) -> SessionResult<()> {
        let key = Self::parse_key(key)?;
        let now = OffsetDateTime::now_utc();
        let authentication = Authentication { user, auth_time };

        match self
            .bounded("update", self.backend.attach(&key, authentication, now))
            .await?
        {
            AttachOutcome::Attached => {
                tracing::debug!(key = %key.fingerprint(), "Authorize session authenticated");
                Ok(())
            }
            AttachOutcome::NotFound => Err(SessionError::SessionNotFound),
            AttachOutcome::AlreadyAuthenticated => {
                tracing::warn!(
                    key = %key.fingerprint(),
                    "Rejected second authentication for authorize session"
                );
                Err(SessionError::AlreadyAuthenticated)
            }
        }
    }

    /// Atomically reads and deletes a session.
    ///
    /// Used by the leg that issues the final response so a session can be
    /// redeemed only once.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` if already consumed, expired, unknown or malformed
    /// - `StoreUnavailable` on backend failure or timeout
    pub async fn consume(&self, key: &str) -> SessionResult<SessionData> {
        let key = Self::parse_key(key)?;
        let now = OffsetDateTime::now_utc();

        let data = self
            .bounded("consume", self.backend.take(&key, now))
            .await?
            .ok_or(SessionError::SessionNotFound)?;

        tracing::debug!(key = %key.fingerprint(), "Authorize session consumed");
        Ok(data)
    }

    /// Deletes expired sessions from the backend.
    ///
    /// Expired sessions are already invisible; this only reclaims storage.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` on backend failure or timeout.
    pub async fn purge_expired(&self) -> SessionResult<u64> {
        let now = OffsetDateTime::now_utc();
        let deleted = self
            .bounded("purge_expired", self.backend.purge_expired(now))
            .await?;

        if deleted > 0 {
            tracing::info!(
                deleted,
                backend = self.backend.name(),
                "Purged expired authorize sessions"
            );
        }
        Ok(deleted)
    }

    fn parse_key(key: &str) -> SessionResult<SessionKey> {
        SessionKey::parse(key).ok_or(SessionError::SessionNotFound)
    }

    /// Runs a backend operation under the configured timeout.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = SessionResult<T>>,
    ) -> SessionResult<T> {
        let timeout = self.config.operation_timeout;
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result.map_err(|e| e.during(operation)),
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = timeout.as_millis() as u64,
                    backend = self.backend.name(),
                    "Session backend operation timed out"
                );
                Err(
                    SessionError::store_unavailable(format!(
                        "{operation} timed out after {timeout:?}"
                    ))
                    .during(operation),
                )
            }
        }
    }
}
