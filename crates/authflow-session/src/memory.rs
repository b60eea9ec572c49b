//! In-memory session backend using DashMap.
//!
//! Sessions live in a sharded concurrent map. Operations on one key take only
//! that key's shard lock and never await while holding it, so a dropped
//! future cannot leave a half-applied change behind.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;

use crate::SessionResult;
use crate::backend::{AttachOutcome, InsertOutcome, SessionBackend};
use crate::error::SessionError;
use crate::key::SessionKey;
use crate::model::{Authentication, SessionData, SessionRecord};

/// Local in-memory session backend.
///
/// Suitable for a single process. Several workers behind a load balancer need
/// a shared backend such as PostgreSQL.
#[derive(Debug, Default)]
pub struct InMemorySessionBackend {
    sessions: DashMap<String, SessionRecord>,
    /// Records held plus in-flight insert reservations. Never below the
    /// number of records actually held.
    reserved: AtomicUsize,
    max_sessions: Option<usize>,
}

impl InMemorySessionBackend {
    /// Creates an unbounded backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that holds at most `max_sessions` records.
    ///
    /// When full, expired records are purged first; if the map is still full
    /// the insert fails with `StoreUnavailable`. The limit holds under
    /// concurrent inserts.
    #[must_use]
    pub fn with_capacity_limit(max_sessions: usize) -> Self {
        Self {
            max_sessions: Some(max_sessions),
            ..Self::default()
        }
    }

    /// Number of records held, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no records are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn purge(&self, now: OffsetDateTime) -> u64 {
        let mut removed = 0usize;
        self.sessions.retain(|_, record| {
            let keep = !record.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        self.release(removed);
        removed as u64
    }

    fn release(&self, count: usize) {
        if count > 0 {
            self.reserved.fetch_sub(count, Ordering::AcqRel);
        }
    }

    fn try_reserve(&self) -> bool {
        let Some(max) = self.max_sessions else {
            self.reserved.fetch_add(1, Ordering::AcqRel);
            return true;
        };
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .is_ok()
    }

    /// Reserves room for one record, purging expired records once if full.
    fn reserve(&self, now: OffsetDateTime) -> SessionResult<()> {
        if self.try_reserve() {
            return Ok(());
        }

        let removed = self.purge(now);
        if self.try_reserve() {
            tracing::debug!(removed, "Purged expired sessions to make room");
            return Ok(());
        }

        tracing::warn!(
            max_sessions = ?self.max_sessions,
            "In-memory session store at capacity, rejecting new session"
        );
        Err(SessionError::store_unavailable(
            "in-memory session store is at capacity",
        ))
    }
}

#[async_trait]
impl SessionBackend for InMemorySessionBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert(
        &self,
        key: &SessionKey,
        record: SessionRecord,
        now: OffsetDateTime,
    ) -> SessionResult<InsertOutcome> {
        self.reserve(now)?;

        match self.sessions.entry(key.as_str().to_string()) {
            Entry::Occupied(mut entry) => {
                // Either way the record count is unchanged.
                let outcome = if entry.get().is_expired(now) {
                    entry.insert(record);
                    InsertOutcome::Inserted
                } else {
                    InsertOutcome::Collision
                };
                self.release(1);
                Ok(outcome)
            }
            Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn fetch(
        &self,
        key: &SessionKey,
        now: OffsetDateTime,
    ) -> SessionResult<Option<SessionData>> {
        Ok(self
            .sessions
            .get(key.as_str())
            .filter(|record| !record.is_expired(now))
            .map(|record| record.data.clone()))
    }

    async fn attach(
        &self,
        key: &SessionKey,
        authentication: Authentication,
        now: OffsetDateTime,
    ) -> SessionResult<AttachOutcome> {
        let Some(mut record) = self.sessions.get_mut(key.as_str()) else {
            return Ok(AttachOutcome::NotFound);
        };
        if record.is_expired(now) {
            return Ok(AttachOutcome::NotFound);
        }

        if record.data.attach(authentication) {
            Ok(AttachOutcome::Attached)
        } else {
            Ok(AttachOutcome::AlreadyAuthenticated)
        }
    }

    async fn take(
        &self,
        key: &SessionKey,
        now: OffsetDateTime,
    ) -> SessionResult<Option<SessionData>> {
        let removed = self
            .sessions
            .remove_if(key.as_str(), |_, record| !record.is_expired(now));
        if removed.is_some() {
            self.release(1);
        }
        Ok(removed.map(|(_, record)| record.data))
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> SessionResult<u64> {
        Ok(self.purge(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuthenticatedUser, OAuthParameters};
    use time::Duration;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2025-01-01 10:00 UTC);

    fn create_test_record(ttl_secs: i64) -> SessionRecord {
        SessionRecord::new(
            SessionData::new(OAuthParameters::new("test-client", "https://app/cb")),
            NOW,
            Duration::seconds(ttl_secs),
        )
        .unwrap()
    }

    fn create_test_authentication(subject: &str) -> Authentication {
        Authentication {
            user: AuthenticatedUser::new(subject),
            auth_time: NOW,
        }
    }

    #[tokio::test]
    async fn test_insert_and_fetch() {
        let backend = InMemorySessionBackend::new();
        let key = SessionKey::generate();

        let outcome = backend.insert(&key, create_test_record(60), NOW).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);

        let data = backend.fetch(&key, NOW).await.unwrap().unwrap();
        assert_eq!(data.oauth_parameters().client_id, "test-client");
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_collision_with_live_record() {
        let backend = InMemorySessionBackend::new();
        let key = SessionKey::generate();

        backend.insert(&key, create_test_record(60), NOW).await.unwrap();
        let outcome = backend.insert(&key, create_test_record(60), NOW).await.unwrap();

        assert_eq!(outcome, InsertOutcome::Collision);
    }

    #[tokio::test]
    async fn test_insert_replaces_expired_record() {
        let backend = InMemorySessionBackend::new();
        let key = SessionKey::generate();
        backend.insert(&key, create_test_record(60), NOW).await.unwrap();

        let later = NOW + Duration::seconds(61);
        let outcome = backend
            .insert(&key, create_test_record(60), later)
            .await
            .unwrap();

        assert_eq!(outcome, InsertOutcome::Inserted);
    }

    #[tokio::test]
    async fn test_expired_record_is_invisible_before_purge() {
        let backend = InMemorySessionBackend::new();
        let key = SessionKey::generate();
        backend.insert(&key, create_test_record(60), NOW).await.unwrap();

        let later = NOW + Duration::seconds(60);
        assert!(backend.fetch(&key, later).await.unwrap().is_none());
        assert_eq!(
            backend
                .attach(&key, create_test_authentication("u1"), later)
                .await
                .unwrap(),
            AttachOutcome::NotFound
        );
        assert!(backend.take(&key, later).await.unwrap().is_none());

        // Still physically present until purged.
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_attach_once() {
        let backend = InMemorySessionBackend::new();
        let key = SessionKey::generate();
        backend.insert(&key, create_test_record(60), NOW).await.unwrap();

        let first = backend
            .attach(&key, create_test_authentication("u1"), NOW)
            .await
            .unwrap();
        let second = backend
            .attach(&key, create_test_authentication("u2"), NOW)
            .await
            .unwrap();

        assert_eq!(first, AttachOutcome::Attached);
        assert_eq!(second, AttachOutcome::AlreadyAuthenticated);

        let data = backend.fetch(&key, NOW).await.unwrap().unwrap();
        assert_eq!(data.authenticated_user().unwrap().subject, "u1");
    }

    #[tokio::test]
    async fn test_take_removes_record() {
        let backend = InMemorySessionBackend::new();
        let key = SessionKey::generate();
        backend.insert(&key, create_test_record(60), NOW).await.unwrap();

        assert!(backend.take(&key, NOW).await.unwrap().is_some());
        assert!(backend.take(&key, NOW).await.unwrap().is_none());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let backend = InMemorySessionBackend::new();
        for ttl in [10, 20, 120] {
            backend
                .insert(&SessionKey::generate(), create_test_record(ttl), NOW)
                .await
                .unwrap();
        }

        let removed = backend
            .purge_expired(NOW + Duration::seconds(30))
            .await
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let backend = InMemorySessionBackend::with_capacity_limit(2);
        backend
            .insert(&SessionKey::generate(), create_test_record(10), NOW)
            .await
            .unwrap();
        backend
            .insert(&SessionKey::generate(), create_test_record(60), NOW)
            .await
            .unwrap();

        let err = backend
            .insert(&SessionKey::generate(), create_test_record(60), NOW)
            .await
            .unwrap_err();
        assert!(err.is_unavailable());

        // Once the short-lived record expires it is purged to make room.
        let later = NOW + Duration::seconds(11);
        let outcome = backend
            .insert(&SessionKey::generate(), create_test_record(60), later)
            .await
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);
        assert_eq!(backend.len(), 2);
    }

    #[tokio::test]
    async fn test_capacity_slot_freed_by_take_and_collision() {
        let backend = InMemorySessionBackend::with_capacity_limit(2);
        let key = SessionKey::generate();
        backend.insert(&key, create_test_record(60), NOW).await.unwrap();

        // A collision does not keep the slot it reserved.
        let outcome = backend.insert(&key, create_test_record(60), NOW).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Collision);

        let other = SessionKey::generate();
        let outcome = backend.insert(&other, create_test_record(60), NOW).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);
        assert!(
            backend
                .insert(&SessionKey::generate(), create_test_record(60), NOW)
                .await
                .unwrap_err()
                .is_unavailable()
        );

        assert!(backend.take(&key, NOW).await.unwrap().is_some());
        let outcome = backend
            .insert(&SessionKey::generate(), create_test_record(60), NOW)
            .await
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);
        assert_eq!(backend.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_capacity_limit_holds_under_concurrent_inserts() {
        let backend = std::sync::Arc::new(InMemorySessionBackend::with_capacity_limit(4));
        let barrier = std::sync::Arc::new(tokio::sync::Barrier::new(64));

        let mut handles = Vec::new();
        for _ in 0..64 {
            let backend = backend.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                backend
                    .insert(&SessionKey::generate(), create_test_record(60), NOW)
                    .await
            }));
        }

        let mut inserted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(InsertOutcome::Inserted) => inserted += 1,
                Ok(InsertOutcome::Collision) => panic!("random keys collided"),
                Err(e) => assert!(e.is_unavailable()),
            }
        }

        assert_eq!(inserted, 4);
        assert_eq!(backend.len(), 4);
    }
}
