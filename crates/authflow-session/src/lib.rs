//! # authflow-session
//!
//! Session store for in-progress OAuth 2.0 / OpenID Connect authorization
//! flows.
//!
//! Between the redirect to the authorization endpoint and the issuance of a
//! code or token, the flow spans several request legs (authorization request,
//! login, consent, final redirect) that may land on different workers. This
//! crate keeps the state that correlates them:
//!
//! - the original request parameters, fixed at creation
//! - the authenticated user and auth time, attached exactly once
//! - a fixed expiry deadline, checked on every access
//! - single-use consumption for the leg that issues the final response
//!
//! ## Modules
//!
//! - [`model`] - Session data model
//! - [`key`] - Opaque session key generation and validation
//! - [`store`] - The session store used by the authorization endpoint
//! - [`backend`] - Storage trait implemented by backends
//! - [`memory`] - In-memory backend
//! - [`reaper`] - Background purge of expired sessions
//! - [`config`] - Store configuration and loading
//! - [`error`] - Error taxonomy
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use authflow_session::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SessionStore::new(
//!     Arc::new(InMemorySessionBackend::new()),
//!     SessionStoreConfig::default(),
//! )?;
//!
//! let key = store
//!     .create(OAuthParameters::new("my-app", "https://app.example.com/cb").with_scopes(["openid"]))
//!     .await?;
//!
//! store
//!     .update(key.as_str(), AuthenticatedUser::new("user-1"), time::OffsetDateTime::now_utc())
//!     .await?;
//!
//! let session = store.consume(key.as_str()).await?;
//! assert_eq!(session.authenticated_user().map(|u| u.subject.as_str()), Some("user-1"));
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod key;
pub mod memory;
pub mod model;
pub mod reaper;
pub mod store;

pub use backend::{AttachOutcome, InsertOutcome, SessionBackend};
pub use config::{ConfigError, DEFAULT_SESSION_TTL, MAX_SESSION_TTL, SessionStoreConfig};
pub use error::{ErrorCategory, SessionError};
pub use key::{KeyGenerator, OsKeyGenerator, SessionKey};
pub use memory::InMemorySessionBackend;
pub use model::{
    AuthenticatedUser, Authentication, OAuthParameters, PkceChallenge, PkceChallengeMethod,
    ResponseType, ResponseTypeComponent, ResponseTypeError, SessionData, SessionRecord,
};
pub use reaper::ReaperHandle;
pub use store::SessionStore;

/// Type alias for session store results.
pub type SessionResult<T> = Result<T, SessionError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use authflow_session::prelude::*;
/// ```
pub mod prelude {
    pub use crate::SessionResult;
    pub use crate::backend::{AttachOutcome, InsertOutcome, SessionBackend};
    pub use crate::config::{ConfigError, SessionStoreConfig};
    pub use crate::error::{ErrorCategory, SessionError};
    pub use crate::key::{KeyGenerator, SessionKey};
    pub use crate::memory::InMemorySessionBackend;
    pub use crate::model::{
        AuthenticatedUser, Authentication, OAuthParameters, PkceChallengeMethod, ResponseType,
        SessionData, SessionRecord,
    };
    pub use crate::reaper::ReaperHandle;
    pub use crate::store::SessionStore;
}
