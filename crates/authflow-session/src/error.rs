//! Session store error types.
//!
//! Every failure of a session store operation is reported through
//! [`SessionError`]. Unknown, expired, consumed and malformed session keys all
//! collapse into [`SessionError::SessionNotFound`] so callers cannot learn
//! whether a session ever existed.

use std::fmt;

/// Errors that can occur during session store operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session key is unknown, expired, already consumed, or malformed.
    #[error("Session not found")]
    SessionNotFound,

    /// An authenticated user has already been attached to the session.
    #[error("Session is already authenticated")]
    AlreadyAuthenticated,

    /// The backend rejected the operation or did not answer in time.
    #[error("Session store unavailable: {message}")]
    StoreUnavailable {
        /// Store operation that failed, when known.
        operation: Option<&'static str>,
        /// Description of the backend failure.
        message: String,
    },

    /// No unique session key could be generated.
    #[error("Failed to generate a unique session key after {attempts} attempts")]
    KeyGenerationFailed {
        /// Number of keys that collided with live sessions.
        attempts: u32,
    },

    /// A stored session record could not be encoded or decoded.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },
}

impl SessionError {
    /// Creates a new `StoreUnavailable` error.
    #[must_use]
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            operation: None,
            message: message.into(),
        }
    }

    /// Records the store operation a `StoreUnavailable` error came from.
    ///
    /// Other variants, and errors already tagged, are returned unchanged.
    #[must_use]
    pub fn during(self, operation: &'static str) -> Self {
        match self {
            Self::StoreUnavailable {
                operation: None,
                message,
            } => Self::StoreUnavailable {
                operation: Some(operation),
                message,
            },
            other => other,
        }
    }

    /// Creates a new `KeyGenerationFailed` error.
    #[must_use]
    pub fn key_generation_failed(attempts: u32) -> Self {
        Self::KeyGenerationFailed { attempts }
    }

    /// Creates a new `Serialization` error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a `SessionNotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SessionNotFound)
    }

    /// Returns `true` if this is an `AlreadyAuthenticated` error.
    #[must_use]
    pub fn is_already_authenticated(&self) -> bool {
        matches!(self, Self::AlreadyAuthenticated)
    }

    /// Returns `true` if this is a `StoreUnavailable` error.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    /// Returns `true` if the failed operation may simply be issued again.
    ///
    /// `create`, `get` and `purge_expired` may be reissued after a backend
    /// failure. A failed `update` or `consume` has an unknown outcome and must
    /// be re-checked with `get`, so it is never reported as retryable. Neither
    /// is a failure whose operation is unknown.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StoreUnavailable { operation, .. } => {
                matches!(operation, Some("create" | "get" | "purge_expired"))
            }
            Self::KeyGenerationFailed { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if this error is caused by the caller's flow (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::SessionNotFound | Self::AlreadyAuthenticated)
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable { .. }
                | Self::KeyGenerationFailed { .. }
                | Self::Serialization { .. }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SessionNotFound => ErrorCategory::Flow,
            Self::AlreadyAuthenticated => ErrorCategory::Flow,
            Self::StoreUnavailable { .. } => ErrorCategory::Infrastructure,
            Self::KeyGenerationFailed { .. } => ErrorCategory::Internal,
            Self::Serialization { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the OAuth 2.0 error code a caller should surface for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::SessionNotFound => "invalid_request",
            Self::AlreadyAuthenticated => "invalid_request",
            Self::StoreUnavailable { .. } => "temporarily_unavailable",
            Self::KeyGenerationFailed { .. } => "server_error",
            Self::Serialization { .. } => "server_error",
        }
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Categories of session errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The authorization flow referenced a missing session or replayed a step.
    Flow,
    /// Backend storage errors.
    Infrastructure,
    /// Internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flow => write!(f, "flow"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
