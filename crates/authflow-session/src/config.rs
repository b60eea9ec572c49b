//! Session store configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [session]
//! session_ttl = "10m"
//! operation_timeout = "5s"
//! cleanup_interval = "1m"
//! key_generation_attempts = 3
//! max_sessions = 100000
//! ```
//!
//! Every value can be overridden from the environment, e.g.
//! `AUTHFLOW__SESSION__SESSION_TTL=5m`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default session lifetime (10 minutes).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(600);

/// Longest accepted session lifetime (1 day).
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Session store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionStoreConfig {
    /// Fixed lifetime of a session, counted from creation.
    /// Sessions are never extended.
    #[serde(with = "humantime_serde")]
    pub session_ttl: Duration,

    /// Upper bound for a single backend operation.
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// How often the background reaper purges expired sessions.
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,

    /// How many keys to try before giving up when keys collide.
    pub key_generation_attempts: u32,

    /// Capacity of the in-memory backend. Unbounded when unset.
    pub max_sessions: Option<usize>,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
            operation_timeout: Duration::from_secs(5),
            cleanup_interval: Duration::from_secs(60),
            key_generation_attempts: 3,
            max_sessions: None,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl SessionStoreConfig {
    /// Creates a configuration with the given session lifetime.
    #[must_use]
    pub fn with_ttl(session_ttl: Duration) -> Self {
        Self {
            session_ttl,
            ..Self::default()
        }
    }

    /// Returns the session lifetime as a `time::Duration`.
    #[must_use]
    pub fn ttl(&self) -> time::Duration {
        time::Duration::try_from(self.session_ttl).unwrap_or(time::Duration::MAX)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - `session_ttl`, `operation_timeout` or `cleanup_interval` is zero
    /// - `session_ttl` exceeds [`MAX_SESSION_TTL`]
    /// - `key_generation_attempts` is zero
    /// - `max_sessions` is set to zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "session_ttl must be > 0".to_string(),
            ));
        }

        if self.session_ttl > MAX_SESSION_TTL {
            return Err(ConfigError::InvalidValue(format!(
                "session_ttl must be <= {}s",
                MAX_SESSION_TTL.as_secs()
            )));
        }

        if self.operation_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "operation_timeout must be > 0".to_string(),
            ));
        }

        if self.cleanup_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "cleanup_interval must be > 0".to_string(),
            ));
        }

        if self.key_generation_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "key_generation_attempts must be >= 1".to_string(),
            ));
        }

        if self.max_sessions == Some(0) {
            return Err(ConfigError::InvalidValue(
                "max_sessions must be > 0 when set".to_string(),
            ));
        }

        Ok(())
    }
}

pub mod loader {
    //! Layered configuration loading: optional TOML file, then environment.

    use std::path::Path;

    use config::{Config, Environment, File};
    use serde::de::DeserializeOwned;

    use super::{ConfigError, SessionStoreConfig};

    /// Environment variable prefix, e.g. `AUTHFLOW__SESSION__SESSION_TTL`.
    pub const ENV_PREFIX: &str = "AUTHFLOW";

    /// Default configuration file looked up in the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "authflow.toml";

    /// Builds the layered configuration source.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn build(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::Missing(format!(
                        "config file {}",
                        p.display()
                    )));
                }
                builder = builder.add_source(File::from(p));
            }
            None => {
                builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false));
            }
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .separator("__"),
        );
        Ok(builder.build()?)
    }

    /// Deserializes the whole configuration into `T`.
    pub fn load<T: DeserializeOwned>(path: Option<&Path>) -> Result<T, ConfigError> {
        Ok(build(path)?.try_deserialize()?)
    }

    /// Loads and validates the `[session]` table.
    pub fn load_session_config(path: Option<&Path>) -> Result<SessionStoreConfig, ConfigError> {
        let cfg = build(path)?;
        let session: SessionStoreConfig = match cfg.get("session") {
            Ok(session) => session,
            Err(config::ConfigError::NotFound(_)) => SessionStoreConfig::default(),
            Err(e) => return Err(e.into()),
        };
        session.validate()?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;

    #[test]
    fn test_default_config_is_valid() {
        let config = SessionStoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session_ttl, Duration::from_secs(600));
        assert_eq!(config.ttl(), time::Duration::minutes(10));
    }

    #[test]
    fn test_zero_values_rejected() {
        let config = SessionStoreConfig::with_ttl(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));

        let config = SessionStoreConfig {
            key_generation_attempts: 0,
            ..SessionStoreConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SessionStoreConfig {
            max_sessions: Some(0),
            ..SessionStoreConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_excessive_ttl_rejected() {
        let config: SessionStoreConfig = toml::from_str(r#"session_ttl = "20000years""#).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));

        assert!(SessionStoreConfig::with_ttl(MAX_SESSION_TTL).validate().is_ok());
        assert!(
            SessionStoreConfig::with_ttl(MAX_SESSION_TTL + Duration::from_secs(1))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_deserialize_humantime() {
        let toml = r#"
            session_ttl = "5m"
            operation_timeout = "250ms"
            max_sessions = 10
        "#;
        let config: SessionStoreConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.session_ttl, Duration::from_secs(300));
        assert_eq!(config.operation_timeout, Duration::from_millis(250));
        assert_eq!(config.cleanup_interval, Duration::from_secs(60));
        assert_eq!(config.max_sessions, Some(10));
    }

    #[test]
    fn test_load_session_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[session]\nsession_ttl = \"2m\"\nkey_generation_attempts = 5"
        )
        .unwrap();

        let config = loader::load_session_config(Some(file.path())).unwrap();
        assert_eq!(config.session_ttl, Duration::from_secs(120));
        assert_eq!(config.key_generation_attempts, 5);
    }

    #[test]
    fn test_load_session_config_missing_file() {
        let result = loader::load_session_config(Some(Path::new("/nonexistent/authflow.toml")));
        assert!(matches!(result, Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_load_session_config_rejects_invalid() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[session]\nkey_generation_attempts = 0").unwrap();

        let result = loader::load_session_config(Some(file.path()));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }
}
