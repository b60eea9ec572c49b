use std::path::Path;

use anyhow::{Context, Result};
use authflow_session::SessionStoreConfig;
use authflow_session::config::loader;
use serde::{Deserialize, Serialize};

/// Effective CLI configuration: the `[session]` table plus the database URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    pub session: SessionStoreConfig,
}

impl AppConfig {
    /// Loads the file and `AUTHFLOW__*` environment, then applies the
    /// command-line database URL.
    pub fn load(path: Option<&Path>, database_url: Option<String>) -> Result<Self> {
        let mut cfg: AppConfig = loader::load(path).context("Failed to load configuration")?;
        cfg.session
            .validate()
            .context("Invalid [session] configuration")?;
        if database_url.is_some() {
            cfg.database_url = database_url;
        }
        Ok(cfg)
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("No database URL configured. Pass --database-url or set DATABASE_URL")
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
