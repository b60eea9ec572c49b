use std::sync::Arc;

use anyhow::{Context, Result};
use authflow_session::prelude::*;
use authflow_session_postgres::PostgresSessionBackend;
use time::OffsetDateTime;

use crate::config::AppConfig;
use crate::output::{print_field, print_success};

async fn connect(cfg: &AppConfig) -> Result<PostgresSessionBackend> {
    let url = cfg.require_database_url()?;
    PostgresSessionBackend::connect(url)
        .await
        .context("Failed to connect to PostgreSQL")
}

/// Builds a store over PostgreSQL when a database URL is configured,
/// otherwise over the in-memory backend.
async fn build_store(cfg: &AppConfig) -> Result<SessionStore> {
    let backend: Arc<dyn SessionBackend> = if cfg.database_url.is_some() {
        Arc::new(connect(cfg).await?)
    } else {
        match cfg.session.max_sessions {
            Some(limit) => Arc::new(InMemorySessionBackend::with_capacity_limit(limit)),
            None => Arc::new(InMemorySessionBackend::new()),
        }
    };
    Ok(SessionStore::new(backend, cfg.session.clone())?)
}

pub async fn migrate(cfg: &AppConfig) -> Result<()> {
    let backend = connect(cfg).await?;
    backend
        .ensure_schema()
        .await
        .context("Failed to create session schema")?;
    print_success("Session schema is up to date");
    Ok(())
}

pub async fn purge(cfg: &AppConfig) -> Result<()> {
    let backend = connect(cfg).await?;
    let store = SessionStore::new(Arc::new(backend), cfg.session.clone())?;
    let deleted = store.purge_expired().await?;
    print_success(&format!("Purged {deleted} expired session(s)"));
    Ok(())
}

pub async fn reap(cfg: &AppConfig) -> Result<()> {
    let backend = connect(cfg).await?;
    let store = SessionStore::new(Arc::new(backend), cfg.session.clone())?;
    let reaper = store.start_reaper();

    tracing::info!(
        interval = ?cfg.session.cleanup_interval,
        "Reaper running, press Ctrl-C to stop"
    );
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    reaper.shutdown().await;
    print_success("Reaper stopped");
    Ok(())
}

pub async fn check(cfg: &AppConfig) -> Result<()> {
    let store = build_store(cfg).await?;
    print_field("Backend", store.backend_name());

    let params = OAuthParameters::new("authflow-check", "http://localhost/callback")
        .with_scopes(["openid"])
        .with_state("check");
    let key = store.create(params.clone()).await?;

    let session = store.get(key.as_str()).await?;
    anyhow::ensure!(
        session.oauth_parameters() == &params,
        "Stored parameters do not match"
    );

    store
        .update(
            key.as_str(),
            AuthenticatedUser::new("authflow-check").with_amr("none"),
            OffsetDateTime::now_utc(),
        )
        .await?;

    let consumed = store.consume(key.as_str()).await?;
    anyhow::ensure!(consumed.is_authenticated(), "Session lost its authentication");

    match store.consume(key.as_str()).await {
        Err(SessionError::SessionNotFound) => {}
        Ok(_) => anyhow::bail!("Session was consumed twice"),
        Err(e) => return Err(e.into()),
    }

    print_success("Session round trip succeeded");
    Ok(())
}

pub fn show_config(cfg: &AppConfig) -> Result<()> {
    print!("{}", cfg.to_toml()?);
    Ok(())
}
