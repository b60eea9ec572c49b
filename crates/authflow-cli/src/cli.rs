use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "authflow")]
#[command(about = "Authflow CLI - operate the authorize-flow session store")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./authflow.toml when present)
    #[arg(short, long, global = true, env = "AUTHFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// PostgreSQL connection URL (overrides the config file)
    #[arg(long, global = true, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the session table and index
    Migrate,
    /// Delete expired sessions once
    Purge,
    /// Purge expired sessions periodically until interrupted
    Reap,
    /// Run a create/get/update/consume round trip against the backend
    Check,
    /// Print the effective configuration
    Config,
}
