mod cli;
mod commands;
mod config;
mod observability;
mod output;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use config::AppConfig;
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    observability::init_tracing_with_level(&cli.log_level);

    let cfg = AppConfig::load(cli.config.as_deref(), cli.database_url.clone())?;

    match &cli.command {
        Commands::Migrate => commands::migrate(&cfg).await?,
        Commands::Purge => commands::purge(&cfg).await?,
        Commands::Reap => commands::reap(&cfg).await?,
        Commands::Check => commands::check(&cfg).await?,
        Commands::Config => commands::show_config(&cfg)?,
    }

    Ok(())
}
