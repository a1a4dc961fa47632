//! radiofeed - cached news sections for the radio site
//!
//! Serves the `noticias`, `musica` and `farandula` sections over HTTP,
//! refreshing each from NewsData.io when it goes stale.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use radiofeed::cache::{CycleOutcome, SectionCacheStore, SectionStore};
use radiofeed::cli::{Cli, CliError, RunMode, StartupConfig};
use radiofeed::config::ServiceConfig;
use radiofeed::data::NewsDataClient;
use radiofeed::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let startup = match StartupConfig::from_cli(&cli, ServiceConfig::from_env()) {
        Ok(startup) => startup,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };
    let config = startup.service;

    let store = match config.cache_dir.clone() {
        Some(dir) => SectionStore::with_dir(dir),
        None => SectionStore::new().ok_or(CliError::NoCacheDir)?,
    };
    info!(cache_dir = %store.cache_dir().display(), "Using section cache directory");

    if config.api_key.is_none() {
        error!("USER_API_KEY is not set; sections will only serve cached data");
    }

    let source = Arc::new(NewsDataClient::with_base_url(
        config.api_key.clone(),
        config.base_url.clone(),
    ));
    let cache = Arc::new(SectionCacheStore::new(&config, source, store));

    match startup.mode {
        RunMode::RefreshAll => {
            let summaries = cache.refresh_all().await;
            let mut failed = 0;
            for summary in &summaries {
                match &summary.outcome {
                    CycleOutcome::Refreshed { count } => {
                        info!(section = %summary.section, count, "Refreshed");
                    }
                    CycleOutcome::Failed { error_msg, .. } => {
                        failed += 1;
                        error!(section = %summary.section, error = %error_msg, "Refresh failed");
                    }
                    CycleOutcome::Skipped => {}
                }
            }
            if failed > 0 {
                std::process::exit(1);
            }
        }
        RunMode::Serve => {
            let state = AppState::new(cache, config.admin_token.clone());
            server::start(&config.bind, state).await?;
        }
    }

    Ok(())
}
