//! `scribe`: download published CSV files and load them into local tables.
//!
//! # Usage
//!
//! ```
//! scribe new daily 'https://example.com/%Y%m%d.csv' news --app-label sample
//! scribe run daily
//! scribe run daily --use-downloaded --downloaded-slug 4f1c0e9a2b7d3e86
//! scribe rollback 4f1c0e9a2b7d3e86
//! ```
//!
//! Settings come from `scribe.toml` (or `--config`) and `SCRIBE_*`
//! environment variables.

mod cli;
mod commands;
mod settings;

use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use scribe_fetch::SnapshotFetcher;
use scribe_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::{cli::Cli, commands::Scribe, settings::Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;
  let registry = settings.registry()?;

  let store = SqliteStore::open(&settings.store_path, &settings.blob_dir)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.store_path))?;
  store
    .install(&registry)
    .await
    .context("failed to create target tables")?;

  let fetcher =
    SnapshotFetcher::new(Duration::from_secs(settings.http_timeout_secs))?;

  let scribe = Scribe {
    store,
    registry,
    fetcher,
    options: settings.import_options(),
  };
  scribe.dispatch(cli.command).await
}
