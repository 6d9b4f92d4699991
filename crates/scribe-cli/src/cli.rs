use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "scribe", version, about = "Load published CSV snapshots into local tables")]
pub struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "scribe.toml", global = true)]
  pub config: PathBuf,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
  /// Download a source's current file and load it into its target.
  Run {
    source: String,

    /// Download only; do not load.
    #[arg(long, conflicts_with = "use_downloaded")]
    download_only: bool,

    /// Load an already downloaded snapshot (the latest unless
    /// --downloaded-slug names one) instead of downloading.
    #[arg(long)]
    use_downloaded: bool,

    /// Snapshot to load with --use-downloaded.
    #[arg(long, requires = "use_downloaded")]
    downloaded_slug: Option<String>,
  },

  /// Register a new source, then download and load it.
  New {
    slug:   String,
    /// URL, optionally with strftime placeholders such as `%Y%m%d`.
    url:    String,
    /// Target model name, matched case-insensitively.
    target: String,

    /// App of the target model, when the name alone is ambiguous.
    #[arg(long)]
    app_label: Option<String>,

    /// Only register the source.
    #[arg(long)]
    entry_only: bool,
  },

  /// Delete every entity a completed snapshot created.
  Rollback { snapshot: String },

  /// List a source's snapshots, oldest first.
  Snapshots { source: String },
}
