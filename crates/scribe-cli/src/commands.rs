//! Subcommand implementations.

use anyhow::{Context as _, Result, bail};
use scribe_core::{
  import::{ImportOptions, ImportSummary},
  snapshot::Snapshot,
  source::{NewSource, SourceDescriptor},
  store::SnapshotStore,
};
use scribe_fetch::SnapshotFetcher;
use scribe_store_sqlite::{EntityRegistry, SqliteStore};
use tracing::info;

use crate::cli::Command;

/// Everything a command needs: the store, the known targets and a client.
pub struct Scribe {
  pub store:    SqliteStore,
  pub registry: EntityRegistry,
  pub fetcher:  SnapshotFetcher,
  pub options:  ImportOptions,
}

impl Scribe {
  pub async fn dispatch(&self, command: Command) -> Result<()> {
    match command {
      Command::Run {
        source,
        download_only,
        use_downloaded,
        downloaded_slug,
      } => {
        let mode = match (download_only, use_downloaded) {
          (true, _) => RunMode::DownloadOnly,
          (false, true) => RunMode::UseDownloaded(downloaded_slug),
          (false, false) => RunMode::FetchAndLoad,
        };
        match self.run(&source, mode).await? {
          RunResult::Downloaded(snapshot) => {
            println!("downloaded {} from {}", snapshot.slug, snapshot.url);
          }
          RunResult::Loaded(summary) => print_summary(&summary),
        }
      }
      Command::New {
        slug,
        url,
        target,
        app_label,
        entry_only,
      } => {
        let (source, summary) = self
          .new_source(&slug, &url, &target, app_label.as_deref(), entry_only)
          .await?;
        println!(
          "registered {} -> {}",
          source.slug,
          source.target.map(|k| k.to_string()).unwrap_or_default()
        );
        if let Some(summary) = summary {
          print_summary(&summary);
        }
      }
      Command::Rollback { snapshot } => {
        let reversed = self.rollback(&snapshot).await?;
        println!("{snapshot}: deleted {reversed} created entities");
      }
      Command::Snapshots { source } => {
        for s in self.snapshots(&source).await? {
          println!(
            "{}  {:<10}  {}  {}  {}",
            s.slug,
            s.status,
            s.downloaded_at.to_rfc3339(),
            s.completed_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into()),
            s.url,
          );
        }
      }
    }
    Ok(())
  }

  /// Download the source's current file and load it.
  pub async fn scribe(&self, source: &SourceDescriptor) -> Result<ImportSummary> {
    let snapshot = self
      .fetcher
      .fetch(&self.store, source)
      .await
      .with_context(|| format!("downloading {}", source.slug))?;
    self.load(&snapshot).await
  }

  pub async fn run(&self, source_slug: &str, mode: RunMode) -> Result<RunResult> {
    let source = self.source(source_slug).await?;

    let snapshot = match mode {
      RunMode::DownloadOnly => {
        let snapshot = self.fetcher.fetch(&self.store, &source).await?;
        return Ok(RunResult::Downloaded(snapshot));
      }
      RunMode::FetchAndLoad => return Ok(RunResult::Loaded(self.scribe(&source).await?)),
      RunMode::UseDownloaded(Some(slug)) => self
        .store
        .get_snapshot(&slug)
        .await?
        .filter(|s| s.source_slug == source.slug)
        .with_context(|| format!("{source_slug} has no snapshot {slug:?}"))?,
      RunMode::UseDownloaded(None) => self
        .store
        .latest_snapshot(&source.slug)
        .await?
        .with_context(|| format!("{source_slug} has no downloaded snapshots"))?,
    };

    if snapshot.status.is_loaded() {
      bail!("snapshot {} is already loaded ({})", snapshot.slug, snapshot.status);
    }
    Ok(RunResult::Loaded(self.load(&snapshot).await?))
  }

  /// Register a source targeting `model`, then scribe it unless
  /// `entry_only`.
  pub async fn new_source(
    &self,
    slug: &str,
    url: &str,
    model: &str,
    app_label: Option<&str>,
    entry_only: bool,
  ) -> Result<(SourceDescriptor, Option<ImportSummary>)> {
    let kind = self.registry.resolve_model(model, app_label)?;
    let source = self
      .store
      .add_source(NewSource::new(slug, url, Some(kind)))
      .await
      .with_context(|| format!("registering {slug}"))?;

    if entry_only {
      return Ok((source, None));
    }
    let summary = self.scribe(&source).await?;
    Ok((source, Some(summary)))
  }

  pub async fn rollback(&self, snapshot_slug: &str) -> Result<usize> {
    let reversed = self
      .store
      .delete_created(snapshot_slug, &self.registry)
      .await
      .with_context(|| format!("rolling back {snapshot_slug}"))?;
    Ok(reversed)
  }

  pub async fn snapshots(&self, source_slug: &str) -> Result<Vec<Snapshot>> {
    let source = self.source(source_slug).await?;
    Ok(self.store.list_snapshots(&source.slug).await?)
  }

  async fn source(&self, slug: &str) -> Result<SourceDescriptor> {
    self
      .store
      .get_source(slug)
      .await?
      .with_context(|| format!("no source named {slug:?}"))
  }

  async fn load(&self, snapshot: &Snapshot) -> Result<ImportSummary> {
    let summary = self
      .store
      .load(&snapshot.slug, &self.registry, self.options)
      .await
      .with_context(|| format!("loading snapshot {}", snapshot.slug))?;
    info!(snapshot = %snapshot.slug, rows = summary.rows(), "run finished");
    Ok(summary)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
  FetchAndLoad,
  DownloadOnly,
  /// Load a stored snapshot: the named one, or the latest.
  UseDownloaded(Option<String>),
}

#[derive(Debug)]
pub enum RunResult {
  Downloaded(Snapshot),
  Loaded(ImportSummary),
}

fn print_summary(summary: &ImportSummary) {
  println!(
    "{}: created {}, updated {}, ignored {}, skipped {}",
    summary.snapshot_slug,
    summary.created,
    summary.updated,
    summary.ignored,
    summary.skipped,
  );
}
