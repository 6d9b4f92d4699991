//! `scribe.toml` plus `SCRIBE_*` environment overrides.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use scribe_core::import::ImportOptions;
use scribe_store_sqlite::{EntityRegistry, TableEntity, TableSpec};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  #[serde(default = "default_store_path")]
  pub store_path:        PathBuf,
  /// Root directory for downloaded snapshot files.
  #[serde(default = "default_blob_dir")]
  pub blob_dir:          PathBuf,
  #[serde(default = "default_strip_values")]
  pub strip_values:      bool,
  #[serde(default = "default_http_timeout_secs")]
  pub http_timeout_secs: u64,
  /// Target tables rows can be loaded into.
  #[serde(default)]
  pub targets:           Vec<TableSpec>,
}

fn default_store_path() -> PathBuf { PathBuf::from("scribe.db") }
fn default_blob_dir() -> PathBuf { PathBuf::from("scribe-blobs") }
fn default_strip_values() -> bool { true }
fn default_http_timeout_secs() -> u64 { 30 }

impl Settings {
  /// Read `path` if it exists, then layer `SCRIBE_*` variables on top.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("SCRIBE"))
      .build()
      .with_context(|| format!("failed to read {}", path.display()))?;

    let mut settings: Self = settings
      .try_deserialize()
      .context("failed to deserialise settings")?;
    settings.store_path = expand_tilde(&settings.store_path);
    settings.blob_dir = expand_tilde(&settings.blob_dir);
    Ok(settings)
  }

  pub fn import_options(&self) -> ImportOptions {
    ImportOptions {
      strip_values: self.strip_values,
    }
  }

  /// Build the target registry from the `[[targets]]` declarations.
  pub fn registry(&self) -> anyhow::Result<EntityRegistry> {
    let mut registry = EntityRegistry::new();
    for spec in &self.targets {
      let entity = TableEntity::new(spec.clone()).with_context(|| {
        format!("invalid target {}.{}", spec.app, spec.model)
      })?;
      registry.register(entity);
    }
    Ok(registry)
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
