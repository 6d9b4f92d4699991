//! On-disk storage for raw snapshot payloads.
//!
//! Each snapshot's bytes live at `{root}/{source}/{snapshot}`. Blobs are
//! written once with `create_new` and never rewritten; no binary data lives
//! in the database.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt as _;

use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct BlobStore {
  root: PathBuf,
}

impl BlobStore {
  pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

  pub fn root(&self) -> &Path { &self.root }

  pub fn path(&self, key: &str) -> PathBuf { self.root.join(key) }

  /// Write a new blob. Fails with [`Error::BlobExists`] rather than
  /// overwriting.
  pub async fn write_new(&self, key: &str, content: &[u8]) -> Result<()> {
    let path = self.path(key);
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = match tokio::fs::OpenOptions::new()
      .write(true)
      .create_new(true)
      .open(&path)
      .await
    {
      Ok(f) => f,
      Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
        return Err(Error::BlobExists(key.to_owned()));
      }
      Err(e) => return Err(e.into()),
    };
    file.write_all(content).await?;
    file.sync_all().await?;
    Ok(())
  }

  pub async fn read(&self, key: &str) -> Result<Vec<u8>> {
    Ok(tokio::fs::read(self.path(key)).await?)
  }

  /// Remove one blob; a missing blob is not an error.
  pub async fn remove(&self, key: &str) -> Result<()> {
    match tokio::fs::remove_file(self.path(key)).await {
      Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
      _ => Ok(()),
    }
  }

  /// Remove every blob belonging to a source.
  pub async fn remove_source(&self, source_slug: &str) -> Result<()> {
    match tokio::fs::remove_dir_all(self.root.join(source_slug)).await {
      Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
      _ => Ok(()),
    }
  }
}

/// SHA-256 hex digest of a payload.
pub fn sha256_hex(content: &[u8]) -> String {
  hex::encode(Sha256::digest(content))
}
