//! Snapshots: one immutable download of a source at a point in time.

use std::fmt;

use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle of a snapshot.
///
/// `Downloaded → Loading → Completed` on the happy path and
/// `Completed → Deleted` via rollback. A failed import leaves the snapshot in
/// `Loading`, from which it may be loaded again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
  Downloaded,
  Loading,
  Completed,
  Deleted,
}

impl SnapshotStatus {
  /// Single-character code stored in the `status` column.
  pub fn code(self) -> &'static str {
    match self {
      Self::Downloaded => "D",
      Self::Loading => "L",
      Self::Completed => "C",
      Self::Deleted => "X",
    }
  }

  pub fn from_code(code: &str) -> Result<Self> {
    match code {
      "D" => Ok(Self::Downloaded),
      "L" => Ok(Self::Loading),
      "C" => Ok(Self::Completed),
      "X" => Ok(Self::Deleted),
      other => Err(Error::UnknownCode {
        what: "snapshot status",
        code: other.to_owned(),
      }),
    }
  }

  /// Whether an import has already run to completion at least once.
  pub fn is_loaded(self) -> bool {
    matches!(self, Self::Completed | Self::Deleted)
  }
}

impl fmt::Display for SnapshotStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.pad(match self {
      Self::Downloaded => "downloaded",
      Self::Loading => "loading",
      Self::Completed => "completed",
      Self::Deleted => "deleted",
    })
  }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// One downloaded file. The blob it points at is never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
  pub slug:           String,
  pub source_slug:    String,
  /// The URL actually fetched, after template resolution.
  pub url:            String,
  /// Blob location relative to the blob root: `{source}/{snapshot}`.
  pub blob_key:       String,
  /// SHA-256 hex digest of the blob.
  pub content_sha256: String,
  pub size:           u64,
  pub status:         SnapshotStatus,
  pub downloaded_at:  DateTime<Utc>,
  pub completed_at:   Option<DateTime<Utc>>,
}

impl Snapshot {
  /// Fail with [`Error::AlreadyLoaded`] unless an import may start.
  pub fn ensure_loadable(&self) -> Result<()> {
    if self.status.is_loaded() {
      return Err(Error::AlreadyLoaded(self.slug.clone()));
    }
    Ok(())
  }

  /// Fail with [`Error::InvalidState`] unless the snapshot is `Completed`.
  pub fn ensure_completed(&self) -> Result<()> {
    if self.status != SnapshotStatus::Completed {
      return Err(Error::InvalidState {
        slug:   self.slug.clone(),
        status: self.status,
      });
    }
    Ok(())
  }
}

/// Input to [`crate::store::SnapshotStore::record_snapshot`].
/// The status is always `Downloaded` and the timestamp is set by the store.
#[derive(Debug, Clone)]
pub struct NewSnapshot {
  pub source_slug: String,
  /// A random token is generated when `None`.
  pub slug:        Option<String>,
  pub url:         String,
  pub content:     Vec<u8>,
}

/// A random 16-character hex token.
pub fn generate_slug() -> String {
  let mut bytes = [0u8; 8];
  OsRng.fill_bytes(&mut bytes);
  hex::encode(bytes)
}

pub fn blob_key(source_slug: &str, snapshot_slug: &str) -> String {
  format!("{source_slug}/{snapshot_slug}")
}
