//! Error types for `scribe-core`.

use thiserror::Error;

use crate::snapshot::SnapshotStatus;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid url template {0:?}: unsupported strftime specifier")]
  InvalidUrlTemplate(String),

  #[error("invalid slug {0:?}: use letters, digits, `-` or `_`")]
  InvalidSlug(String),

  #[error("invalid entity kind {0:?}: expected `app.model`")]
  InvalidEntityKind(String),

  #[error("unknown {what} code: {code:?}")]
  UnknownCode { what: &'static str, code: String },

  /// A reconciliation hook returned a decision that cannot be recorded.
  #[error("reconciliation error: {0}")]
  Reconciliation(String),

  #[error("snapshot {0} is already loaded")]
  AlreadyLoaded(String),

  #[error("snapshot {slug} is {status}; only completed snapshots can be rolled back")]
  InvalidState {
    slug:   String,
    status: SnapshotStatus,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
