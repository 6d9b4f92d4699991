//! Error type for `scribe-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] scribe_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// Raised by statements run inside an import or rollback transaction,
  /// including constraint violations from target adapters.
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("csv error: {0}")]
  Csv(#[from] csv::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("blob io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("source not found: {0}")]
  SourceNotFound(String),

  #[error("snapshot not found: {0}")]
  SnapshotNotFound(String),

  #[error("snapshot {0} has no header row")]
  MissingHeader(String),

  #[error("source {0} has no target entity kind")]
  NoTarget(String),

  #[error("no target entity registered as {0}")]
  UnknownEntityKind(String),

  #[error("model {model:?} exists in several apps ({}); pass an app label", .apps.join(", "))]
  AmbiguousModel { model: String, apps: Vec<String> },

  #[error("{kind} has no field {field:?}")]
  UnknownField { kind: String, field: String },

  #[error("invalid sql identifier: {0:?}")]
  InvalidIdentifier(String),

  #[error("blob already exists: {0}")]
  BlobExists(String),

  /// Escape hatch for custom [`crate::TargetEntity`] implementations.
  #[error("target error: {0}")]
  Target(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Whether this is [`scribe_core::Error::AlreadyLoaded`].
  pub fn is_already_loaded(&self) -> bool {
    matches!(self, Self::Core(scribe_core::Error::AlreadyLoaded(_)))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
