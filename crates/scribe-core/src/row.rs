//! Audit rows and the polymorphic entity reference they carry.

use std::{fmt, str::FromStr};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// What an import did with one data row.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Default,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RowOutcome {
  Created,
  Updated,
  Ignored,
  Deleted,
  #[default]
  Unknown,
}

impl RowOutcome {
  pub const ALL: [Self; 5] = [
    Self::Created,
    Self::Updated,
    Self::Ignored,
    Self::Deleted,
    Self::Unknown,
  ];

  /// Single-character code stored in the `outcome` column.
  pub fn code(self) -> &'static str {
    match self {
      Self::Created => "C",
      Self::Updated => "U",
      Self::Ignored => "I",
      Self::Deleted => "D",
      Self::Unknown => "X",
    }
  }

  pub fn from_code(code: &str) -> Result<Self> {
    Self::ALL
      .into_iter()
      .find(|o| o.code() == code)
      .ok_or_else(|| Error::UnknownCode {
        what: "row outcome",
        code: code.to_owned(),
      })
  }
}

impl fmt::Display for RowOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Created => "created",
      Self::Updated => "updated",
      Self::Ignored => "ignored",
      Self::Deleted => "deleted",
      Self::Unknown => "unknown",
    })
  }
}

// ─── Entity references ───────────────────────────────────────────────────────

/// A registered target type, namespaced by application: `app.model`.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EntityKind {
  pub app:   String,
  pub model: String,
}

impl EntityKind {
  pub fn new(app: impl Into<String>, model: impl Into<String>) -> Self {
    Self {
      app:   app.into(),
      model: model.into(),
    }
  }
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}", self.app, self.model)
  }
}

impl FromStr for EntityKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.split_once('.') {
      Some((app, model))
        if !app.is_empty() && !model.is_empty() && !model.contains('.') =>
      {
        Ok(Self::new(app, model))
      }
      _ => Err(Error::InvalidEntityKind(s.to_owned())),
    }
  }
}

/// A non-owning pointer at one entity of some registered kind.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EntityRef {
  pub kind: EntityKind,
  pub id:   i64,
}

impl EntityRef {
  pub fn new(kind: EntityKind, id: i64) -> Self { Self { kind, id } }
}

impl fmt::Display for EntityRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}#{}", self.kind, self.id)
  }
}

// ─── Audit row ───────────────────────────────────────────────────────────────

/// A data row keyed by mapped field name, in CSV column order.
pub type RowData = IndexMap<String, String>;

/// The durable record of what one import did with one physical row.
///
/// Only rollback ever mutates a row after it is written, and only to flip a
/// `Created` outcome to `Deleted` while clearing the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRow {
  pub row_id:        i64,
  pub snapshot_slug: String,
  /// 1-based offset of the row's line from the header line.
  pub index:         u64,
  pub data:          RowData,
  pub outcome:       RowOutcome,
  pub target:        Option<EntityRef>,
}
