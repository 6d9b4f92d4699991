//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are fixed-width RFC 3339 strings (microseconds, `Z`) so that
//! lexical order matches chronological order. Enumerations use their
//! single-character codes. Row data is compact JSON.

use chrono::{DateTime, SecondsFormat, Utc};
use scribe_core::{
  row::{AuditRow, EntityKind, EntityRef, RowData, RowOutcome},
  snapshot::{Snapshot, SnapshotStatus},
  source::{DataFormat, SourceDescriptor},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── EntityKind ──────────────────────────────────────────────────────────────

pub fn encode_kind(kind: &EntityKind) -> String { kind.to_string() }

pub fn decode_kind(s: &str) -> Result<EntityKind> { Ok(s.parse()?) }

// ─── RowData ─────────────────────────────────────────────────────────────────

pub fn encode_data(data: &RowData) -> Result<String> {
  Ok(serde_json::to_string(data)?)
}

pub fn decode_data(s: &str) -> Result<RowData> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

pub const SOURCE_COLUMNS: &str = "slug, url_template, data_format, target_kind";

/// Raw strings read directly from a `sources` row.
pub struct RawSource {
  pub slug:         String,
  pub url_template: String,
  pub data_format:  String,
  pub target_kind:  Option<String>,
}

impl RawSource {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      slug:         row.get(0)?,
      url_template: row.get(1)?,
      data_format:  row.get(2)?,
      target_kind:  row.get(3)?,
    })
  }

  pub fn into_source(self) -> Result<SourceDescriptor> {
    Ok(SourceDescriptor {
      slug:         self.slug,
      url_template: self.url_template,
      data_format:  DataFormat::from_code(&self.data_format)?,
      target:       self.target_kind.as_deref().map(decode_kind).transpose()?,
    })
  }
}

pub const SNAPSHOT_COLUMNS: &str = "slug, source_slug, url, blob_key, \
                                    content_sha256, size, status, \
                                    downloaded_at, completed_at";

/// Raw strings read directly from a `snapshots` row.
pub struct RawSnapshot {
  pub slug:           String,
  pub source_slug:    String,
  pub url:            String,
  pub blob_key:       String,
  pub content_sha256: String,
  pub size:           i64,
  pub status:         String,
  pub downloaded_at:  String,
  pub completed_at:   Option<String>,
}

impl RawSnapshot {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      slug:           row.get(0)?,
      source_slug:    row.get(1)?,
      url:            row.get(2)?,
      blob_key:       row.get(3)?,
      content_sha256: row.get(4)?,
      size:           row.get(5)?,
      status:         row.get(6)?,
      downloaded_at:  row.get(7)?,
      completed_at:   row.get(8)?,
    })
  }

  pub fn into_snapshot(self) -> Result<Snapshot> {
    Ok(Snapshot {
      slug:           self.slug,
      source_slug:    self.source_slug,
      url:            self.url,
      blob_key:       self.blob_key,
      content_sha256: self.content_sha256,
      size:           u64::try_from(self.size).unwrap_or_default(),
      status:         SnapshotStatus::from_code(&self.status)?,
      downloaded_at:  decode_dt(&self.downloaded_at)?,
      completed_at:   self.completed_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

pub const AUDIT_ROW_COLUMNS: &str = "row_id, snapshot_slug, row_index, \
                                     data_json, outcome, target_kind, \
                                     target_id";

/// Raw strings read directly from an `audit_rows` row.
pub struct RawAuditRow {
  pub row_id:        i64,
  pub snapshot_slug: String,
  pub row_index:     i64,
  pub data_json:     String,
  pub outcome:       String,
  pub target_kind:   Option<String>,
  pub target_id:     Option<i64>,
}

impl RawAuditRow {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      row_id:        row.get(0)?,
      snapshot_slug: row.get(1)?,
      row_index:     row.get(2)?,
      data_json:     row.get(3)?,
      outcome:       row.get(4)?,
      target_kind:   row.get(5)?,
      target_id:     row.get(6)?,
    })
  }

  pub fn into_audit_row(self) -> Result<AuditRow> {
    let target = match (self.target_kind, self.target_id) {
      (Some(kind), Some(id)) => Some(EntityRef::new(decode_kind(&kind)?, id)),
      _ => None,
    };
    Ok(AuditRow {
      row_id: self.row_id,
      snapshot_slug: self.snapshot_slug,
      index: u64::try_from(self.row_index).unwrap_or_default(),
      data: decode_data(&self.data_json)?,
      outcome: RowOutcome::from_code(&self.outcome)?,
      target,
    })
  }
}

/// Decode a `(target_kind, target_id)` pair selected on its own.
pub fn decode_ref(kind: String, id: i64) -> Result<EntityRef> {
  Ok(EntityRef::new(decode_kind(&kind)?, id))
}
