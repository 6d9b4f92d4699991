//! Source descriptors: where a CSV is published and what it becomes.

use std::fmt::{Display, Write as _};

use chrono::{
  DateTime, Local, TimeZone,
  format::{Item, StrftimeItems},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, row::EntityKind};

// ─── Data format ─────────────────────────────────────────────────────────────

/// The wire format of a published file. Only delimited text for now.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
  #[default]
  Csv,
}

impl DataFormat {
  /// Single-character code stored in the `data_format` column.
  pub fn code(self) -> &'static str {
    match self {
      Self::Csv => "C",
    }
  }

  pub fn from_code(code: &str) -> Result<Self> {
    match code {
      "C" => Ok(Self::Csv),
      other => Err(Error::UnknownCode {
        what: "data format",
        code: other.to_owned(),
      }),
    }
  }
}

// ─── Source ──────────────────────────────────────────────────────────────────

/// A registered remote CSV and the entity kind its rows are loaded into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
  pub slug:         String,
  /// strftime-style template, e.g. `https://example.com/%Y/%m/%d.csv`.
  pub url_template: String,
  pub data_format:  DataFormat,
  /// `None` until an operator points the source at a registered kind.
  pub target:       Option<EntityKind>,
}

impl SourceDescriptor {
  /// Resolve the URL template against `at`.
  pub fn url_at<Tz>(&self, at: &DateTime<Tz>) -> Result<String>
  where
    Tz: TimeZone,
    Tz::Offset: Display,
  {
    render_template(&self.url_template, at)
  }

  /// Resolve the URL template against the current local time.
  pub fn current_url(&self) -> Result<String> { self.url_at(&Local::now()) }
}

/// Input to [`crate::store::SnapshotStore::add_source`].
#[derive(Debug, Clone)]
pub struct NewSource {
  pub slug:         String,
  pub url_template: String,
  pub data_format:  DataFormat,
  pub target:       Option<EntityKind>,
}

impl NewSource {
  pub fn new(
    slug: impl Into<String>,
    url_template: impl Into<String>,
    target: Option<EntityKind>,
  ) -> Self {
    Self {
      slug: slug.into(),
      url_template: url_template.into(),
      data_format: DataFormat::default(),
      target,
    }
  }

  /// Reject slugs that cannot serve as a path segment and templates chrono
  /// cannot render.
  pub fn validate(&self) -> Result<()> {
    validate_slug(&self.slug)?;
    parse_template(&self.url_template)?;
    Ok(())
  }

  pub fn into_descriptor(self) -> SourceDescriptor {
    SourceDescriptor {
      slug:         self.slug,
      url_template: self.url_template,
      data_format:  self.data_format,
      target:       self.target,
    }
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Slugs are non-empty and limited to ASCII letters, digits, `-` and `_`.
pub fn validate_slug(slug: &str) -> Result<()> {
  let valid = !slug.is_empty()
    && slug
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
  if valid {
    Ok(())
  } else {
    Err(Error::InvalidSlug(slug.to_owned()))
  }
}

fn parse_template(template: &str) -> Result<Vec<Item<'_>>> {
  let items: Vec<Item<'_>> = StrftimeItems::new(template).collect();
  if items.iter().any(|item| matches!(item, Item::Error)) {
    return Err(Error::InvalidUrlTemplate(template.to_owned()));
  }
  Ok(items)
}

/// Render a strftime template. Unlike `DateTime::format(..).to_string()` this
/// never panics on a bad specifier.
pub fn render_template<Tz>(template: &str, at: &DateTime<Tz>) -> Result<String>
where
  Tz: TimeZone,
  Tz::Offset: Display,
{
  let items = parse_template(template)?;
  let mut out = String::with_capacity(template.len() + 16);
  write!(out, "{}", at.format_with_items(items.iter()))
    .map_err(|_| Error::InvalidUrlTemplate(template.to_owned()))?;
  Ok(out)
}
