//! Per-import options and the summary an import reports.

use serde::{Deserialize, Serialize};

use crate::row::RowOutcome;

/// Knobs for a single import. Passed explicitly so imports stay reentrant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
  /// Trim leading and trailing whitespace from every cell before mapping.
  pub strip_values: bool,
}

impl Default for ImportOptions {
  fn default() -> Self { Self { strip_values: true } }
}

impl ImportOptions {
  /// Apply cell cleaning. Returns `None` when every cell is empty, in which
  /// case the row is skipped without an audit record.
  pub fn clean_cells<'a, I>(&self, cells: I) -> Option<Vec<String>>
  where
    I: IntoIterator<Item = &'a str>,
  {
    let cells: Vec<String> = cells
      .into_iter()
      .map(|c| (if self.strip_values { c.trim() } else { c }).to_owned())
      .collect();
    if cells.iter().all(String::is_empty) {
      return None;
    }
    Some(cells)
  }
}

/// Counts reported by a finished import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
  pub snapshot_slug: String,
  pub created:       usize,
  pub updated:       usize,
  pub ignored:       usize,
  pub deleted:       usize,
  pub unknown:       usize,
  /// Rows whose cells were all empty.
  pub skipped:       usize,
}

impl ImportSummary {
  pub fn new(snapshot_slug: impl Into<String>) -> Self {
    Self {
      snapshot_slug: snapshot_slug.into(),
      ..Default::default()
    }
  }

  pub fn record(&mut self, outcome: RowOutcome) {
    let slot = match outcome {
      RowOutcome::Created => &mut self.created,
      RowOutcome::Updated => &mut self.updated,
      RowOutcome::Ignored => &mut self.ignored,
      RowOutcome::Deleted => &mut self.deleted,
      RowOutcome::Unknown => &mut self.unknown,
    };
    *slot += 1;
  }

  /// Number of audit rows written.
  pub fn rows(&self) -> usize {
    self.created + self.updated + self.ignored + self.deleted + self.unknown
  }
}
