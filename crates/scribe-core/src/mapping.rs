//! Header-to-field mapping.
//!
//! Each header cell resolves to a target field by exact field name, then by
//! exact human-readable label, and otherwise passes through unchanged so the
//! target can reject (or tolerate) it as an unrecognised key.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::row::RowData;

/// A field declared by a target entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
  pub name:  String,
  /// Human-readable label, e.g. "date published" for `pub_date`.
  pub label: String,
}

impl FieldDecl {
  pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
    Self {
      name:  name.into(),
      label: label.into(),
    }
  }
}

/// The ordered field names for every column of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
  names: Vec<String>,
}

impl FieldMapping {
  pub fn compute<S: AsRef<str>>(header: &[S], fields: &[FieldDecl]) -> Self {
    let by_name: HashSet<&str> =
      fields.iter().map(|f| f.name.as_str()).collect();
    // Later declarations win when two fields share a label.
    let by_label: HashMap<&str, &str> = fields
      .iter()
      .map(|f| (f.label.as_str(), f.name.as_str()))
      .collect();

    let names = header
      .iter()
      .map(|cell| {
        let cell: &str = cell.as_ref();
        if by_name.contains(cell) {
          cell.to_owned()
        } else if let Some(name) = by_label.get(cell) {
          (*name).to_owned()
        } else {
          cell.to_owned()
        }
      })
      .collect();

    Self { names }
  }

  pub fn names(&self) -> &[String] { &self.names }

  /// Pair field names with cell values. Stops at whichever side is shorter,
  /// so surplus cells and missing trailing cells are both dropped.
  pub fn zip_row<S: AsRef<str>>(&self, cells: &[S]) -> RowData {
    self
      .names
      .iter()
      .zip(cells)
      .map(|(name, cell)| (name.clone(), AsRef::<str>::as_ref(cell).to_owned()))
      .collect()
  }
}
