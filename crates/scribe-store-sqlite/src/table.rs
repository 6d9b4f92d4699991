//! [`TableEntity`]: a target adapter over a plain SQLite table, declared in
//! configuration rather than code.
//!
//! ```toml
//! [[targets]]
//! app    = "sample"
//! model  = "news"
//! fields = [
//!   { name = "slug", unique = true },
//!   { name = "news_text" },
//!   { name = "pub_date", label = "date published" },
//! ]
//! natural_key = { field = "slug", on_match = "update" }
//! ```
//!
//! Every declared column is `TEXT`; the table gets an implicit
//! `id INTEGER PRIMARY KEY AUTOINCREMENT`, so ids freed by a rollback are
//! never handed to a later entity.

use rusqlite::{Connection, OptionalExtension as _, params_from_iter};
use scribe_core::{
  Error as CoreError,
  decision::Decision,
  mapping::FieldDecl,
  row::{EntityKind, EntityRef, RowData, RowOutcome},
};
use serde::Deserialize;

use crate::{Error, Reconcile, Result, TargetEntity};

// ─── Declarations ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct TableSpec {
  pub app:         String,
  pub model:       String,
  /// Defaults to `{app}_{model}`.
  #[serde(default)]
  pub table:       Option<String>,
  pub fields:      Vec<ColumnSpec>,
  #[serde(default)]
  pub natural_key: Option<NaturalKey>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnSpec {
  pub name:   String,
  /// Defaults to the name with underscores replaced by spaces.
  #[serde(default)]
  pub label:  Option<String>,
  #[serde(default)]
  pub unique: bool,
}

impl ColumnSpec {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name:   name.into(),
      label:  None,
      unique: false,
    }
  }

  pub fn label(mut self, label: impl Into<String>) -> Self {
    self.label = Some(label.into());
    self
  }

  pub fn unique(mut self) -> Self {
    self.unique = true;
    self
  }
}

/// Reconcile rows against existing entities by one field.
#[derive(Debug, Clone, Deserialize)]
pub struct NaturalKey {
  pub field:    String,
  pub on_match: OnMatch,
}

/// What to do when a row's natural key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnMatch {
  /// Leave the existing entity alone; the row is recorded as ignored.
  Ignore,
  /// Overwrite the existing entity's other fields; recorded as updated.
  Update,
}

// ─── Adapter ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TableEntity {
  kind:        EntityKind,
  table:       String,
  columns:     Vec<ColumnSpec>,
  fields:      Vec<FieldDecl>,
  natural_key: Option<NaturalKey>,
}

impl TableEntity {
  pub fn new(spec: TableSpec) -> Result<Self> {
    let table = spec
      .table
      .unwrap_or_else(|| format!("{}_{}", spec.app, spec.model));
    check_identifier(&table)?;
    for column in &spec.fields {
      check_identifier(&column.name)?;
      if column.name == "id" {
        return Err(Error::InvalidIdentifier(format!(
          "{table}.id is implicit and cannot be declared"
        )));
      }
    }

    let kind = EntityKind::new(spec.app, spec.model);
    if let Some(key) = &spec.natural_key
      && !spec.fields.iter().any(|c| c.name == key.field)
    {
      return Err(Error::UnknownField {
        kind:  kind.to_string(),
        field: key.field.clone(),
      });
    }

    let fields = std::iter::once(FieldDecl::new("id", "ID"))
      .chain(spec.fields.iter().map(|c| {
        FieldDecl::new(
          c.name.clone(),
          c.label.clone().unwrap_or_else(|| c.name.replace('_', " ")),
        )
      }))
      .collect();

    Ok(Self {
      kind,
      table,
      columns: spec.fields,
      fields,
      natural_key: spec.natural_key,
    })
  }

  pub fn table(&self) -> &str { &self.table }

  /// Number of rows currently in the table.
  pub fn count(&self, conn: &Connection) -> Result<u64> {
    let n: i64 = conn.query_row(
      &format!("SELECT COUNT(*) FROM {}", quote(&self.table)),
      [],
      |r| r.get(0),
    )?;
    Ok(u64::try_from(n).unwrap_or_default())
  }

  /// Read one entity's columns back as row data.
  pub fn get(&self, conn: &Connection, id: i64) -> Result<Option<RowData>> {
    let columns: Vec<String> =
      self.columns.iter().map(|c| quote(&c.name)).collect();
    let sql = format!(
      "SELECT {} FROM {} WHERE id = ?1",
      columns.join(", "),
      quote(&self.table)
    );
    let row = conn
      .query_row(&sql, [id], |r| {
        self
          .columns
          .iter()
          .enumerate()
          .map(|(i, c)| {
            let v: Option<String> = r.get(i)?;
            Ok((c.name.clone(), v.unwrap_or_default()))
          })
          .collect::<rusqlite::Result<RowData>>()
      })
      .optional()?;
    Ok(row)
  }

  fn entity(&self, id: i64) -> EntityRef {
    EntityRef::new(self.kind.clone(), id)
  }

  /// Reject row keys that are not columns of this table.
  fn check_fields(&self, data: &RowData) -> Result<()> {
    for key in data.keys() {
      if key != "id" && !self.columns.iter().any(|c| &c.name == key) {
        return Err(Error::UnknownField {
          kind:  self.kind.to_string(),
          field: key.clone(),
        });
      }
    }
    Ok(())
  }

  fn find_by(&self, conn: &Connection, field: &str, value: &str) -> Result<Option<i64>> {
    let sql = format!(
      "SELECT id FROM {} WHERE {} = ?1 ORDER BY id LIMIT 1",
      quote(&self.table),
      quote(field)
    );
    Ok(conn.query_row(&sql, [value], |r| r.get(0)).optional()?)
  }

  fn update(&self, conn: &Connection, id: i64, data: &RowData, key: &str) -> Result<()> {
    self.check_fields(data)?;
    let changes: Vec<(&String, &String)> = data
      .iter()
      .filter(|(k, _)| k.as_str() != key && k.as_str() != "id")
      .collect();
    if changes.is_empty() {
      return Ok(());
    }
    let assignments: Vec<String> = changes
      .iter()
      .enumerate()
      .map(|(i, (k, _))| format!("{} = ?{}", quote(k), i + 1))
      .collect();
    let sql = format!(
      "UPDATE {} SET {} WHERE id = ?{}",
      quote(&self.table),
      assignments.join(", "),
      changes.len() + 1
    );
    let mut values: Vec<rusqlite::types::Value> = changes
      .iter()
      .map(|(_, v)| rusqlite::types::Value::Text((*v).clone()))
      .collect();
    values.push(rusqlite::types::Value::Integer(id));
    conn.execute(&sql, params_from_iter(values))?;
    Ok(())
  }
}

impl TargetEntity for TableEntity {
  fn kind(&self) -> &EntityKind { &self.kind }

  fn fields(&self) -> &[FieldDecl] { &self.fields }

  fn create(&self, conn: &Connection, data: &RowData) -> Result<EntityRef> {
    self.check_fields(data)?;
    if data.is_empty() {
      conn.execute(
        &format!("INSERT INTO {} DEFAULT VALUES", quote(&self.table)),
        [],
      )?;
    } else {
      let columns: Vec<String> = data.keys().map(|k| quote(k)).collect();
      let placeholders: Vec<String> =
        (1..=data.len()).map(|i| format!("?{i}")).collect();
      let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote(&self.table),
        columns.join(", "),
        placeholders.join(", ")
      );
      conn.execute(&sql, params_from_iter(data.values()))?;
    }
    Ok(self.entity(conn.last_insert_rowid()))
  }

  fn delete(&self, conn: &Connection, id: i64) -> Result<()> {
    conn.execute(
      &format!("DELETE FROM {} WHERE id = ?1", quote(&self.table)),
      [id],
    )?;
    Ok(())
  }

  fn install(&self, conn: &Connection) -> Result<()> {
    let mut columns = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_owned()];
    columns.extend(self.columns.iter().map(|c| {
      if c.unique {
        format!("{} TEXT UNIQUE", quote(&c.name))
      } else {
        format!("{} TEXT", quote(&c.name))
      }
    }));
    conn.execute_batch(&format!(
      "CREATE TABLE IF NOT EXISTS {} ({});",
      quote(&self.table),
      columns.join(", ")
    ))?;
    Ok(())
  }

  fn reconciler(&self) -> Option<&dyn Reconcile> {
    self.natural_key.as_ref().map(|_| self as &dyn Reconcile)
  }
}

impl Reconcile for TableEntity {
  fn reconcile(&self, conn: &Connection, data: &RowData) -> Result<Decision> {
    let Some(key) = &self.natural_key else {
      return Ok(Decision::Create(self.create(conn, data)?));
    };
    let value = data.get(&key.field).ok_or_else(|| {
      CoreError::Reconciliation(format!(
        "row has no value for natural key {:?} of {}",
        key.field, self.kind
      ))
    })?;

    match (self.find_by(conn, &key.field, value)?, key.on_match) {
      (None, _) => Ok(Decision::Create(self.create(conn, data)?)),
      (Some(_), OnMatch::Ignore) => Ok(Decision::Ignore),
      (Some(id), OnMatch::Update) => {
        self.update(conn, id, data, &key.field)?;
        Ok(Decision::Record(self.entity(id), RowOutcome::Updated))
      }
    }
  }
}

// ─── Identifiers ─────────────────────────────────────────────────────────────

fn check_identifier(name: &str) -> Result<()> {
  let mut chars = name.chars();
  let valid = chars
    .next()
    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
  if valid {
    Ok(())
  } else {
    Err(Error::InvalidIdentifier(name.to_owned()))
  }
}

/// Quote an identifier for interpolation into SQL.
fn quote(name: &str) -> String { format!("\"{}\"", name.replace('"', "\"\"")) }
