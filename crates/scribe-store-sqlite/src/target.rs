//! Target entity adapters and the registry that resolves them.
//!
//! An audit row's target is a `(kind, id)` pair. The registry maps each kind
//! to the adapter that knows how to create and delete that kind's entities
//! and, optionally, how to reconcile a row against existing ones.

use std::{collections::BTreeMap, fmt, sync::Arc};

use rusqlite::Connection;
use scribe_core::{
  decision::Decision,
  mapping::FieldDecl,
  row::{EntityKind, EntityRef, RowData},
};

use crate::{Error, Result};

/// The per-kind decision hook. A target that implements it replaces the
/// default create-every-row behaviour.
pub trait Reconcile: Send + Sync {
  /// Decide what to do with one mapped row. Runs inside the import
  /// transaction; any error aborts the whole import.
  fn reconcile(&self, conn: &Connection, data: &RowData) -> Result<Decision>;
}

/// Storage adapter for one entity kind.
///
/// All methods receive the connection (usually an open transaction) the
/// import or rollback is running on.
pub trait TargetEntity: Send + Sync {
  fn kind(&self) -> &EntityKind;

  /// Declared fields, used to map CSV headers onto field names.
  fn fields(&self) -> &[FieldDecl];

  /// Create one entity from a mapped row.
  fn create(&self, conn: &Connection, data: &RowData) -> Result<EntityRef>;

  /// Delete one entity. Deleting an entity that no longer exists is not an
  /// error.
  fn delete(&self, conn: &Connection, id: i64) -> Result<()>;

  /// Create whatever storage the kind needs. Called once at start-up.
  fn install(&self, _conn: &Connection) -> Result<()> { Ok(()) }

  /// The reconciliation capability, if this kind has one.
  fn reconciler(&self) -> Option<&dyn Reconcile> { None }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// The set of known target kinds.
///
/// Adapters are reference-counted, so cloning is cheap.
#[derive(Clone, Default)]
pub struct EntityRegistry {
  entities: BTreeMap<EntityKind, Arc<dyn TargetEntity>>,
}

impl EntityRegistry {
  pub fn new() -> Self { Self::default() }

  /// Register an adapter, replacing any previous one for the same kind.
  pub fn register(&mut self, entity: impl TargetEntity + 'static) -> &mut Self {
    self.register_arc(Arc::new(entity))
  }

  pub fn register_arc(&mut self, entity: Arc<dyn TargetEntity>) -> &mut Self {
    self.entities.insert(entity.kind().clone(), entity);
    self
  }

  pub fn get(&self, kind: &EntityKind) -> Option<Arc<dyn TargetEntity>> {
    self.entities.get(kind).cloned()
  }

  /// Like [`Self::get`], but an unregistered kind is an error.
  pub fn require(&self, kind: &EntityKind) -> Result<Arc<dyn TargetEntity>> {
    self
      .get(kind)
      .ok_or_else(|| Error::UnknownEntityKind(kind.to_string()))
  }

  /// Resolve a bare model name (case-insensitive), optionally narrowed to
  /// one app. A name registered under several apps needs the app label.
  pub fn resolve_model(
    &self,
    model: &str,
    app: Option<&str>,
  ) -> Result<EntityKind> {
    let matches: Vec<&EntityKind> = self
      .entities
      .keys()
      .filter(|k| k.model.eq_ignore_ascii_case(model))
      .filter(|k| app.is_none_or(|a| k.app.eq_ignore_ascii_case(a)))
      .collect();

    match matches.as_slice() {
      [kind] => Ok((*kind).clone()),
      [] => Err(Error::UnknownEntityKind(match app {
        Some(a) => format!("{a}.{model}"),
        None => model.to_owned(),
      })),
      many => Err(Error::AmbiguousModel {
        model: model.to_owned(),
        apps:  many.iter().map(|k| k.app.clone()).collect(),
      }),
    }
  }

  pub fn kinds(&self) -> impl Iterator<Item = &EntityKind> {
    self.entities.keys()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn TargetEntity>> {
    self.entities.values()
  }
}

impl fmt::Debug for EntityRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_set().entries(self.entities.keys()).finish()
  }
}
