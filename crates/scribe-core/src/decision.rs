//! Reconciliation decisions returned by a target's hook.

use crate::{
  Error, Result,
  row::{EntityKind, EntityRef, RowOutcome},
};

/// What a reconciliation hook decided to do with one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
  /// Nothing was written; recorded as [`RowOutcome::Ignored`].
  Ignore,
  /// A new entity was created; recorded as [`RowOutcome::Created`].
  Create(EntityRef),
  /// The hook classifies the row itself, e.g. an update of an existing
  /// entity.
  Record(EntityRef, RowOutcome),
}

impl Decision {
  /// Validate the decision against the import's target kind and return the
  /// outcome and reference to store on the audit row.
  pub fn resolve(
    self,
    target: &EntityKind,
  ) -> Result<(RowOutcome, Option<EntityRef>)> {
    match self {
      Self::Ignore => Ok((RowOutcome::Ignored, None)),
      Self::Create(entity) => {
        check_kind(&entity, target)?;
        Ok((RowOutcome::Created, Some(entity)))
      }
      Self::Record(entity, outcome) => {
        check_kind(&entity, target)?;
        Ok((outcome, Some(entity)))
      }
    }
  }
}

fn check_kind(entity: &EntityRef, target: &EntityKind) -> Result<()> {
  if &entity.kind != target {
    return Err(Error::Reconciliation(format!(
      "{entity} should be an instance of {target}"
    )));
  }
  Ok(())
}
