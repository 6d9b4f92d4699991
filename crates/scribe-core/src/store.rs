//! The `SnapshotStore` trait.
//!
//! Implemented by storage backends (e.g. `scribe-store-sqlite`). The fetcher
//! and the CLI depend on this abstraction for record keeping; loading and
//! rollback need the backend's own transaction and entity adapters and live
//! on the concrete store.

use std::future::Future;

use crate::{
  row::{AuditRow, EntityKind, EntityRef, RowOutcome},
  snapshot::{NewSnapshot, Snapshot},
  source::{NewSource, SourceDescriptor},
};

/// Abstraction over the persisted sources, snapshots and audit trail.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait SnapshotStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Sources ───────────────────────────────────────────────────────────

  /// Register a new source. Fails if the slug is taken or invalid.
  fn add_source(
    &self,
    input: NewSource,
  ) -> impl Future<Output = Result<SourceDescriptor, Self::Error>> + Send + '_;

  fn get_source<'a>(
    &'a self,
    slug: &'a str,
  ) -> impl Future<Output = Result<Option<SourceDescriptor>, Self::Error>> + Send + 'a;

  fn list_sources(
    &self,
  ) -> impl Future<Output = Result<Vec<SourceDescriptor>, Self::Error>> + Send + '_;

  /// Re-point a source at another target kind, or detach it.
  fn set_source_target<'a>(
    &'a self,
    slug: &'a str,
    target: Option<EntityKind>,
  ) -> impl Future<Output = Result<SourceDescriptor, Self::Error>> + Send + 'a;

  /// Delete a source together with its snapshots and their audit rows.
  /// Target entities are left alone. Returns `false` if nothing matched.
  fn delete_source<'a>(
    &'a self,
    slug: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  // ── Snapshots ─────────────────────────────────────────────────────────

  /// Persist downloaded content as a new `Downloaded` snapshot.
  fn record_snapshot(
    &self,
    input: NewSnapshot,
  ) -> impl Future<Output = Result<Snapshot, Self::Error>> + Send + '_;

  fn get_snapshot<'a>(
    &'a self,
    slug: &'a str,
  ) -> impl Future<Output = Result<Option<Snapshot>, Self::Error>> + Send + 'a;

  /// The most recently downloaded snapshot of a source.
  fn latest_snapshot<'a>(
    &'a self,
    source_slug: &'a str,
  ) -> impl Future<Output = Result<Option<Snapshot>, Self::Error>> + Send + 'a;

  /// All snapshots of a source, oldest first.
  fn list_snapshots<'a>(
    &'a self,
    source_slug: &'a str,
  ) -> impl Future<Output = Result<Vec<Snapshot>, Self::Error>> + Send + 'a;

  // ── Audit trail ───────────────────────────────────────────────────────

  /// The audit rows of one snapshot in row-index order.
  fn list_rows<'a>(
    &'a self,
    snapshot_slug: &'a str,
  ) -> impl Future<Output = Result<Vec<AuditRow>, Self::Error>> + Send + 'a;

  /// Every audit row, across all snapshots, that points at `target`.
  fn rows_for_target<'a>(
    &'a self,
    target: &'a EntityRef,
  ) -> impl Future<Output = Result<Vec<AuditRow>, Self::Error>> + Send + 'a;

  /// Distinct targets of a snapshot's rows with the given outcome.
  fn targets<'a>(
    &'a self,
    snapshot_slug: &'a str,
    outcome: RowOutcome,
  ) -> impl Future<Output = Result<Vec<EntityRef>, Self::Error>> + Send + 'a;

  /// Distinct non-null targets of a snapshot's rows, whatever the outcome.
  fn related<'a>(
    &'a self,
    snapshot_slug: &'a str,
  ) -> impl Future<Output = Result<Vec<EntityRef>, Self::Error>> + Send + 'a;

  // ── Outcome shorthands ────────────────────────────────────────────────

  fn created<'a>(
    &'a self,
    snapshot_slug: &'a str,
  ) -> impl Future<Output = Result<Vec<EntityRef>, Self::Error>> + Send + 'a {
    self.targets(snapshot_slug, RowOutcome::Created)
  }

  fn updated<'a>(
    &'a self,
    snapshot_slug: &'a str,
  ) -> impl Future<Output = Result<Vec<EntityRef>, Self::Error>> + Send + 'a {
    self.targets(snapshot_slug, RowOutcome::Updated)
  }

  fn ignored<'a>(
    &'a self,
    snapshot_slug: &'a str,
  ) -> impl Future<Output = Result<Vec<EntityRef>, Self::Error>> + Send + 'a {
    self.targets(snapshot_slug, RowOutcome::Ignored)
  }

  fn deleted<'a>(
    &'a self,
    snapshot_slug: &'a str,
  ) -> impl Future<Output = Result<Vec<EntityRef>, Self::Error>> + Send + 'a {
    self.targets(snapshot_slug, RowOutcome::Deleted)
  }

  fn unknown<'a>(
    &'a self,
    snapshot_slug: &'a str,
  ) -> impl Future<Output = Result<Vec<EntityRef>, Self::Error>> + Send + 'a {
    self.targets(snapshot_slug, RowOutcome::Unknown)
  }
}
