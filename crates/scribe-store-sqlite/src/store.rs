//! [`SqliteStore`]: the SQLite implementation of [`SnapshotStore`], plus the
//! import and rollback entry points.

use std::path::Path;

use chrono::{SubsecRound as _, Utc};
use rusqlite::OptionalExtension as _;
use scribe_core::{
  import::{ImportOptions, ImportSummary},
  row::{AuditRow, EntityKind, EntityRef, RowOutcome},
  snapshot::{NewSnapshot, Snapshot, SnapshotStatus, blob_key, generate_slug},
  source::{NewSource, SourceDescriptor, validate_slug},
  store::SnapshotStore,
};
use tracing::{info, warn};

use crate::{
  BlobStore, EntityRegistry, Error, Result,
  blob::sha256_hex,
  encode::{
    AUDIT_ROW_COLUMNS, RawAuditRow, RawSnapshot, RawSource, SNAPSHOT_COLUMNS,
    SOURCE_COLUMNS, decode_ref, encode_dt, encode_kind,
  },
  loader,
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Scribe's bookkeeping tables in a single SQLite file, with raw snapshot
/// payloads in a blob directory beside it.
///
/// The inner connection is reference-counted, so cloning is cheap.
#[derive(Clone)]
pub struct SqliteStore {
  conn:  tokio_rusqlite::Connection,
  blobs: BlobStore,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(
    path: impl AsRef<Path>,
    blob_root: impl AsRef<Path>,
  ) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self {
      conn,
      blobs: BlobStore::new(blob_root.as_ref()),
    };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests. Blobs still go to disk.
  pub async fn open_in_memory(blob_root: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self {
      conn,
      blobs: BlobStore::new(blob_root.as_ref()),
    };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub fn blobs(&self) -> &BlobStore { &self.blobs }

  /// Run `f` on the connection thread, e.g. to read an adapter's own table.
  pub async fn with_connection<F, R>(&self, f: F) -> Result<R>
  where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R> + Send + 'static,
    R: Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }

  /// Let every registered adapter create its storage.
  pub async fn install(&self, registry: &EntityRegistry) -> Result<()> {
    let registry = registry.clone();
    self
      .conn
      .call(move |conn| {
        Ok(
          registry
            .iter()
            .try_for_each(|entity| entity.install(conn)),
        )
      })
      .await??;
    Ok(())
  }

  // ── Import ────────────────────────────────────────────────────────────────

  /// Load a downloaded snapshot into its source's target kind.
  ///
  /// The `Loading` marker is committed before any row is processed and is
  /// left in place if the import fails; the rows themselves commit
  /// atomically together with the `Completed` status.
  pub async fn load(
    &self,
    snapshot_slug: &str,
    registry: &EntityRegistry,
    options: ImportOptions,
  ) -> Result<ImportSummary> {
    let snapshot = self
      .get_snapshot(snapshot_slug)
      .await?
      .ok_or_else(|| Error::SnapshotNotFound(snapshot_slug.to_owned()))?;
    snapshot.ensure_loadable()?;

    let source = self
      .get_source(&snapshot.source_slug)
      .await?
      .ok_or_else(|| Error::SourceNotFound(snapshot.source_slug.clone()))?;
    let kind = source
      .target
      .ok_or_else(|| Error::NoTarget(source.slug.clone()))?;
    let target = registry.require(&kind)?;
    let content = self.blobs.read(&snapshot.blob_key).await?;

    let slug = snapshot.slug.clone();
    let marked = self
      .conn
      .call(move |conn| Ok(loader::mark_loading(conn, &slug)))
      .await??;
    if !marked {
      return Err(scribe_core::Error::AlreadyLoaded(snapshot.slug).into());
    }
    info!(snapshot = %snapshot.slug, source = %snapshot.source_slug, %kind, "loading snapshot");

    let run = snapshot.clone();
    let result = self
      .conn
      .call(move |conn| {
        Ok(loader::import_rows(conn, &run, target.as_ref(), &content, options))
      })
      .await?;

    match &result {
      Ok(summary) => info!(
        snapshot = %snapshot.slug,
        created = summary.created,
        updated = summary.updated,
        ignored = summary.ignored,
        skipped = summary.skipped,
        "snapshot loaded"
      ),
      Err(e) => warn!(snapshot = %snapshot.slug, error = %e, "import aborted; no rows kept"),
    }
    result
  }

  /// Delete every entity the given snapshot created and mark it `Deleted`.
  /// Only `Completed` snapshots can be rolled back.
  pub async fn delete_created(
    &self,
    snapshot_slug: &str,
    registry: &EntityRegistry,
  ) -> Result<usize> {
    let snapshot = self
      .get_snapshot(snapshot_slug)
      .await?
      .ok_or_else(|| Error::SnapshotNotFound(snapshot_slug.to_owned()))?;
    snapshot.ensure_completed()?;

    let registry = registry.clone();
    let slug = snapshot.slug.clone();
    let reversed = self
      .conn
      .call(move |conn| Ok(loader::delete_created(conn, &slug, &registry)))
      .await??;

    info!(snapshot = %snapshot.slug, reversed, "created entities rolled back");
    Ok(reversed)
  }

  // ── Helpers ───────────────────────────────────────────────────────────────

  async fn query_snapshots(
    &self,
    where_clause: &'static str,
    param: String,
  ) -> Result<Vec<Snapshot>> {
    let raws: Vec<RawSnapshot> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SNAPSHOT_COLUMNS} FROM snapshots {where_clause}"
        ))?;
        let rows = stmt
          .query_map([param], RawSnapshot::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSnapshot::into_snapshot).collect()
  }

  async fn query_rows(
    &self,
    where_clause: &'static str,
    params: Vec<rusqlite::types::Value>,
  ) -> Result<Vec<AuditRow>> {
    let raws: Vec<RawAuditRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {AUDIT_ROW_COLUMNS} FROM audit_rows {where_clause}"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawAuditRow::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAuditRow::into_audit_row).collect()
  }

  async fn query_targets(
    &self,
    where_clause: &'static str,
    params: Vec<rusqlite::types::Value>,
  ) -> Result<Vec<EntityRef>> {
    let pairs: Vec<(String, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT DISTINCT target_kind, target_id FROM audit_rows
           {where_clause} AND target_id IS NOT NULL
           ORDER BY target_kind, target_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), |r| {
            Ok((r.get(0)?, r.get(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    pairs
      .into_iter()
      .map(|(kind, id)| decode_ref(kind, id))
      .collect()
  }
}

// ─── SnapshotStore impl ──────────────────────────────────────────────────────

impl SnapshotStore for SqliteStore {
  type Error = Error;

  // ── Sources ───────────────────────────────────────────────────────────────

  async fn add_source(&self, input: NewSource) -> Result<SourceDescriptor> {
    input.validate()?;
    let source = input.into_descriptor();

    let slug       = source.slug.clone();
    let template   = source.url_template.clone();
    let format_str = source.data_format.code();
    let target_str = source.target.as_ref().map(encode_kind);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sources (slug, url_template, data_format, target_kind)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![slug, template, format_str, target_str],
        )?;
        Ok(())
      })
      .await?;

    info!(source = %source.slug, url = %source.url_template, "source registered");
    Ok(source)
  }

  async fn get_source(&self, slug: &str) -> Result<Option<SourceDescriptor>> {
    let slug = slug.to_owned();

    let raw: Option<RawSource> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE slug = ?1"),
              [slug],
              RawSource::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSource::into_source).transpose()
  }

  async fn list_sources(&self) -> Result<Vec<SourceDescriptor>> {
    let raws: Vec<RawSource> = self
      .conn
      .call(|conn| {
        let mut stmt = conn
          .prepare(&format!("SELECT {SOURCE_COLUMNS} FROM sources ORDER BY slug"))?;
        let rows = stmt
          .query_map([], RawSource::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSource::into_source).collect()
  }

  async fn set_source_target(
    &self,
    slug:   &str,
    target: Option<EntityKind>,
  ) -> Result<SourceDescriptor> {
    let slug_str   = slug.to_owned();
    let target_str = target.as_ref().map(encode_kind);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE sources SET target_kind = ?1 WHERE slug = ?2",
          rusqlite::params![target_str, slug_str],
        )?)
      })
      .await?;
    if changed == 0 {
      return Err(Error::SourceNotFound(slug.to_owned()));
    }

    self
      .get_source(slug)
      .await?
      .ok_or_else(|| Error::SourceNotFound(slug.to_owned()))
  }

  async fn delete_source(&self, slug: &str) -> Result<bool> {
    let slug_str = slug.to_owned();
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM sources WHERE slug = ?1", [slug_str])?)
      })
      .await?;

    if changed == 0 {
      return Ok(false);
    }
    self.blobs.remove_source(slug).await?;
    info!(source = slug, "source deleted");
    Ok(true)
  }

  // ── Snapshots ─────────────────────────────────────────────────────────────

  async fn record_snapshot(&self, input: NewSnapshot) -> Result<Snapshot> {
    if self.get_source(&input.source_slug).await?.is_none() {
      return Err(Error::SourceNotFound(input.source_slug));
    }
    let slug = input.slug.unwrap_or_else(generate_slug);
    validate_slug(&slug)?;

    let snapshot = Snapshot {
      blob_key:       blob_key(&input.source_slug, &slug),
      content_sha256: sha256_hex(&input.content),
      size:           input.content.len() as u64,
      slug,
      source_slug:    input.source_slug,
      url:            input.url,
      status:         SnapshotStatus::Downloaded,
      downloaded_at:  Utc::now().trunc_subsecs(6),
      completed_at:   None,
    };

    self.blobs.write_new(&snapshot.blob_key, &input.content).await?;

    let row = snapshot.clone();
    let inserted = self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO snapshots ({SNAPSHOT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL)"
          ),
          rusqlite::params![
            row.slug,
            row.source_slug,
            row.url,
            row.blob_key,
            row.content_sha256,
            i64::try_from(row.size).unwrap_or(i64::MAX),
            row.status.code(),
            encode_dt(row.downloaded_at),
          ],
        )?;
        Ok(())
      })
      .await;

    if let Err(e) = inserted {
      // Keep blob and table in step: no record, no payload.
      self.blobs.remove(&snapshot.blob_key).await?;
      return Err(e.into());
    }

    info!(
      snapshot = %snapshot.slug,
      source = %snapshot.source_slug,
      bytes = snapshot.size,
      "snapshot recorded"
    );
    Ok(snapshot)
  }

  async fn get_snapshot(&self, slug: &str) -> Result<Option<Snapshot>> {
    let mut found = self
      .query_snapshots("WHERE slug = ?1", slug.to_owned())
      .await?;
    Ok(found.pop())
  }

  async fn latest_snapshot(&self, source_slug: &str) -> Result<Option<Snapshot>> {
    let mut found = self
      .query_snapshots(
        "WHERE source_slug = ?1 ORDER BY downloaded_at DESC, rowid DESC LIMIT 1",
        source_slug.to_owned(),
      )
      .await?;
    Ok(found.pop())
  }

  async fn list_snapshots(&self, source_slug: &str) -> Result<Vec<Snapshot>> {
    self
      .query_snapshots(
        "WHERE source_slug = ?1 ORDER BY downloaded_at, rowid",
        source_slug.to_owned(),
      )
      .await
  }

  // ── Audit trail ───────────────────────────────────────────────────────────

  async fn list_rows(&self, snapshot_slug: &str) -> Result<Vec<AuditRow>> {
    self
      .query_rows(
        "WHERE snapshot_slug = ?1 ORDER BY row_index",
        vec![snapshot_slug.to_owned().into()],
      )
      .await
  }

  async fn rows_for_target(&self, target: &EntityRef) -> Result<Vec<AuditRow>> {
    self
      .query_rows(
        "WHERE target_kind = ?1 AND target_id = ?2 ORDER BY row_id",
        vec![encode_kind(&target.kind).into(), target.id.into()],
      )
      .await
  }

  async fn targets(
    &self,
    snapshot_slug: &str,
    outcome:       RowOutcome,
  ) -> Result<Vec<EntityRef>> {
    self
      .query_targets(
        "WHERE snapshot_slug = ?1 AND outcome = ?2",
        vec![
          snapshot_slug.to_owned().into(),
          outcome.code().to_owned().into(),
        ],
      )
      .await
  }

  async fn related(&self, snapshot_slug: &str) -> Result<Vec<EntityRef>> {
    self
      .query_targets(
        "WHERE snapshot_slug = ?1",
        vec![snapshot_slug.to_owned().into()],
      )
      .await
  }
}
