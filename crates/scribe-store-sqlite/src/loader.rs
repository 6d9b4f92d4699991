//! Import and rollback, run synchronously on the connection thread.
//!
//! Both entry points own a single transaction: either every entity write and
//! audit row of the run commits together with the final status change, or
//! none of it does.

use chrono::Utc;
use csv::StringRecord;
use rusqlite::{Connection, OptionalExtension as _};
use scribe_core::{
  Error as CoreError,
  decision::Decision,
  import::{ImportOptions, ImportSummary},
  mapping::FieldMapping,
  row::{EntityRef, RowData, RowOutcome},
  snapshot::{Snapshot, SnapshotStatus},
};
use tracing::debug;

use crate::{
  EntityRegistry, Error, Result, TargetEntity,
  encode::{decode_ref, encode_data, encode_dt, encode_kind},
};

/// Move a snapshot to `Loading`, provided no import has completed yet.
/// Returns `false` if the status had already moved on.
pub fn mark_loading(conn: &Connection, slug: &str) -> Result<bool> {
  let changed = conn.execute(
    "UPDATE snapshots SET status = ?1 WHERE slug = ?2 AND status IN (?3, ?4)",
    rusqlite::params![
      SnapshotStatus::Loading.code(),
      slug,
      SnapshotStatus::Downloaded.code(),
      SnapshotStatus::Loading.code(),
    ],
  )?;
  Ok(changed == 1)
}

/// Parse `content`, reconcile every data row against `target` and write the
/// audit trail, then mark the snapshot `Completed`.
///
/// The snapshot must already be `Loading` (see [`mark_loading`]).
pub fn import_rows(
  conn: &mut Connection,
  snapshot: &Snapshot,
  target: &dyn TargetEntity,
  content: &[u8],
  options: ImportOptions,
) -> Result<ImportSummary> {
  let tx = conn.transaction()?;

  // A concurrent load of the same snapshot may have committed since
  // `mark_loading`.
  match snapshot_status(&tx, &snapshot.slug)? {
    SnapshotStatus::Loading => {}
    SnapshotStatus::Completed | SnapshotStatus::Deleted => {
      return Err(CoreError::AlreadyLoaded(snapshot.slug.clone()).into());
    }
    status => {
      return Err(
        CoreError::InvalidState {
          slug: snapshot.slug.clone(),
          status,
        }
        .into(),
      );
    }
  }

  let mut summary = ImportSummary::new(&snapshot.slug);
  let mut reader = csv::ReaderBuilder::new()
    .has_headers(false)
    .flexible(true)
    .from_reader(content);
  let mut record = StringRecord::new();

  if !reader.read_record(&mut record)? {
    return Err(Error::MissingHeader(snapshot.slug.clone()));
  }
  let header: Vec<String> = record.iter().map(str::to_owned).collect();
  let mapping = FieldMapping::compute(&header, target.fields());
  let reconciler = target.reconciler();

  let mut index = 0u64;
  while reader.read_record(&mut record)? {
    index += 1 + blank_lines_before(content, &record);

    let Some(cells) = options.clean_cells(record.iter()) else {
      summary.skipped += 1;
      continue;
    };
    let data = mapping.zip_row(&cells);

    let decision = match reconciler {
      Some(hook) => hook.reconcile(&tx, &data)?,
      None => Decision::Create(target.create(&tx, &data)?),
    };
    let (outcome, entity) = decision.resolve(target.kind())?;

    insert_audit_row(&tx, &snapshot.slug, index, &data, outcome, entity.as_ref())?;
    debug!(snapshot = %snapshot.slug, index, %outcome, "row recorded");
    summary.record(outcome);
  }

  tx.execute(
    "UPDATE snapshots SET status = ?1, completed_at = ?2 WHERE slug = ?3",
    rusqlite::params![
      SnapshotStatus::Completed.code(),
      encode_dt(Utc::now()),
      snapshot.slug,
    ],
  )?;
  tx.commit()?;
  Ok(summary)
}

// ─── Line accounting ─────────────────────────────────────────────────────────

fn is_line_break(b: u8) -> bool { b == b'\n' || b == b'\r' }

/// Blank lines between the previous record and `record`.
///
/// The reader skips blank lines silently, and the position it reports for a
/// record may sit before them or on the `\n` of a split `\r\n`. So find the
/// record's first byte, then count the line breaks in the run of break bytes
/// ending there (`\r\n` once); one of them terminates the previous record.
fn blank_lines_before(content: &[u8], record: &StringRecord) -> u64 {
  let Some(pos) = record.position() else {
    return 0;
  };
  let from = usize::try_from(pos.byte()).map_or(content.len(), |b| b.min(content.len()));
  let start = from
    + content[from..]
      .iter()
      .take_while(|b| is_line_break(**b))
      .count();
  let run_len = content[..start]
    .iter()
    .rev()
    .take_while(|b| is_line_break(**b))
    .count();
  let run = &content[start - run_len..start];

  let breaks = run
    .iter()
    .enumerate()
    .filter(|&(i, &b)| b == b'\n' || (b == b'\r' && run.get(i + 1) != Some(&b'\n')))
    .count();
  u64::try_from(breaks.saturating_sub(1)).unwrap_or_default()
}

fn snapshot_status(conn: &Connection, slug: &str) -> Result<SnapshotStatus> {
  let code: Option<String> = conn
    .query_row("SELECT status FROM snapshots WHERE slug = ?1", [slug], |r| {
      r.get(0)
    })
    .optional()?;
  match code {
    Some(code) => Ok(SnapshotStatus::from_code(&code)?),
    None => Err(Error::SnapshotNotFound(slug.to_owned())),
  }
}

fn insert_audit_row(
  conn: &Connection,
  snapshot_slug: &str,
  index: u64,
  data: &RowData,
  outcome: RowOutcome,
  target: Option<&EntityRef>,
) -> Result<()> {
  conn.execute(
    "INSERT INTO audit_rows (
       snapshot_slug, row_index, data_json, outcome, target_kind, target_id
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    rusqlite::params![
      snapshot_slug,
      i64::try_from(index).unwrap_or(i64::MAX),
      encode_data(data)?,
      outcome.code(),
      target.map(|t| encode_kind(&t.kind)),
      target.map(|t| t.id),
    ],
  )?;
  Ok(())
}

/// Delete every entity a completed snapshot created, flip those audit rows
/// to `Deleted`, and mark the snapshot `Deleted`. Returns the number of rows
/// reversed.
pub fn delete_created(
  conn: &mut Connection,
  snapshot_slug: &str,
  registry: &EntityRegistry,
) -> Result<usize> {
  let tx = conn.transaction()?;

  // Re-read under the transaction; the caller's check may be stale.
  let status = snapshot_status(&tx, snapshot_slug)?;
  if status != SnapshotStatus::Completed {
    return Err(
      CoreError::InvalidState {
        slug: snapshot_slug.to_owned(),
        status,
      }
      .into(),
    );
  }

  let created: Vec<(i64, String, i64)> = {
    let mut stmt = tx.prepare(
      "SELECT row_id, target_kind, target_id FROM audit_rows
       WHERE snapshot_slug = ?1 AND outcome = ?2 AND target_id IS NOT NULL
       ORDER BY row_index",
    )?;
    stmt
      .query_map(
        rusqlite::params![snapshot_slug, RowOutcome::Created.code()],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
      )?
      .collect::<rusqlite::Result<_>>()?
  };

  for (row_id, kind, id) in &created {
    let entity = decode_ref(kind.clone(), *id)?;
    registry.require(&entity.kind)?.delete(&tx, entity.id)?;
    tx.execute(
      "UPDATE audit_rows SET outcome = ?1, target_kind = NULL, target_id = NULL
       WHERE row_id = ?2",
      rusqlite::params![RowOutcome::Deleted.code(), row_id],
    )?;
    debug!(snapshot = snapshot_slug, %entity, "created entity deleted");
  }

  tx.execute(
    "UPDATE snapshots SET status = ?1 WHERE slug = ?2",
    rusqlite::params![SnapshotStatus::Deleted.code(), snapshot_slug],
  )?;
  tx.commit()?;
  Ok(created.len())
}
