//! Integration tests for `SqliteStore` against an in-memory database.

use rusqlite::Connection;
use scribe_core::{
  decision::Decision,
  import::ImportOptions,
  mapping::FieldDecl,
  row::{EntityKind, EntityRef, RowData, RowOutcome},
  snapshot::{NewSnapshot, Snapshot, SnapshotStatus},
  source::NewSource,
  store::SnapshotStore,
};
use tempfile::TempDir;

use crate::{
  ColumnSpec, EntityRegistry, Error, NaturalKey, OnMatch, Reconcile,
  SqliteStore, TableEntity, TableSpec, TargetEntity, loader,
};

// ─── Fixtures ────────────────────────────────────────────────────────────────

const QUESTION_SIMPLE: &str = "\
question_text,pub_date
What is the meaning of life?,2023-06-01T00:00:00Z
Is this a question?,2023-06-02T00:00:00Z
Why?,2023-06-03T00:00:00Z
";

const QUESTION_SPACES: &str = "\
question_text,pub_date
Is this a question? ,2023-06-02T00:00:00Z
";

const QUESTION_EMPTYLINES: &str = "\
question_text,pub_date

Is this a question?,2023-06-02T00:00:00Z
,

";

const QUESTION_NAMEHEADER: &str = "\
question text,date published
What is the meaning of life?,2023-06-01T00:00:00Z
Is this a question?,2023-06-02T00:00:00Z
Why?,2023-06-03T00:00:00Z
";

const NEWS_SIMPLE: &str = "\
slug,news_text,pub_date
first,The first story,2023-06-01T00:00:00Z
second,The second story,2023-06-02T00:00:00Z
third,The third story,2023-06-03T00:00:00Z
";

/// Row 3 repeats row 1's slug.
const NEWS_UNIQUEINVALID: &str = "\
slug,news_text,pub_date
first,The first story,2023-06-01T00:00:00Z
second,The second story,2023-06-02T00:00:00Z
first,The first story revised,2023-06-03T00:00:00Z
";

/// Row 1 updates an entity from NEWS_UNIQUEINVALID; rows 2 and 3 are new.
const NEWS_1UPDATE2CREATE: &str = "\
slug,news_text,pub_date
second,The second story revised,2023-06-04T00:00:00Z
third,The third story,2023-06-05T00:00:00Z
fourth,The fourth story,2023-06-06T00:00:00Z
";

struct Fixture {
  _dir:     TempDir,
  store:    SqliteStore,
  registry: EntityRegistry,
}

fn news_spec(model: &str, on_match: Option<OnMatch>) -> TableSpec {
  TableSpec {
    app:         "sample".into(),
    model:       model.into(),
    table:       None,
    fields:      vec![
      ColumnSpec::new("slug").unique(),
      ColumnSpec::new("news_text"),
      ColumnSpec::new("pub_date").label("date published"),
    ],
    natural_key: on_match.map(|on_match| NaturalKey {
      field: "slug".into(),
      on_match,
    }),
  }
}

/// Creates every row, but files the one with slug "second" under another
/// kind.
struct Misfiling(TableEntity);

impl TargetEntity for Misfiling {
  fn kind(&self) -> &EntityKind { self.0.kind() }

  fn fields(&self) -> &[FieldDecl] { self.0.fields() }

  fn create(&self, conn: &Connection, data: &RowData) -> crate::Result<EntityRef> {
    self.0.create(conn, data)
  }

  fn delete(&self, conn: &Connection, id: i64) -> crate::Result<()> {
    self.0.delete(conn, id)
  }

  fn install(&self, conn: &Connection) -> crate::Result<()> { self.0.install(conn) }

  fn reconciler(&self) -> Option<&dyn Reconcile> { Some(self) }
}

impl Reconcile for Misfiling {
  fn reconcile(&self, conn: &Connection, data: &RowData) -> crate::Result<Decision> {
    let created = self.0.create(conn, data)?;
    if data.get("slug").is_some_and(|s| s == "second") {
      return Ok(Decision::Record(
        EntityRef::new(kind("question"), created.id),
        RowOutcome::Updated,
      ));
    }
    Ok(Decision::Create(created))
  }
}

async fn fixture() -> Fixture {
  let dir = tempfile::tempdir().expect("tempdir");
  let store = SqliteStore::open_in_memory(dir.path())
    .await
    .expect("in-memory store");

  let question = TableEntity::new(TableSpec {
    app:         "sample".into(),
    model:       "question".into(),
    table:       None,
    fields:      vec![
      ColumnSpec::new("question_text"),
      ColumnSpec::new("pub_date").label("date published"),
    ],
    natural_key: None,
  })
  .unwrap();

  let mut registry = EntityRegistry::new();
  registry
    .register(question)
    .register(TableEntity::new(news_spec("news", None)).unwrap())
    .register(TableEntity::new(news_spec("newsb", Some(OnMatch::Ignore))).unwrap())
    .register(TableEntity::new(news_spec("newsc", Some(OnMatch::Update))).unwrap())
    .register(Misfiling(TableEntity::new(news_spec("newsm", None)).unwrap()));
  store.install(&registry).await.unwrap();

  Fixture {
    _dir: dir,
    store,
    registry,
  }
}

fn kind(model: &str) -> EntityKind { EntityKind::new("sample", model) }

/// Register `source` (if new) targeting `sample.{model}` and record `csv` as
/// a fresh snapshot of it.
async fn download(fx: &Fixture, source: &str, model: &str, csv: &str) -> Snapshot {
  if fx.store.get_source(source).await.unwrap().is_none() {
    fx.store
      .add_source(NewSource::new(
        source,
        "https://example.com/data",
        Some(kind(model)),
      ))
      .await
      .unwrap();
  }
  fx.store
    .record_snapshot(NewSnapshot {
      source_slug: source.into(),
      slug:        None,
      url:         "https://example.com/data".into(),
      content:     csv.as_bytes().to_vec(),
    })
    .await
    .unwrap()
}

async fn import(fx: &Fixture, source: &str, model: &str, csv: &str) -> Snapshot {
  let snapshot = download(fx, source, model, csv).await;
  fx.store
    .load(&snapshot.slug, &fx.registry, ImportOptions::default())
    .await
    .unwrap();
  fx.store.get_snapshot(&snapshot.slug).await.unwrap().unwrap()
}

async fn count(fx: &Fixture, model: &str) -> i64 {
  let sql = format!("SELECT COUNT(*) FROM sample_{model}");
  fx.store
    .with_connection(move |c| Ok(c.query_row(&sql, [], |r| r.get(0))?))
    .await
    .unwrap()
}

async fn audit_count(fx: &Fixture) -> i64 {
  fx.store
    .with_connection(|c| {
      Ok(c.query_row("SELECT COUNT(*) FROM audit_rows", [], |r| r.get(0))?)
    })
    .await
    .unwrap()
}

async fn column(fx: &Fixture, model: &str, column: &str) -> Vec<String> {
  let sql = format!("SELECT \"{column}\" FROM sample_{model} ORDER BY id");
  fx.store
    .with_connection(move |c| {
      let mut stmt = c.prepare(&sql)?;
      let values = stmt
        .query_map([], |r| r.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
      Ok(values)
    })
    .await
    .unwrap()
}

// ─── Sources ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_source() {
  let fx = fixture().await;
  let source = fx
    .store
    .add_source(NewSource::new(
      "daily",
      "https://example.com/%Y/%m/%d.csv",
      Some(kind("question")),
    ))
    .await
    .unwrap();

  let fetched = fx.store.get_source("daily").await.unwrap().unwrap();
  assert_eq!(fetched, source);
  assert_eq!(fetched.target, Some(kind("question")));
  assert_eq!(fx.store.list_sources().await.unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_source_slug_is_rejected() {
  let fx = fixture().await;
  let input = NewSource::new("daily", "https://example.com/data", None);
  fx.store.add_source(input.clone()).await.unwrap();
  assert!(matches!(
    fx.store.add_source(input).await,
    Err(Error::Database(_))
  ));
}

#[tokio::test]
async fn invalid_template_is_rejected_up_front() {
  let fx = fixture().await;
  let err = fx
    .store
    .add_source(NewSource::new("bad", "https://example.com/%Q", None))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(scribe_core::Error::InvalidUrlTemplate(_))
  ));
}

#[tokio::test]
async fn retarget_source() {
  let fx = fixture().await;
  fx.store
    .add_source(NewSource::new("daily", "https://example.com/data", None))
    .await
    .unwrap();

  let source = fx
    .store
    .set_source_target("daily", Some(kind("news")))
    .await
    .unwrap();
  assert_eq!(source.target, Some(kind("news")));

  let err = fx
    .store
    .set_source_target("missing", None)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::SourceNotFound(_)));
}

#[tokio::test]
async fn deleting_a_source_cascades_but_keeps_entities() {
  let fx = fixture().await;
  let snapshot = import(&fx, "simple", "question", QUESTION_SIMPLE).await;
  assert!(fx.store.blobs().path(&snapshot.blob_key).exists());

  assert!(fx.store.delete_source("simple").await.unwrap());
  assert!(fx.store.get_snapshot(&snapshot.slug).await.unwrap().is_none());
  assert_eq!(audit_count(&fx).await, 0);
  assert!(!fx.store.blobs().path(&snapshot.blob_key).exists());
  assert_eq!(count(&fx, "question").await, 3);

  assert!(!fx.store.delete_source("simple").await.unwrap());
}

// ─── Snapshots ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn record_snapshot_writes_blob_and_row() {
  let fx = fixture().await;
  let snapshot = download(&fx, "simple", "question", QUESTION_SIMPLE).await;

  assert_eq!(snapshot.status, SnapshotStatus::Downloaded);
  assert_eq!(snapshot.slug.len(), 16);
  assert_eq!(snapshot.blob_key, format!("simple/{}", snapshot.slug));
  assert_eq!(snapshot.size, QUESTION_SIMPLE.len() as u64);
  assert!(snapshot.completed_at.is_none());
  assert_eq!(
    fx.store.blobs().read(&snapshot.blob_key).await.unwrap(),
    QUESTION_SIMPLE.as_bytes()
  );

  let fetched = fx.store.get_snapshot(&snapshot.slug).await.unwrap().unwrap();
  assert_eq!(fetched, snapshot);
}

#[tokio::test]
async fn record_snapshot_for_unknown_source_fails() {
  let fx = fixture().await;
  let err = fx
    .store
    .record_snapshot(NewSnapshot {
      source_slug: "missing".into(),
      slug:        None,
      url:         "https://example.com/data".into(),
      content:     b"a\n1\n".to_vec(),
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::SourceNotFound(_)));
}

#[tokio::test]
async fn latest_snapshot_is_the_newest_download() {
  let fx = fixture().await;
  let first = download(&fx, "simple", "question", QUESTION_SIMPLE).await;
  let second = download(&fx, "simple", "question", QUESTION_SIMPLE).await;

  let latest = fx.store.latest_snapshot("simple").await.unwrap().unwrap();
  assert_eq!(latest.slug, second.slug);

  let all = fx.store.list_snapshots("simple").await.unwrap();
  let slugs: Vec<_> = all.iter().map(|s| s.slug.as_str()).collect();
  assert_eq!(slugs, [first.slug.as_str(), second.slug.as_str()]);
}

// ─── Loading ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn question_simple() {
  let fx = fixture().await;
  let snapshot = import(&fx, "simple", "question", QUESTION_SIMPLE).await;

  assert_eq!(count(&fx, "question").await, 3);
  assert_eq!(snapshot.status, SnapshotStatus::Completed);
  assert!(snapshot.completed_at.is_some());

  let rows = fx.store.list_rows(&snapshot.slug).await.unwrap();
  assert_eq!(rows.len(), 3);
  assert!(rows.iter().all(|r| r.outcome == RowOutcome::Created));
  assert!(rows.iter().all(|r| r.target.is_some()));
  let indices: Vec<u64> = rows.iter().map(|r| r.index).collect();
  assert_eq!(indices, [1, 2, 3]);
  assert_eq!(rows[0].data["question_text"], "What is the meaning of life?");
  assert_eq!(rows[0].data["pub_date"], "2023-06-01T00:00:00Z");
}

#[tokio::test]
async fn load_reports_a_summary() {
  let fx = fixture().await;
  let snapshot = download(&fx, "news", "newsc", NEWS_UNIQUEINVALID).await;
  let summary = fx
    .store
    .load(&snapshot.slug, &fx.registry, ImportOptions::default())
    .await
    .unwrap();

  assert_eq!(summary.snapshot_slug, snapshot.slug);
  assert_eq!(summary.created, 2);
  assert_eq!(summary.updated, 1);
  assert_eq!(summary.rows(), 3);
}

#[tokio::test]
async fn loading_twice_fails_and_changes_nothing() {
  let fx = fixture().await;
  let snapshot = import(&fx, "simple", "question", QUESTION_SIMPLE).await;

  let err = fx
    .store
    .load(&snapshot.slug, &fx.registry, ImportOptions::default())
    .await
    .unwrap_err();
  assert!(err.is_already_loaded());
  assert_eq!(count(&fx, "question").await, 3);
  assert_eq!(audit_count(&fx).await, 3);

  let after = fx.store.get_snapshot(&snapshot.slug).await.unwrap().unwrap();
  assert_eq!(after, snapshot);
}

#[tokio::test]
async fn second_import_is_a_new_snapshot_with_disjoint_rows() {
  let fx = fixture().await;
  let first = import(&fx, "simple", "question", QUESTION_SIMPLE).await;
  let second = import(&fx, "simple", "question", QUESTION_SIMPLE).await;

  assert_ne!(first.slug, second.slug);
  assert_eq!(fx.store.list_snapshots("simple").await.unwrap().len(), 2);
  assert_eq!(audit_count(&fx).await, 6);
  assert_eq!(count(&fx, "question").await, 6);

  let a = fx.store.related(&first.slug).await.unwrap();
  let b = fx.store.related(&second.slug).await.unwrap();
  assert!(a.iter().all(|e| !b.contains(e)));
}

#[tokio::test]
async fn strips_whitespace_by_default() {
  let fx = fixture().await;
  import(&fx, "spaces", "question", QUESTION_SPACES).await;
  assert_eq!(
    column(&fx, "question", "question_text").await,
    ["Is this a question?"]
  );
}

#[tokio::test]
async fn keeps_whitespace_when_stripping_is_off() {
  let fx = fixture().await;
  let snapshot = download(&fx, "spaces", "question", QUESTION_SPACES).await;
  fx.store
    .load(&snapshot.slug, &fx.registry, ImportOptions { strip_values: false })
    .await
    .unwrap();

  assert_eq!(
    column(&fx, "question", "question_text").await,
    ["Is this a question? "]
  );
  let rows = fx.store.list_rows(&snapshot.slug).await.unwrap();
  assert_eq!(rows[0].data["question_text"], "Is this a question? ");
}

#[tokio::test]
async fn blank_rows_are_skipped_but_keep_their_position() {
  let fx = fixture().await;
  let snapshot = download(&fx, "empty", "question", QUESTION_EMPTYLINES).await;
  let summary = fx
    .store
    .load(&snapshot.slug, &fx.registry, ImportOptions::default())
    .await
    .unwrap();

  assert_eq!(
    column(&fx, "question", "question_text").await,
    ["Is this a question?"]
  );
  assert_eq!(summary.skipped, 1);

  let rows = fx.store.list_rows(&snapshot.slug).await.unwrap();
  assert_eq!(rows.len(), 1);
  // The blank line after the header still counts.
  assert_eq!(rows[0].index, 2);
}

#[tokio::test]
async fn crlf_files_are_indexed_like_lf_files() {
  let fx = fixture().await;
  let lf = import(&fx, "lf", "question", QUESTION_SIMPLE).await;
  let crlf = import(&fx, "crlf", "question", &QUESTION_SIMPLE.replace('\n', "\r\n")).await;
  let blanks = import(
    &fx,
    "crlf-blanks",
    "question",
    "question_text,pub_date\r\n\r\nWhy?,2023-06-01\r\n\r\nHow?,2023-06-02\r\n",
  )
  .await;

  let indices = |rows: Vec<scribe_core::row::AuditRow>| -> Vec<u64> {
    rows.iter().map(|r| r.index).collect()
  };
  assert_eq!(indices(fx.store.list_rows(&lf.slug).await.unwrap()), [1, 2, 3]);
  assert_eq!(indices(fx.store.list_rows(&crlf.slug).await.unwrap()), [1, 2, 3]);
  assert_eq!(indices(fx.store.list_rows(&blanks.slug).await.unwrap()), [2, 4]);

  let rows = fx.store.list_rows(&crlf.slug).await.unwrap();
  assert_eq!(rows[2].data["pub_date"], "2023-06-03T00:00:00Z");
}

#[tokio::test]
async fn row_data_keeps_column_order() {
  let fx = fixture().await;
  let csv = "pub_date,question_text\n2023-06-01T00:00:00Z,Why?\n";
  let snapshot = import(&fx, "reversed", "question", csv).await;

  let rows = fx.store.list_rows(&snapshot.slug).await.unwrap();
  let keys: Vec<&str> = rows[0].data.keys().map(String::as_str).collect();
  assert_eq!(keys, ["pub_date", "question_text"]);
}

#[tokio::test]
async fn overlapping_loads_keep_a_single_audit_set() {
  let fx = fixture().await;
  let snapshot = download(&fx, "simple", "question", QUESTION_SIMPLE).await;
  let target = fx.registry.require(&kind("question")).unwrap();

  let (first, second) = fx
    .store
    .with_connection(move |conn| {
      // Both runs pass the loading marker before either commits.
      assert!(loader::mark_loading(conn, &snapshot.slug)?);
      assert!(loader::mark_loading(conn, &snapshot.slug)?);
      let content = QUESTION_SIMPLE.as_bytes();
      let options = ImportOptions::default();
      let first = loader::import_rows(conn, &snapshot, target.as_ref(), content, options);
      let second = loader::import_rows(conn, &snapshot, target.as_ref(), content, options);
      Ok((first, second))
    })
    .await
    .unwrap();

  assert_eq!(first.unwrap().created, 3);
  assert!(second.unwrap_err().is_already_loaded());
  assert_eq!(count(&fx, "question").await, 3);
  assert_eq!(audit_count(&fx).await, 3);
}

#[tokio::test]
async fn header_labels_map_to_field_names() {
  let fx = fixture().await;
  let snapshot = import(&fx, "labels", "question", QUESTION_NAMEHEADER).await;

  assert_eq!(count(&fx, "question").await, 3);
  let rows = fx.store.list_rows(&snapshot.slug).await.unwrap();
  assert!(rows[0].data.contains_key("question_text"));
  assert!(rows[0].data.contains_key("pub_date"));
}

#[tokio::test]
async fn short_and_long_rows_are_truncated_to_the_header() {
  let fx = fixture().await;
  let csv = "question_text,pub_date\nOnly text\nText,2023-06-01,surplus\n";
  let snapshot = import(&fx, "ragged", "question", csv).await;

  let rows = fx.store.list_rows(&snapshot.slug).await.unwrap();
  assert_eq!(rows[0].data.len(), 1);
  assert_eq!(rows[1].data.len(), 2);
  assert_eq!(rows[1].data["pub_date"], "2023-06-01");
}

#[tokio::test]
async fn file_without_a_header_fails() {
  let fx = fixture().await;
  let snapshot = download(&fx, "empty", "question", "").await;
  let err = fx
    .store
    .load(&snapshot.slug, &fx.registry, ImportOptions::default())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::MissingHeader(_)));

  let after = fx.store.get_snapshot(&snapshot.slug).await.unwrap().unwrap();
  assert_eq!(after.status, SnapshotStatus::Loading);
}

#[tokio::test]
async fn header_only_file_completes_with_no_rows() {
  let fx = fixture().await;
  let snapshot = import(&fx, "header", "question", "question_text,pub_date\n").await;
  assert_eq!(snapshot.status, SnapshotStatus::Completed);
  assert_eq!(audit_count(&fx).await, 0);
}

#[tokio::test]
async fn unknown_column_aborts_the_import() {
  let fx = fixture().await;
  let csv = "question_text,colour\nWhy?,red\n";
  let snapshot = download(&fx, "unknown", "question", csv).await;
  let err = fx
    .store
    .load(&snapshot.slug, &fx.registry, ImportOptions::default())
    .await
    .unwrap_err();

  assert!(matches!(err, Error::UnknownField { ref field, .. } if field == "colour"));
  assert_eq!(count(&fx, "question").await, 0);
}

#[tokio::test]
async fn unique_violation_rolls_back_every_row() {
  let fx = fixture().await;
  let snapshot = download(&fx, "news", "news", NEWS_UNIQUEINVALID).await;
  let err = fx
    .store
    .load(&snapshot.slug, &fx.registry, ImportOptions::default())
    .await
    .unwrap_err();

  assert!(matches!(err, Error::Sqlite(_)));
  assert_eq!(count(&fx, "news").await, 0);
  assert_eq!(audit_count(&fx).await, 0);

  // The loading marker survives; the snapshot never reaches Completed.
  let after = fx.store.get_snapshot(&snapshot.slug).await.unwrap().unwrap();
  assert_eq!(after.status, SnapshotStatus::Loading);
  assert!(after.completed_at.is_none());
}

#[tokio::test]
async fn source_without_target_cannot_load() {
  let fx = fixture().await;
  fx.store
    .add_source(NewSource::new("loose", "https://example.com/data", None))
    .await
    .unwrap();
  let snapshot = fx
    .store
    .record_snapshot(NewSnapshot {
      source_slug: "loose".into(),
      slug:        Some("manual-slug".into()),
      url:         "https://example.com/data".into(),
      content:     QUESTION_SIMPLE.as_bytes().to_vec(),
    })
    .await
    .unwrap();
  assert_eq!(snapshot.slug, "manual-slug");

  let err = fx
    .store
    .load(&snapshot.slug, &fx.registry, ImportOptions::default())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::NoTarget(_)));
  let after = fx.store.get_snapshot(&snapshot.slug).await.unwrap().unwrap();
  assert_eq!(after.status, SnapshotStatus::Downloaded);
}

#[tokio::test]
async fn unregistered_target_cannot_load() {
  let fx = fixture().await;
  let snapshot = download(&fx, "choices", "choice", QUESTION_SIMPLE).await;
  let err = fx
    .store
    .load(&snapshot.slug, &fx.registry, ImportOptions::default())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::UnknownEntityKind(_)));
}

// ─── Reconciliation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn news_simple_without_hook() {
  let fx = fixture().await;
  import(&fx, "news", "news", NEWS_SIMPLE).await;
  assert_eq!(count(&fx, "news").await, 3);
}

#[tokio::test]
async fn ignore_existing() {
  let fx = fixture().await;
  let snapshot = import(&fx, "news", "newsb", NEWS_UNIQUEINVALID).await;

  assert_eq!(count(&fx, "newsb").await, 2);
  let rows = fx.store.list_rows(&snapshot.slug).await.unwrap();
  let outcomes: Vec<RowOutcome> = rows.iter().map(|r| r.outcome).collect();
  assert_eq!(
    outcomes,
    [RowOutcome::Created, RowOutcome::Created, RowOutcome::Ignored]
  );
  assert!(rows[2].target.is_none());
  assert_eq!(fx.store.ignored(&snapshot.slug).await.unwrap().len(), 0);
}

#[tokio::test]
async fn update_existing() {
  let fx = fixture().await;
  let snapshot = import(&fx, "news", "newsc", NEWS_UNIQUEINVALID).await;

  assert_eq!(count(&fx, "newsc").await, 2);
  assert_eq!(fx.store.created(&snapshot.slug).await.unwrap().len(), 2);
  assert_eq!(fx.store.updated(&snapshot.slug).await.unwrap().len(), 1);
  assert_eq!(fx.store.related(&snapshot.slug).await.unwrap().len(), 2);
  assert_eq!(
    column(&fx, "newsc", "news_text").await,
    ["The first story revised", "The second story"]
  );
}

#[tokio::test]
async fn update_against_a_preexisting_entity() {
  let fx = fixture().await;
  fx.store
    .with_connection(|c| {
      c.execute(
        "INSERT INTO sample_newsc (slug, news_text, pub_date)
         VALUES ('second', 'Old text', '2023-01-01T00:00:00Z')",
        [],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let csv = "\
slug,news_text,pub_date
first,One,2023-06-01T00:00:00Z
second,Two,2023-06-02T00:00:00Z
third,Three,2023-06-03T00:00:00Z
";
  let snapshot = import(&fx, "news", "newsc", csv).await;

  assert_eq!(count(&fx, "newsc").await, 3);
  assert_eq!(fx.store.created(&snapshot.slug).await.unwrap().len(), 2);
  let updated = fx.store.updated(&snapshot.slug).await.unwrap();
  assert_eq!(updated.len(), 1);
  assert_eq!(updated[0].id, 1);
  assert_eq!(fx.store.related(&snapshot.slug).await.unwrap().len(), 3);

  let history = fx.store.rows_for_target(&updated[0]).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].index, 2);
}

#[tokio::test]
async fn hook_returning_another_kind_aborts_the_import() {
  let fx = fixture().await;
  let snapshot = download(&fx, "news", "newsm", NEWS_SIMPLE).await;
  let err = fx
    .store
    .load(&snapshot.slug, &fx.registry, ImportOptions::default())
    .await
    .unwrap_err();

  assert!(matches!(
    err,
    Error::Core(scribe_core::Error::Reconciliation(_))
  ));
  // Row 1 was created and audited before row 2 failed; neither survives.
  assert_eq!(count(&fx, "newsm").await, 0);
  assert_eq!(audit_count(&fx).await, 0);
  let after = fx.store.get_snapshot(&snapshot.slug).await.unwrap().unwrap();
  assert_eq!(after.status, SnapshotStatus::Loading);
}

// ─── Rollback ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_created_reverses_only_creations() {
  let fx = fixture().await;
  import(&fx, "base", "newsc", NEWS_UNIQUEINVALID).await;
  assert_eq!(count(&fx, "newsc").await, 2);

  let snapshot = import(&fx, "delta", "newsc", NEWS_1UPDATE2CREATE).await;
  assert_eq!(fx.store.created(&snapshot.slug).await.unwrap().len(), 2);
  assert_eq!(fx.store.updated(&snapshot.slug).await.unwrap().len(), 1);
  assert_eq!(fx.store.related(&snapshot.slug).await.unwrap().len(), 3);
  assert_eq!(count(&fx, "newsc").await, 4);
  let audits_before = audit_count(&fx).await;

  let reversed = fx
    .store
    .delete_created(&snapshot.slug, &fx.registry)
    .await
    .unwrap();
  assert_eq!(reversed, 2);
  assert_eq!(count(&fx, "newsc").await, 2);
  assert_eq!(audit_count(&fx).await, audits_before);

  let rows = fx.store.list_rows(&snapshot.slug).await.unwrap();
  assert_eq!(rows[0].outcome, RowOutcome::Updated);
  assert!(rows[0].target.is_some());
  for row in &rows[1..] {
    assert_eq!(row.outcome, RowOutcome::Deleted);
    assert!(row.target.is_none());
    // History survives the entity.
    assert!(!row.data.is_empty());
  }
  // The update itself is not reverted.
  assert!(
    column(&fx, "newsc", "news_text")
      .await
      .contains(&"The second story revised".to_owned())
  );

  let after = fx.store.get_snapshot(&snapshot.slug).await.unwrap().unwrap();
  assert_eq!(after.status, SnapshotStatus::Deleted);
  assert!(fx.store.created(&snapshot.slug).await.unwrap().is_empty());
  assert!(fx.store.deleted(&snapshot.slug).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleted_snapshot_cannot_be_reloaded() {
  let fx = fixture().await;
  let snapshot = import(&fx, "simple", "question", QUESTION_SIMPLE).await;
  fx.store
    .delete_created(&snapshot.slug, &fx.registry)
    .await
    .unwrap();

  let err = fx
    .store
    .load(&snapshot.slug, &fx.registry, ImportOptions::default())
    .await
    .unwrap_err();
  assert!(err.is_already_loaded());
  assert_eq!(count(&fx, "question").await, 0);
}

#[tokio::test]
async fn rollback_requires_a_completed_snapshot() {
  let fx = fixture().await;
  let snapshot = download(&fx, "simple", "question", QUESTION_SIMPLE).await;

  let err = fx
    .store
    .delete_created(&snapshot.slug, &fx.registry)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(scribe_core::Error::InvalidState {
      status: SnapshotStatus::Downloaded,
      ..
    })
  ));

  fx.store
    .load(&snapshot.slug, &fx.registry, ImportOptions::default())
    .await
    .unwrap();
  fx.store
    .delete_created(&snapshot.slug, &fx.registry)
    .await
    .unwrap();
  // A second rollback is refused too.
  assert!(matches!(
    fx.store.delete_created(&snapshot.slug, &fx.registry).await,
    Err(Error::Core(scribe_core::Error::InvalidState { .. }))
  ));
}

#[tokio::test]
async fn rolled_back_ids_are_never_reused() {
  let fx = fixture().await;
  let first = import(&fx, "news", "newsc", NEWS_SIMPLE).await;
  let update = import(
    &fx,
    "news",
    "newsc",
    "slug,news_text,pub_date\nthird,The third story revised,2023-06-04T00:00:00Z\n",
  )
  .await;
  let updated = fx.store.updated(&update.slug).await.unwrap();
  assert_eq!(updated, [EntityRef::new(kind("newsc"), 3)]);

  fx.store
    .delete_created(&first.slug, &fx.registry)
    .await
    .unwrap();
  assert_eq!(count(&fx, "newsc").await, 0);

  let later = import(
    &fx,
    "news",
    "newsc",
    "slug,news_text,pub_date\nx1,One,2023-06-05T00:00:00Z\nx2,Two,2023-06-05T00:00:00Z\nx3,Three,2023-06-05T00:00:00Z\n",
  )
  .await;
  let ids: Vec<i64> = fx
    .store
    .created(&later.slug)
    .await
    .unwrap()
    .iter()
    .map(|e| e.id)
    .collect();
  assert_eq!(ids, [4, 5, 6]);

  // The update still points at the deleted entity and nothing else.
  let history = fx.store.rows_for_target(&updated[0]).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].snapshot_slug, update.slug);
  assert_eq!(history[0].outcome, RowOutcome::Updated);
  assert_eq!(history[0].data["slug"], "third");
}
