//! SQL schema for the Scribe bookkeeping tables.
//!
//! Target entity tables are not declared here; each adapter installs its own
//! (see [`crate::TargetEntity::install`]).

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS sources (
    slug          TEXT PRIMARY KEY,
    url_template  TEXT NOT NULL,     -- strftime template
    data_format   TEXT NOT NULL DEFAULT 'C',
    target_kind   TEXT               -- 'app.model' or NULL
);

CREATE TABLE IF NOT EXISTS snapshots (
    slug            TEXT PRIMARY KEY,
    source_slug     TEXT NOT NULL REFERENCES sources(slug) ON DELETE CASCADE,
    url             TEXT NOT NULL,   -- resolved URL actually fetched
    blob_key        TEXT NOT NULL,   -- '{source}/{snapshot}' under the blob root
    content_sha256  TEXT NOT NULL,
    size            INTEGER NOT NULL,
    status          TEXT NOT NULL DEFAULT 'D',  -- D | L | C | X
    downloaded_at   TEXT NOT NULL,   -- RFC 3339 UTC, fixed width
    completed_at    TEXT
);

-- One row per non-blank data row per import. Only rollback updates a row,
-- flipping outcome 'C' to 'D' and clearing the target.
CREATE TABLE IF NOT EXISTS audit_rows (
    row_id         INTEGER PRIMARY KEY,
    snapshot_slug  TEXT NOT NULL REFERENCES snapshots(slug) ON DELETE CASCADE,
    row_index      INTEGER NOT NULL,
    data_json      TEXT NOT NULL,
    outcome        TEXT NOT NULL DEFAULT 'X',  -- C | U | I | D | X
    target_kind    TEXT,
    target_id      INTEGER,
    UNIQUE (snapshot_slug, row_index),
    CHECK  ((target_kind IS NULL) = (target_id IS NULL))
);

CREATE INDEX IF NOT EXISTS snapshots_source_idx ON snapshots(source_slug, downloaded_at);
CREATE INDEX IF NOT EXISTS audit_rows_target_idx ON audit_rows(target_kind, target_id);

PRAGMA user_version = 1;
";
