//! Schema bootstrap: `CREATE TABLE IF NOT EXISTS` for every entity plus
//! the FTS5 virtual table over designs, following the teacher's
//! `index/fts5.rs` setup pattern. No migration-file chain — schema
//! evolution (if ever needed) bumps the `schema_version` setting row
//! instead (SPEC_FULL.md §4).

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

const DDL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS channels (
    id TEXT PRIMARY KEY,
    upstream_id TEXT,
    title TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    backfill_mode TEXT NOT NULL,
    backfill_value INTEGER,
    download_mode TEXT NOT NULL,
    download_mode_enabled_at TEXT,
    sync_cursor TEXT,
    import_source_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS ix_channels_import_source ON channels(import_source_id)
    WHERE import_source_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    channel_id TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
    upstream_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    author TEXT,
    caption TEXT,
    has_media INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE(channel_id, upstream_id)
);
CREATE INDEX IF NOT EXISTS ix_messages_channel ON messages(channel_id);

CREATE TABLE IF NOT EXISTS attachments (
    id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
    media_kind TEXT NOT NULL,
    filename TEXT NOT NULL,
    mime TEXT,
    size INTEGER NOT NULL,
    extension TEXT,
    is_candidate_design_file INTEGER NOT NULL DEFAULT 0,
    download_status TEXT NOT NULL DEFAULT 'NOT_DOWNLOADED',
    local_path TEXT,
    sha256 TEXT
);
CREATE INDEX IF NOT EXISTS ix_attachments_message ON attachments(message_id);

CREATE TABLE IF NOT EXISTS designs (
    id TEXT PRIMARY KEY,
    canonical_title TEXT NOT NULL,
    canonical_designer TEXT NOT NULL,
    title_override TEXT,
    designer_override TEXT,
    multicolor_status TEXT NOT NULL DEFAULT 'UNKNOWN',
    multicolor_source TEXT NOT NULL DEFAULT 'HEURISTIC',
    status TEXT NOT NULL DEFAULT 'DISCOVERED',
    primary_file_type TEXT,
    total_size INTEGER NOT NULL DEFAULT 0,
    metadata_authority TEXT NOT NULL DEFAULT 'CAPTION',
    import_source_id TEXT,
    family_id TEXT REFERENCES design_families(id) ON DELETE SET NULL,
    variant_name TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_designs_status ON designs(status);
CREATE INDEX IF NOT EXISTS ix_designs_family ON designs(family_id);

CREATE TABLE IF NOT EXISTS design_sources (
    id TEXT PRIMARY KEY,
    design_id TEXT NOT NULL REFERENCES designs(id) ON DELETE CASCADE,
    channel_id TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
    message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
    UNIQUE(channel_id, message_id)
);
CREATE INDEX IF NOT EXISTS ix_design_sources_design ON design_sources(design_id);

CREATE TABLE IF NOT EXISTS design_files (
    id TEXT PRIMARY KEY,
    design_id TEXT NOT NULL REFERENCES designs(id) ON DELETE CASCADE,
    relative_path TEXT NOT NULL,
    filename TEXT NOT NULL,
    extension TEXT,
    size INTEGER NOT NULL,
    sha256 TEXT,
    file_kind TEXT NOT NULL,
    model_kind TEXT,
    is_from_archive INTEGER NOT NULL DEFAULT 0,
    parent_archive_id TEXT REFERENCES design_files(id) ON DELETE SET NULL,
    is_primary INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS ix_design_files_design ON design_files(design_id);
CREATE INDEX IF NOT EXISTS ix_design_files_sha256 ON design_files(sha256);

CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'QUEUED',
    priority INTEGER NOT NULL DEFAULT 0,
    design_id TEXT REFERENCES designs(id) ON DELETE SET NULL,
    channel_id TEXT REFERENCES channels(id) ON DELETE SET NULL,
    payload_json TEXT,
    result_json TEXT,
    progress_current INTEGER,
    progress_total INTEGER,
    attempts INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL DEFAULT 4,
    next_retry_at TEXT,
    last_error TEXT,
    display_name TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    finished_at TEXT
);
CREATE INDEX IF NOT EXISTS ix_jobs_status_kind_priority ON jobs(status, kind, priority);
CREATE INDEX IF NOT EXISTS ix_jobs_design ON jobs(design_id);
CREATE INDEX IF NOT EXISTS ix_jobs_channel ON jobs(channel_id);

CREATE TABLE IF NOT EXISTS tags (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    category TEXT,
    is_predefined INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS design_tags (
    design_id TEXT NOT NULL REFERENCES designs(id) ON DELETE CASCADE,
    tag_id TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    source TEXT NOT NULL,
    PRIMARY KEY (design_id, tag_id)
);

CREATE TABLE IF NOT EXISTS design_families (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    detection_method TEXT NOT NULL,
    detection_confidence REAL NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS family_tags (
    family_id TEXT NOT NULL REFERENCES design_families(id) ON DELETE CASCADE,
    tag_id TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    source TEXT NOT NULL,
    PRIMARY KEY (family_id, tag_id)
);

CREATE TABLE IF NOT EXISTS import_sources (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    profile_id TEXT,
    designer_default TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS import_source_folders (
    id TEXT PRIMARY KEY,
    import_source_id TEXT NOT NULL REFERENCES import_sources(id) ON DELETE CASCADE,
    path TEXT NOT NULL,
    profile_id TEXT,
    designer_override TEXT,
    tag_defaults_json TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS import_profiles (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    is_builtin INTEGER NOT NULL DEFAULT 0,
    definition_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS import_records (
    id TEXT PRIMARY KEY,
    folder_id TEXT NOT NULL REFERENCES import_source_folders(id) ON DELETE CASCADE,
    source_path TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'PENDING',
    design_id TEXT REFERENCES designs(id) ON DELETE SET NULL,
    last_error TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(folder_id, source_path)
);

CREATE TABLE IF NOT EXISTS duplicate_candidates (
    id TEXT PRIMARY KEY,
    design_id TEXT NOT NULL REFERENCES designs(id) ON DELETE CASCADE,
    candidate_design_id TEXT NOT NULL REFERENCES designs(id) ON DELETE CASCADE,
    match_type TEXT NOT NULL,
    confidence REAL NOT NULL,
    status TEXT NOT NULL DEFAULT 'PENDING',
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_duplicate_candidates_design ON duplicate_candidates(design_id);

CREATE TABLE IF NOT EXISTS preview_assets (
    id TEXT PRIMARY KEY,
    design_id TEXT NOT NULL REFERENCES designs(id) ON DELETE CASCADE,
    source TEXT NOT NULL,
    file_path TEXT NOT NULL,
    width INTEGER,
    height INTEGER,
    is_primary INTEGER NOT NULL DEFAULT 0,
    sort_order INTEGER NOT NULL DEFAULT 0,
    ai_selected INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS ix_preview_assets_design ON preview_assets(design_id);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Discovered-but-not-onboarded channels surfaced by the chat adapter
-- (SPEC_FULL.md §2, supplemented from `discovered_channel.py`).
CREATE TABLE IF NOT EXISTS discovered_channels (
    id TEXT PRIMARY KEY,
    upstream_id TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    member_count INTEGER,
    discovered_at TEXT NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS designs_fts USING fts5(
    canonical_title,
    canonical_designer,
    content='designs',
    content_rowid='rowid',
    tokenize='unicode61 remove_diacritics 1'
);

CREATE TRIGGER IF NOT EXISTS designs_fts_insert AFTER INSERT ON designs BEGIN
    INSERT INTO designs_fts(rowid, canonical_title, canonical_designer)
    VALUES (new.rowid, new.canonical_title, new.canonical_designer);
END;

CREATE TRIGGER IF NOT EXISTS designs_fts_delete AFTER DELETE ON designs BEGIN
    INSERT INTO designs_fts(designs_fts, rowid, canonical_title, canonical_designer)
    VALUES ('delete', old.rowid, old.canonical_title, old.canonical_designer);
END;

CREATE TRIGGER IF NOT EXISTS designs_fts_update AFTER UPDATE ON designs BEGIN
    INSERT INTO designs_fts(designs_fts, rowid, canonical_title, canonical_designer)
    VALUES ('delete', old.rowid, old.canonical_title, old.canonical_designer);
    INSERT INTO designs_fts(rowid, canonical_title, canonical_designer)
    VALUES (new.rowid, new.canonical_title, new.canonical_designer);
END;
"#;

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(DDL)?;
    conn.execute(
        "INSERT INTO settings(key, value_json, updated_at) VALUES ('schema_version', ?1, ?2)
         ON CONFLICT(key) DO NOTHING",
        rusqlite::params![SCHEMA_VERSION.to_string(), chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_bootstraps_on_fresh_connection() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type='table'", [], |r| r.get(0))
            .unwrap();
        assert!(count > 10);
    }

    #[test]
    fn schema_bootstrap_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
    }
}
