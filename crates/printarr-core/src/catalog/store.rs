//! The Catalog Store: a single rusqlite connection wrapped in
//! `Arc<Mutex<Connection>>`, exactly as the teacher's `SqliteCache` and
//! `ModelIndex` share one connection across async callers (spec.md §4.1).

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::domain::*;
use crate::error::{PrintarrError, Result};

use super::schema;

#[derive(Clone)]
pub struct CatalogStore {
    conn: Arc<Mutex<Connection>>,
}

/// Filter + cursor pagination parameters shared by every list query
/// (spec.md §4.1).
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub page: u32,
    pub page_size: u32,
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.page_size as i64
    }

    pub fn limit(&self) -> i64 {
        self.page_size as i64
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
    pub pages: u32,
}

impl CatalogStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| PrintarrError::Io {
                message: "failed to create catalog directory".to_string(),
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("catalog connection mutex poisoned")
    }

    // --- Channels --------------------------------------------------

    pub fn upsert_channel(&self, channel: &Channel) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO channels (id, upstream_id, title, enabled, backfill_mode, backfill_value,
                download_mode, download_mode_enabled_at, sync_cursor, import_source_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title, enabled = excluded.enabled,
                backfill_mode = excluded.backfill_mode, backfill_value = excluded.backfill_value,
                download_mode = excluded.download_mode,
                download_mode_enabled_at = excluded.download_mode_enabled_at,
                sync_cursor = excluded.sync_cursor, updated_at = excluded.updated_at",
            rusqlite::params![
                channel.id,
                channel.upstream_id,
                channel.title,
                channel.enabled,
                serde_json::to_string(&channel.backfill_mode)?,
                channel.backfill_value,
                serde_json::to_string(&channel.download_mode)?,
                channel.download_mode_enabled_at.map(|t| t.to_rfc3339()),
                channel.sync_cursor,
                channel.import_source_id,
                channel.created_at.to_rfc3339(),
                channel.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn find_channel_by_upstream_id(&self, upstream_id: &str) -> Result<Option<Channel>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM channels WHERE upstream_id = ?1")?;
        let mut rows = stmt.query(rusqlite::params![upstream_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row_to_channel(row)?))
        } else {
            Ok(None)
        }
    }

    // --- Messages ----------------------------------------------------

    /// Upsert by `(channel_id, upstream_id)`. Returns `true` if a new row
    /// was inserted (used to enforce invariant I-1: idempotent ingest).
    pub fn upsert_message(&self, message: &Message) -> Result<bool> {
        let conn = self.lock();
        let changed = conn.execute(
            "INSERT INTO messages (id, channel_id, upstream_id, timestamp, author, caption, has_media, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(channel_id, upstream_id) DO NOTHING",
            rusqlite::params![
                message.id,
                message.channel_id,
                message.upstream_id,
                message.timestamp.to_rfc3339(),
                message.author,
                message.caption,
                message.has_media,
                message.created_at.to_rfc3339(),
            ],
        )?;
        Ok(changed == 1)
    }

    pub fn find_message(&self, channel_id: &str, upstream_id: &str) -> Result<Option<Message>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT * FROM messages WHERE channel_id = ?1 AND upstream_id = ?2")?;
        let mut rows = stmt.query(rusqlite::params![channel_id, upstream_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row_to_message(row)?))
        } else {
            Ok(None)
        }
    }

    // --- Designs -------------------------------------------------------

    pub fn insert_design(&self, design: &Design) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO designs (id, canonical_title, canonical_designer, title_override, designer_override,
                multicolor_status, multicolor_source, status, primary_file_type, total_size, metadata_authority,
                import_source_id, family_id, variant_name, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
            rusqlite::params![
                design.id,
                design.canonical_title,
                design.canonical_designer,
                design.title_override,
                design.designer_override,
                serde_json::to_string(&design.multicolor_status)?,
                serde_json::to_string(&design.multicolor_source)?,
                serde_json::to_string(&design.status)?,
                design.primary_file_type,
                design.total_size,
                serde_json::to_string(&design.metadata_authority)?,
                design.import_source_id,
                design.family_id,
                design.variant_name,
                design.created_at.to_rfc3339(),
                design.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_design(&self, id: &str) -> Result<Option<Design>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM designs WHERE id = ?1")?;
        let mut rows = stmt.query(rusqlite::params![id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row_to_design(row)?))
        } else {
            Ok(None)
        }
    }

    /// Enforces D-1: status only transitions forward (or to `DELETED`).
    pub fn update_design_status(&self, id: &str, next: DesignStatus) -> Result<()> {
        let current = self
            .get_design(id)?
            .ok_or_else(|| PrintarrError::NotFound {
                resource: "design".to_string(),
                id: id.to_string(),
            })?;
        if !current.status.can_transition_to(next) {
            return Err(PrintarrError::Conflict {
                message: format!("design {id} cannot transition from {:?} to {next:?}", current.status),
            });
        }
        let conn = self.lock();
        conn.execute(
            "UPDATE designs SET status = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![serde_json::to_string(&next)?, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Applies a multicolor determination, but only if `source` outranks
    /// whatever produced the design's current value (spec.md §4.5's
    /// heuristic < 3MF-analysis < user-override precedence, via
    /// [`crate::multicolor::should_overwrite`]). Returns `false` without
    /// writing if the incoming source is outranked.
    pub fn set_multicolor(
        &self,
        id: &str,
        status: MulticolorStatus,
        source: MulticolorSource,
    ) -> Result<bool> {
        let current = self
            .get_design(id)?
            .ok_or_else(|| PrintarrError::NotFound { resource: "design".to_string(), id: id.to_string() })?;
        if !crate::multicolor::should_overwrite(current.multicolor_source, source) {
            return Ok(false);
        }
        let conn = self.lock();
        conn.execute(
            "UPDATE designs SET multicolor_status = ?1, multicolor_source = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![
                serde_json::to_string(&status)?,
                serde_json::to_string(&source)?,
                Utc::now().to_rfc3339(),
                id
            ],
        )?;
        Ok(true)
    }

    pub fn list_designs_by_status(&self, status: DesignStatus, page: &Page) -> Result<PagedResult<Design>> {
        let conn = self.lock();
        let status_json = serde_json::to_string(&status)?;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM designs WHERE status = ?1",
            rusqlite::params![status_json],
            |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(
            "SELECT * FROM designs WHERE status = ?1 ORDER BY created_at ASC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(rusqlite::params![status_json, page.limit(), page.offset()], row_to_design)?;
        let items = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        let pages = if page.page_size == 0 {
            0
        } else {
            ((total as f64) / (page.page_size as f64)).ceil() as u32
        };
        Ok(PagedResult {
            items,
            total,
            page: page.page,
            page_size: page.page_size,
            pages,
        })
    }

    // --- Design files ---------------------------------------------------

    pub fn insert_design_file(&self, file: &DesignFile) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO design_files (id, design_id, relative_path, filename, extension, size, sha256,
                file_kind, model_kind, is_from_archive, parent_archive_id, is_primary)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            rusqlite::params![
                file.id,
                file.design_id,
                file.relative_path,
                file.filename,
                file.extension,
                file.size,
                file.sha256,
                serde_json::to_string(&file.file_kind)?,
                file.model_kind.map(|k| serde_json::to_string(&k)).transpose()?,
                file.is_from_archive,
                file.parent_archive_id,
                file.is_primary,
            ],
        )?;
        Ok(())
    }

    pub fn list_design_files(&self, design_id: &str) -> Result<Vec<DesignFile>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM design_files WHERE design_id = ?1")?;
        let rows = stmt.query_map(rusqlite::params![design_id], row_to_design_file)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_all_file_hashes(&self) -> Result<Vec<(String, String)>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT design_id, sha256 FROM design_files WHERE sha256 IS NOT NULL")?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // --- Duplicate candidates --------------------------------------

    pub fn insert_duplicate_candidate(
        &self,
        design_id: &str,
        candidate_design_id: &str,
        match_type: MatchType,
    ) -> Result<Id> {
        let conn = self.lock();
        let id = new_id();
        conn.execute(
            "INSERT INTO duplicate_candidates (id, design_id, candidate_design_id, match_type, confidence, status, created_at)
             VALUES (?1,?2,?3,?4,?5,'PENDING',?6)",
            rusqlite::params![
                id,
                design_id,
                candidate_design_id,
                serde_json::to_string(&match_type)?,
                match_type.confidence(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(id)
    }

    /// DD-2: does a pending candidate for this exact pair + match_type
    /// already exist? Used to keep re-ingestion idempotent.
    pub fn has_pending_candidate(&self, design_id: &str, candidate_design_id: &str, match_type: MatchType) -> Result<bool> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM duplicate_candidates
             WHERE design_id = ?1 AND candidate_design_id = ?2 AND match_type = ?3 AND status = 'PENDING'",
            rusqlite::params![design_id, candidate_design_id, serde_json::to_string(&match_type)?],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    // --- Dedupe / family support -------------------------------------
    //
    // Thin tuple suppliers for the pure algorithms in `dedupe.rs` and
    // `family.rs`, which take plain data and never touch the database
    // themselves.

    pub fn list_designs_title_designer(&self) -> Result<Vec<(Id, String, String)>> {
        let conn = self.lock();
        let deleted = serde_json::to_string(&DesignStatus::Deleted)?;
        let mut stmt = conn.prepare(
            "SELECT id, canonical_title, canonical_designer FROM designs WHERE status != ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![deleted], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_all_file_name_sizes(&self) -> Result<Vec<(Id, String, i64)>> {
        let conn = self.lock();
        let deleted = serde_json::to_string(&DesignStatus::Deleted)?;
        let mut stmt = conn.prepare(
            "SELECT df.design_id, df.filename, df.size
             FROM design_files df
             JOIN designs d ON d.id = df.design_id
             WHERE d.status != ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![deleted], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, i64>(2)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// One entry per design that has at least one hashed file: its file
    /// hash set and current family (if any), for `family::find_overlap_candidates`.
    pub fn list_design_hash_sets_with_family(
        &self,
    ) -> Result<Vec<(Id, std::collections::HashSet<String>, Option<Id>)>> {
        let conn = self.lock();
        let deleted = serde_json::to_string(&DesignStatus::Deleted)?;
        let mut stmt = conn.prepare(
            "SELECT d.id, d.family_id, df.sha256
             FROM designs d
             JOIN design_files df ON df.design_id = d.id
             WHERE d.status != ?1 AND df.sha256 IS NOT NULL",
        )?;
        let mut grouped: std::collections::HashMap<Id, (Option<Id>, std::collections::HashSet<String>)> =
            std::collections::HashMap::new();
        let rows = stmt.query_map(rusqlite::params![deleted], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, Option<String>>(1)?, r.get::<_, String>(2)?))
        })?;
        for row in rows {
            let (design_id, family_id, hash) = row?;
            let entry = grouped
                .entry(design_id)
                .or_insert_with(|| (family_id, std::collections::HashSet::new()));
            entry.1.insert(hash);
        }
        Ok(grouped
            .into_iter()
            .map(|(id, (family_id, hashes))| (id, hashes, family_id))
            .collect())
    }

    // --- Settings --------------------------------------------------

    pub fn get_setting_raw(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT value_json FROM settings WHERE key = ?1")?;
        let mut rows = stmt.query(rusqlite::params![key])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    pub fn put_setting_raw(&self, key: &str, value_json: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO settings (key, value_json, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
            rusqlite::params![key, value_json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn delete_setting(&self, key: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM settings WHERE key = ?1", rusqlite::params![key])?;
        Ok(())
    }

    pub fn reset_all_settings(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM settings WHERE key != 'schema_version'", [])?;
        Ok(())
    }

    pub fn raw_count(&self, table: &str) -> Result<i64> {
        let conn = self.lock();
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .map_err(PrintarrError::from)
    }
}

fn parse_time(s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn json_col<T: serde::de::DeserializeOwned>(row: &rusqlite::Row, name: &str) -> rusqlite::Result<T> {
    let raw: String = row.get(name)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn row_to_channel(row: &rusqlite::Row) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get("id")?,
        upstream_id: row.get("upstream_id")?,
        title: row.get("title")?,
        enabled: row.get("enabled")?,
        backfill_mode: json_col(row, "backfill_mode")?,
        backfill_value: row.get("backfill_value")?,
        download_mode: json_col(row, "download_mode")?,
        download_mode_enabled_at: row
            .get::<_, Option<String>>("download_mode_enabled_at")?
            .map(parse_time)
            .transpose()?,
        sync_cursor: row.get("sync_cursor")?,
        import_source_id: row.get("import_source_id")?,
        created_at: parse_time(row.get("created_at")?)?,
        updated_at: parse_time(row.get("updated_at")?)?,
    })
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get("id")?,
        channel_id: row.get("channel_id")?,
        upstream_id: row.get("upstream_id")?,
        timestamp: parse_time(row.get("timestamp")?)?,
        author: row.get("author")?,
        caption: row.get("caption")?,
        has_media: row.get("has_media")?,
        created_at: parse_time(row.get("created_at")?)?,
    })
}

pub(crate) fn row_to_design(row: &rusqlite::Row) -> rusqlite::Result<Design> {
    Ok(Design {
        id: row.get("id")?,
        canonical_title: row.get("canonical_title")?,
        canonical_designer: row.get("canonical_designer")?,
        title_override: row.get("title_override")?,
        designer_override: row.get("designer_override")?,
        multicolor_status: json_col(row, "multicolor_status")?,
        multicolor_source: json_col(row, "multicolor_source")?,
        status: json_col(row, "status")?,
        primary_file_type: row.get("primary_file_type")?,
        total_size: row.get("total_size")?,
        metadata_authority: json_col(row, "metadata_authority")?,
        import_source_id: row.get("import_source_id")?,
        family_id: row.get("family_id")?,
        variant_name: row.get("variant_name")?,
        created_at: parse_time(row.get("created_at")?)?,
        updated_at: parse_time(row.get("updated_at")?)?,
    })
}

fn row_to_design_file(row: &rusqlite::Row) -> rusqlite::Result<DesignFile> {
    Ok(DesignFile {
        id: row.get("id")?,
        design_id: row.get("design_id")?,
        relative_path: row.get("relative_path")?,
        filename: row.get("filename")?,
        extension: row.get("extension")?,
        size: row.get("size")?,
        sha256: row.get("sha256")?,
        file_kind: json_col(row, "file_kind")?,
        model_kind: row
            .get::<_, Option<String>>("model_kind")?
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?,
        is_from_archive: row.get("is_from_archive")?,
        parent_archive_id: row.get("parent_archive_id")?,
        is_primary: row.get("is_primary")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_channel() -> Channel {
        Channel {
            id: new_id(),
            upstream_id: Some("c1".to_string()),
            title: "Channel 1".to_string(),
            enabled: true,
            backfill_mode: BackfillMode::AllHistory,
            backfill_value: None,
            download_mode: DownloadMode::Manual,
            download_mode_enabled_at: None,
            sync_cursor: None,
            import_source_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn i1_message_upsert_is_idempotent_per_channel_and_upstream_id() {
        let store = CatalogStore::open_in_memory().unwrap();
        let channel = sample_channel();
        store.upsert_channel(&channel).unwrap();

        let message = Message {
            id: new_id(),
            channel_id: channel.id.clone(),
            upstream_id: "m1".to_string(),
            timestamp: Utc::now(),
            author: None,
            caption: Some("Dragon v2 #fantasy".to_string()),
            has_media: true,
            created_at: Utc::now(),
        };
        assert!(store.upsert_message(&message).unwrap());
        assert!(!store.upsert_message(&message).unwrap());

        let count = store.raw_count("messages").unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn d1_design_status_transition_is_enforced() {
        let store = CatalogStore::open_in_memory().unwrap();
        let design = Design {
            id: new_id(),
            canonical_title: "Dragon".to_string(),
            canonical_designer: "Unknown".to_string(),
            title_override: None,
            designer_override: None,
            multicolor_status: MulticolorStatus::Unknown,
            multicolor_source: MulticolorSource::Heuristic,
            status: DesignStatus::Discovered,
            primary_file_type: None,
            total_size: 0,
            metadata_authority: MetadataAuthority::Caption,
            import_source_id: None,
            family_id: None,
            variant_name: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.insert_design(&design).unwrap();
        store.update_design_status(&design.id, DesignStatus::Wanted).unwrap();
        let err = store.update_design_status(&design.id, DesignStatus::Discovered);
        assert!(err.is_err());
        store.update_design_status(&design.id, DesignStatus::Deleted).unwrap();
    }
}
