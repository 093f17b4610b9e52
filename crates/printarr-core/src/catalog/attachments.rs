//! Attachment and message-scoped design-source CRUD (spec.md §3: Message,
//! Attachment, DesignSource).

use chrono::Utc;
use rusqlite::OptionalExtension;

use crate::domain::*;
use crate::error::{PrintarrError, Result};

use super::store::CatalogStore;

impl CatalogStore {
    pub fn insert_attachment(&self, attachment: &Attachment) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO attachments (id, message_id, media_kind, filename, mime, size, extension,
                is_candidate_design_file, download_status, local_path, sha256)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            rusqlite::params![
                attachment.id,
                attachment.message_id,
                serde_json::to_string(&attachment.media_kind)?,
                attachment.filename,
                attachment.mime,
                attachment.size,
                attachment.extension,
                attachment.is_candidate_design_file,
                serde_json::to_string(&attachment.download_status)?,
                attachment.local_path,
                attachment.sha256,
            ],
        )?;
        Ok(())
    }

    pub fn list_attachments_for_message(&self, message_id: &str) -> Result<Vec<Attachment>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM attachments WHERE message_id = ?1")?;
        let rows = stmt.query_map(rusqlite::params![message_id], row_to_attachment)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_attachment(&self, id: &str) -> Result<Option<Attachment>> {
        let conn = self.lock();
        conn.query_row("SELECT * FROM attachments WHERE id = ?1", rusqlite::params![id], row_to_attachment)
            .optional()
            .map_err(PrintarrError::from)
    }

    pub fn update_attachment_download_state(
        &self,
        id: &str,
        status: AttachmentDownloadStatus,
        local_path: Option<&str>,
        sha256: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE attachments SET download_status = ?1, local_path = ?2, sha256 = ?3 WHERE id = ?4",
            rusqlite::params![serde_json::to_string(&status)?, local_path, sha256, id],
        )?;
        Ok(())
    }

    /// Idempotent per `(channel_id, message_id)` — a design that already
    /// aggregates this message is not linked twice.
    pub fn link_design_source(&self, design_id: &str, channel_id: &str, message_id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO design_sources (id, design_id, channel_id, message_id) VALUES (?1,?2,?3,?4)
             ON CONFLICT(channel_id, message_id) DO NOTHING",
            rusqlite::params![new_id(), design_id, channel_id, message_id],
        )?;
        Ok(())
    }

    pub fn list_design_sources(&self, design_id: &str) -> Result<Vec<DesignSource>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM design_sources WHERE design_id = ?1")?;
        let rows = stmt.query_map(rusqlite::params![design_id], |row| {
            Ok(DesignSource {
                id: row.get("id")?,
                design_id: row.get("design_id")?,
                channel_id: row.get("channel_id")?,
                message_id: row.get("message_id")?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Reassigns every `design_sources` row from `loser_id` to `survivor_id`,
    /// used by merge (spec.md §4.7).
    pub fn reassign_design_sources(&self, loser_id: &str, survivor_id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE OR IGNORE design_sources SET design_id = ?1 WHERE design_id = ?2",
            rusqlite::params![survivor_id, loser_id],
        )?;
        conn.execute("DELETE FROM design_sources WHERE design_id = ?1", rusqlite::params![loser_id])?;
        Ok(())
    }

    pub fn update_design_file(&self, id: &str, relative_path: &str, sha256: Option<&str>) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE design_files SET relative_path = ?1, sha256 = ?2 WHERE id = ?3",
            rusqlite::params![relative_path, sha256, id],
        )?;
        Ok(())
    }

    /// Removes a `design_files` row whose backing file on disk is gone,
    /// e.g. an archive deleted after extraction (spec.md L-1: every
    /// catalogued file must resolve to something on disk).
    pub fn delete_design_file(&self, id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM design_files WHERE id = ?1", rusqlite::params![id])?;
        Ok(())
    }

    pub fn set_primary_design_file(&self, design_id: &str, file_id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE design_files SET is_primary = 0 WHERE design_id = ?1",
            rusqlite::params![design_id],
        )?;
        conn.execute(
            "UPDATE design_files SET is_primary = 1 WHERE id = ?1",
            rusqlite::params![file_id],
        )?;
        Ok(())
    }

    pub fn reassign_design_files(&self, loser_id: &str, survivor_id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE design_files SET design_id = ?1 WHERE design_id = ?2",
            rusqlite::params![survivor_id, loser_id],
        )?;
        Ok(())
    }

    pub fn touch_design(&self, id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE designs SET updated_at = ?1 WHERE id = ?2",
            rusqlite::params![Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }
}

fn row_to_attachment(row: &rusqlite::Row) -> rusqlite::Result<Attachment> {
    let from_json = |raw: String| {
        serde_json::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
    };
    Ok(Attachment {
        id: row.get("id")?,
        message_id: row.get("message_id")?,
        media_kind: from_json(row.get("media_kind")?)?,
        filename: row.get("filename")?,
        mime: row.get("mime")?,
        size: row.get("size")?,
        extension: row.get("extension")?,
        is_candidate_design_file: row.get("is_candidate_design_file")?,
        download_status: from_json(row.get("download_status")?)?,
        local_path: row.get("local_path")?,
        sha256: row.get("sha256")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn seed(store: &CatalogStore) -> (String, String, String) {
        let now = Utc::now();
        let channel = Channel {
            id: new_id(),
            upstream_id: Some("c1".to_string()),
            title: "Channel".to_string(),
            enabled: true,
            backfill_mode: BackfillMode::AllHistory,
            backfill_value: None,
            download_mode: DownloadMode::Manual,
            download_mode_enabled_at: None,
            sync_cursor: None,
            import_source_id: None,
            created_at: now,
            updated_at: now,
        };
        store.upsert_channel(&channel).unwrap();
        let message = Message {
            id: new_id(),
            channel_id: channel.id.clone(),
            upstream_id: "m1".to_string(),
            timestamp: now,
            author: None,
            caption: None,
            has_media: true,
            created_at: now,
        };
        store.upsert_message(&message).unwrap();
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
            created_at: now,
            updated_at: now,
        };
        store.insert_design(&design).unwrap();
        (channel.id, message.id, design.id)
    }

    #[test]
    fn design_source_link_is_idempotent() {
        let store = CatalogStore::open_in_memory().unwrap();
        let (channel_id, message_id, design_id) = seed(&store);
        store.link_design_source(&design_id, &channel_id, &message_id).unwrap();
        store.link_design_source(&design_id, &channel_id, &message_id).unwrap();
        assert_eq!(store.list_design_sources(&design_id).unwrap().len(), 1);
    }
}
