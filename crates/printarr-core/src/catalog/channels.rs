//! Channel listing and deletion, beyond the upsert/find pair already on
//! `CatalogStore` (spec.md §3: Channel).

use rusqlite::OptionalExtension;

use crate::domain::Channel;
use crate::error::{PrintarrError, Result};

use super::store::CatalogStore;

impl CatalogStore {
    pub fn list_channels(&self) -> Result<Vec<Channel>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM channels ORDER BY title ASC")?;
        let rows = stmt.query_map([], row_to_channel)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_channel(&self, id: &str) -> Result<Option<Channel>> {
        let conn = self.lock();
        conn.query_row("SELECT * FROM channels WHERE id = ?1", rusqlite::params![id], row_to_channel)
            .optional()
            .map_err(PrintarrError::from)
    }

    /// Cascades to messages/attachments/design_sources via `ON DELETE
    /// CASCADE`; designs themselves are untouched since `designs` has no
    /// direct channel foreign key.
    pub fn delete_channel(&self, id: &str) -> Result<()> {
        let conn = self.lock();
        let affected = conn.execute("DELETE FROM channels WHERE id = ?1", rusqlite::params![id])?;
        if affected == 0 {
            return Err(PrintarrError::NotFound {
                resource: "channel".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

fn row_to_channel(row: &rusqlite::Row) -> rusqlite::Result<Channel> {
    let from_json = |raw: String| {
        serde_json::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
    };
    let parse_time = |raw: Option<String>| {
        raw.map(|s| {
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&chrono::Utc))
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
        })
        .transpose()
    };
    Ok(Channel {
        id: row.get("id")?,
        upstream_id: row.get("upstream_id")?,
        title: row.get("title")?,
        enabled: row.get("enabled")?,
        backfill_mode: from_json(row.get("backfill_mode")?)?,
        backfill_value: row.get("backfill_value")?,
        download_mode: from_json(row.get("download_mode")?)?,
        download_mode_enabled_at: parse_time(row.get("download_mode_enabled_at")?)?,
        sync_cursor: row.get("sync_cursor")?,
        import_source_id: row.get("import_source_id")?,
        created_at: parse_time(row.get("created_at")?)?.expect("created_at is NOT NULL"),
        updated_at: parse_time(row.get("updated_at")?)?.expect("updated_at is NOT NULL"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::*;
    use chrono::Utc;

    fn sample() -> Channel {
        let now = Utc::now();
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
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn list_and_get_round_trip() {
        let store = CatalogStore::open_in_memory().unwrap();
        let channel = sample();
        store.upsert_channel(&channel).unwrap();
        assert_eq!(store.list_channels().unwrap().len(), 1);
        assert_eq!(store.get_channel(&channel.id).unwrap().unwrap().title, "Channel 1");
    }

    #[test]
    fn delete_missing_channel_is_not_found() {
        let store = CatalogStore::open_in_memory().unwrap();
        assert!(store.delete_channel("missing").is_err());
    }

    #[test]
    fn delete_channel_cascades_to_messages() {
        let store = CatalogStore::open_in_memory().unwrap();
        let channel = sample();
        store.upsert_channel(&channel).unwrap();
        let message = Message {
            id: new_id(),
            channel_id: channel.id.clone(),
            upstream_id: "m1".to_string(),
            timestamp: Utc::now(),
            author: None,
            caption: None,
            has_media: false,
            created_at: Utc::now(),
        };
        store.upsert_message(&message).unwrap();
        store.delete_channel(&channel.id).unwrap();
        assert_eq!(store.raw_count("messages").unwrap(), 0);
    }
}
