//! Import source / folder / profile / record CRUD (spec.md §3: ImportSource,
//! ImportSourceFolder, ImportProfile, ImportRecord; §4.4 local-folder
//! ingestion).

use rusqlite::OptionalExtension;

use crate::domain::*;
use crate::error::{PrintarrError, Result};
use crate::import_profile::ImportProfile;

use super::store::CatalogStore;

impl CatalogStore {
    pub fn insert_import_source(&self, source: &ImportSource) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO import_sources (id, name, profile_id, designer_default, created_at)
             VALUES (?1,?2,?3,?4,?5)",
            rusqlite::params![source.id, source.name, source.profile_id, source.designer_default, source.created_at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_import_source(&self, id: &str) -> Result<Option<ImportSource>> {
        let conn = self.lock();
        conn.query_row("SELECT * FROM import_sources WHERE id = ?1", rusqlite::params![id], row_to_import_source)
            .optional()
            .map_err(PrintarrError::from)
    }

    pub fn list_import_sources(&self) -> Result<Vec<ImportSource>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM import_sources ORDER BY name ASC")?;
        let rows = stmt.query_map([], row_to_import_source)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn insert_import_source_folder(&self, folder: &ImportSourceFolder) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO import_source_folders (id, import_source_id, path, profile_id, designer_override, tag_defaults_json)
             VALUES (?1,?2,?3,?4,?5,?6)",
            rusqlite::params![
                folder.id,
                folder.import_source_id,
                folder.path,
                folder.profile_id,
                folder.designer_override,
                serde_json::to_string(&folder.tag_defaults)?,
            ],
        )?;
        Ok(())
    }

    pub fn list_import_source_folders(&self, import_source_id: &str) -> Result<Vec<ImportSourceFolder>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM import_source_folders WHERE import_source_id = ?1")?;
        let rows = stmt.query_map(rusqlite::params![import_source_id], row_to_folder)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Built-in profiles (`is_builtin = true` on the profile itself) are
    /// seeded once and rejected by callers before reaching this layer; the
    /// store itself just persists.
    pub fn insert_import_profile(&self, profile: &ImportProfile) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO import_profiles (id, name, is_builtin, definition_json) VALUES (?1,?2,?3,?4)",
            rusqlite::params![profile.id, profile.name, profile.is_builtin, serde_json::to_string(profile)?],
        )?;
        Ok(())
    }

    pub fn get_import_profile(&self, id: &str) -> Result<Option<ImportProfile>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT definition_json FROM import_profiles WHERE id = ?1",
            rusqlite::params![id],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .map(|raw| serde_json::from_str(&raw).map_err(PrintarrError::from))
        .transpose()
    }

    pub fn list_import_profiles(&self) -> Result<Vec<ImportProfile>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT definition_json FROM import_profiles ORDER BY name ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(|raw| serde_json::from_str(&raw).map_err(PrintarrError::from))
            .collect()
    }

    /// Idempotent per `(folder_id, source_path)` so a re-scan never
    /// re-queues a path already recorded.
    pub fn upsert_import_record(&self, record: &ImportRecord) -> Result<bool> {
        let conn = self.lock();
        let changed = conn.execute(
            "INSERT INTO import_records (id, folder_id, source_path, status, design_id, last_error, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7)
             ON CONFLICT(folder_id, source_path) DO NOTHING",
            rusqlite::params![
                record.id,
                record.folder_id,
                record.source_path,
                serde_json::to_string(&record.status)?,
                record.design_id,
                record.last_error,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(changed == 1)
    }

    pub fn update_import_record_status(
        &self,
        id: &str,
        status: ImportRecordStatus,
        design_id: Option<&str>,
        last_error: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE import_records SET status = ?1, design_id = ?2, last_error = ?3 WHERE id = ?4",
            rusqlite::params![serde_json::to_string(&status)?, design_id, last_error, id],
        )?;
        Ok(())
    }

    pub fn find_import_record(&self, folder_id: &str, source_path: &str) -> Result<Option<ImportRecord>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT * FROM import_records WHERE folder_id = ?1 AND source_path = ?2",
            rusqlite::params![folder_id, source_path],
            row_to_import_record,
        )
        .optional()
        .map_err(PrintarrError::from)
    }

    pub fn list_pending_import_records(&self, folder_id: &str) -> Result<Vec<ImportRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM import_records WHERE folder_id = ?1 AND status = 'PENDING' ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(rusqlite::params![folder_id], row_to_import_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn row_to_import_source(row: &rusqlite::Row) -> rusqlite::Result<ImportSource> {
    Ok(ImportSource {
        id: row.get("id")?,
        name: row.get("name")?,
        profile_id: row.get("profile_id")?,
        designer_default: row.get("designer_default")?,
        created_at: {
            let raw: String = row.get("created_at")?;
            chrono::DateTime::parse_from_rfc3339(&raw)
                .map(|t| t.with_timezone(&chrono::Utc))
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?
        },
    })
}

fn row_to_folder(row: &rusqlite::Row) -> rusqlite::Result<ImportSourceFolder> {
    let tag_defaults_raw: String = row.get("tag_defaults_json")?;
    Ok(ImportSourceFolder {
        id: row.get("id")?,
        import_source_id: row.get("import_source_id")?,
        path: row.get("path")?,
        profile_id: row.get("profile_id")?,
        designer_override: row.get("designer_override")?,
        tag_defaults: serde_json::from_str(&tag_defaults_raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?,
    })
}

fn row_to_import_record(row: &rusqlite::Row) -> rusqlite::Result<ImportRecord> {
    Ok(ImportRecord {
        id: row.get("id")?,
        folder_id: row.get("folder_id")?,
        source_path: row.get("source_path")?,
        status: {
            let raw: String = row.get("status")?;
            serde_json::from_str(&raw)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?
        },
        design_id: row.get("design_id")?,
        last_error: row.get("last_error")?,
        created_at: {
            let raw: String = row.get("created_at")?;
            chrono::DateTime::parse_from_rfc3339(&raw)
                .map(|t| t.with_timezone(&chrono::Utc))
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn import_record_upsert_is_idempotent() {
        let store = CatalogStore::open_in_memory().unwrap();
        let source = ImportSource {
            id: new_id(),
            name: "NAS".to_string(),
            profile_id: None,
            designer_default: None,
            created_at: Utc::now(),
        };
        store.insert_import_source(&source).unwrap();
        let folder = ImportSourceFolder {
            id: new_id(),
            import_source_id: source.id.clone(),
            path: "/mnt/nas/prints".to_string(),
            profile_id: None,
            designer_override: None,
            tag_defaults: vec!["nas".to_string()],
        };
        store.insert_import_source_folder(&folder).unwrap();

        let record = ImportRecord {
            id: new_id(),
            folder_id: folder.id.clone(),
            source_path: "dragon/model.stl".to_string(),
            status: ImportRecordStatus::Pending,
            design_id: None,
            last_error: None,
            created_at: Utc::now(),
        };
        assert!(store.upsert_import_record(&record).unwrap());
        assert!(!store.upsert_import_record(&record).unwrap());
        assert_eq!(store.list_pending_import_records(&folder.id).unwrap().len(), 1);
    }
}
