//! Design family CRUD (spec.md §3: DesignFamily; §4.8 family detection).

use rusqlite::OptionalExtension;

use crate::domain::*;
use crate::error::{PrintarrError, Result};

use super::store::CatalogStore;

impl CatalogStore {
    pub fn insert_family(&self, family: &DesignFamily) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO design_families (id, name, detection_method, detection_confidence, created_at)
             VALUES (?1,?2,?3,?4,?5)",
            rusqlite::params![
                family.id,
                family.name,
                serde_json::to_string(&family.detection_method)?,
                family.detection_confidence,
                family.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_family(&self, id: &str) -> Result<Option<DesignFamily>> {
        let conn = self.lock();
        conn.query_row("SELECT * FROM design_families WHERE id = ?1", rusqlite::params![id], row_to_family)
            .optional()
            .map_err(PrintarrError::from)
    }

    pub fn list_families(&self) -> Result<Vec<DesignFamily>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM design_families ORDER BY name ASC")?;
        let rows = stmt.query_map([], row_to_family)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_family_members(&self, family_id: &str) -> Result<Vec<Design>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM designs WHERE family_id = ?1 ORDER BY canonical_title ASC")?;
        let rows = stmt.query_map(rusqlite::params![family_id], super::store::row_to_design)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// F-1: a design belongs to at most one family; re-assignment simply
    /// overwrites `family_id`/`variant_name`.
    pub fn assign_design_to_family(&self, design_id: &str, family_id: &str, variant_name: Option<&str>) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE designs SET family_id = ?1, variant_name = ?2 WHERE id = ?3",
            rusqlite::params![family_id, variant_name, design_id],
        )?;
        Ok(())
    }

    pub fn detach_design_from_family(&self, design_id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE designs SET family_id = NULL, variant_name = NULL WHERE id = ?1",
            rusqlite::params![design_id],
        )?;
        Ok(())
    }

    /// A family with no remaining members is pruned, mirroring how merge
    /// leaves no orphaned rows behind.
    pub fn delete_family_if_empty(&self, family_id: &str) -> Result<()> {
        let conn = self.lock();
        let members: i64 = conn.query_row(
            "SELECT COUNT(*) FROM designs WHERE family_id = ?1",
            rusqlite::params![family_id],
            |r| r.get(0),
        )?;
        if members == 0 {
            conn.execute("DELETE FROM design_families WHERE id = ?1", rusqlite::params![family_id])?;
        }
        Ok(())
    }
}

fn row_to_family(row: &rusqlite::Row) -> rusqlite::Result<DesignFamily> {
    Ok(DesignFamily {
        id: row.get("id")?,
        name: row.get("name")?,
        detection_method: {
            let raw: String = row.get("detection_method")?;
            serde_json::from_str(&raw)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?
        },
        detection_confidence: row.get("detection_confidence")?,
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

    fn sample_design(family_id: Option<&str>) -> Design {
        let now = Utc::now();
        Design {
            id: new_id(),
            canonical_title: "Dragon Variant".to_string(),
            canonical_designer: "Unknown".to_string(),
            title_override: None,
            designer_override: None,
            multicolor_status: MulticolorStatus::Unknown,
            multicolor_source: MulticolorSource::Heuristic,
            status: DesignStatus::Organized,
            primary_file_type: None,
            total_size: 0,
            metadata_authority: MetadataAuthority::Caption,
            import_source_id: None,
            family_id: family_id.map(|s| s.to_string()),
            variant_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn assign_and_list_members() {
        let store = CatalogStore::open_in_memory().unwrap();
        let family = DesignFamily {
            id: new_id(),
            name: "Dragon".to_string(),
            detection_method: FamilyDetectionMethod::FileHashOverlap,
            detection_confidence: 0.8,
            created_at: Utc::now(),
        };
        store.insert_family(&family).unwrap();
        let design = sample_design(None);
        store.insert_design(&design).unwrap();
        store.assign_design_to_family(&design.id, &family.id, Some("v2")).unwrap();

        let members = store.list_family_members(&family.id).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].variant_name.as_deref(), Some("v2"));
    }

    #[test]
    fn detach_clears_family_and_variant() {
        let store = CatalogStore::open_in_memory().unwrap();
        let family = DesignFamily {
            id: new_id(),
            name: "Dragon".to_string(),
            detection_method: FamilyDetectionMethod::NamePattern,
            detection_confidence: 0.6,
            created_at: Utc::now(),
        };
        store.insert_family(&family).unwrap();
        let design = sample_design(Some(&family.id));
        store.insert_design(&design).unwrap();
        store.detach_design_from_family(&design.id).unwrap();
        assert!(store.get_design(&design.id).unwrap().unwrap().family_id.is_none());
    }
}
