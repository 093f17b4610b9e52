//! Design merge (spec.md §4.7): the survivor absorbs the loser's sources,
//! files, and tags; the loser is tombstoned rather than deleted outright
//! so its id keeps resolving for anything still referencing it.

use crate::domain::*;
use crate::error::Result;

use super::store::CatalogStore;

impl CatalogStore {
    pub fn list_duplicate_candidates_for_design(&self, design_id: &str) -> Result<Vec<DuplicateCandidate>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM duplicate_candidates WHERE design_id = ?1 OR candidate_design_id = ?1
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(rusqlite::params![design_id], row_to_duplicate_candidate)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn reject_duplicate_candidate(&self, id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE duplicate_candidates SET status = 'REJECTED' WHERE id = ?1",
            rusqlite::params![id],
        )?;
        Ok(())
    }

    /// Merges `loser_id` into `survivor_id`. The loser keeps its row
    /// (status `DELETED`, family cleared) for referential integrity;
    /// every `DuplicateCandidate` naming either design is resolved to
    /// `MERGED` (the pair just actioned) or `REJECTED` (any other pending
    /// candidate that named the now-deleted loser).
    pub fn merge_designs(&self, survivor_id: &str, loser_id: &str) -> Result<()> {
        self.reassign_design_sources(loser_id, survivor_id)?;
        self.reassign_design_files(loser_id, survivor_id)?;
        self.reassign_design_tags(loser_id, survivor_id)?;
        self.detach_design_from_family(loser_id)?;
        self.resolve_duplicate_candidates_for_merge(survivor_id, loser_id)?;
        self.update_design_status(loser_id, DesignStatus::Deleted)?;
        self.touch_design(survivor_id)?;
        Ok(())
    }

    fn resolve_duplicate_candidates_for_merge(&self, survivor_id: &str, loser_id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE duplicate_candidates SET status = 'MERGED'
             WHERE status = 'PENDING'
               AND ((design_id = ?1 AND candidate_design_id = ?2) OR (design_id = ?2 AND candidate_design_id = ?1))",
            rusqlite::params![survivor_id, loser_id],
        )?;
        conn.execute(
            "UPDATE duplicate_candidates SET status = 'REJECTED'
             WHERE status = 'PENDING' AND (design_id = ?1 OR candidate_design_id = ?1)",
            rusqlite::params![loser_id],
        )?;
        Ok(())
    }
}

fn row_to_duplicate_candidate(row: &rusqlite::Row) -> rusqlite::Result<DuplicateCandidate> {
    // `match_type` is written through `serde_json::to_string` (already
    // quoted); `status` is written as a bare SQL literal ('PENDING' etc)
    // and needs quoting before it parses as JSON.
    let json_enum = |raw: String| {
        serde_json::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
    };
    let bare_enum = |raw: String| {
        serde_json::from_str(&format!("\"{raw}\""))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
    };
    Ok(DuplicateCandidate {
        id: row.get("id")?,
        design_id: row.get("design_id")?,
        candidate_design_id: row.get("candidate_design_id")?,
        match_type: json_enum(row.get("match_type")?)?,
        confidence: row.get("confidence")?,
        status: bare_enum(row.get("status")?)?,
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
    use crate::domain::*;
    use chrono::Utc;

    fn sample_design(title: &str) -> Design {
        let now = Utc::now();
        Design {
            id: new_id(),
            canonical_title: title.to_string(),
            canonical_designer: "Unknown".to_string(),
            title_override: None,
            designer_override: None,
            multicolor_status: MulticolorStatus::Unknown,
            multicolor_source: MulticolorSource::Heuristic,
            status: DesignStatus::Downloaded,
            primary_file_type: None,
            total_size: 0,
            metadata_authority: MetadataAuthority::Caption,
            import_source_id: None,
            family_id: None,
            variant_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn merge_absorbs_files_and_tombstones_loser() {
        let store = CatalogStore::open_in_memory().unwrap();
        let survivor = sample_design("Dragon");
        let loser = sample_design("Dragon (dup)");
        store.insert_design(&survivor).unwrap();
        store.insert_design(&loser).unwrap();

        let file = DesignFile {
            id: new_id(),
            design_id: loser.id.clone(),
            relative_path: "model.stl".to_string(),
            filename: "model.stl".to_string(),
            extension: Some("stl".to_string()),
            size: 1024,
            sha256: Some("abc".to_string()),
            file_kind: FileKind::Model,
            model_kind: Some(ModelKind::Stl),
            is_from_archive: false,
            parent_archive_id: None,
            is_primary: true,
        };
        store.insert_design_file(&file).unwrap();

        let candidate_id = store
            .insert_duplicate_candidate(&survivor.id, &loser.id, MatchType::Hash)
            .unwrap();

        store.merge_designs(&survivor.id, &loser.id).unwrap();

        assert_eq!(store.list_design_files(&survivor.id).unwrap().len(), 1);
        assert_eq!(store.get_design(&loser.id).unwrap().unwrap().status, DesignStatus::Deleted);

        let conn = store.lock();
        let status: String = conn
            .query_row(
                "SELECT status FROM duplicate_candidates WHERE id = ?1",
                rusqlite::params![candidate_id],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(status, "MERGED");
    }
}
