//! Preview asset CRUD (spec.md §3: PreviewAsset; §4.6 preview priority).

use rusqlite::OptionalExtension;

use crate::domain::*;
use crate::error::{PrintarrError, Result};

use super::store::CatalogStore;

impl CatalogStore {
    pub fn insert_preview_asset(&self, preview: &PreviewAsset) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO preview_assets (id, design_id, source, file_path, width, height, is_primary, sort_order, ai_selected)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            rusqlite::params![
                preview.id,
                preview.design_id,
                serde_json::to_string(&preview.source)?,
                preview.file_path,
                preview.width,
                preview.height,
                preview.is_primary,
                preview.sort_order,
                preview.ai_selected,
            ],
        )?;
        Ok(())
    }

    pub fn list_previews_for_design(&self, design_id: &str) -> Result<Vec<PreviewAsset>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM preview_assets WHERE design_id = ?1 ORDER BY sort_order ASC")?;
        let rows = stmt.query_map(rusqlite::params![design_id], row_to_preview)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_primary_preview(&self, design_id: &str) -> Result<Option<PreviewAsset>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT * FROM preview_assets WHERE design_id = ?1 AND is_primary = 1",
            rusqlite::params![design_id],
            row_to_preview,
        )
        .optional()
        .map_err(PrintarrError::from)
    }

    /// Enforces "at most one `is_primary = true` per design" by clearing
    /// every other preview first.
    pub fn set_primary_preview(&self, design_id: &str, preview_id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE preview_assets SET is_primary = 0 WHERE design_id = ?1",
            rusqlite::params![design_id],
        )?;
        conn.execute(
            "UPDATE preview_assets SET is_primary = 1 WHERE id = ?1",
            rusqlite::params![preview_id],
        )?;
        Ok(())
    }

    /// Picks the highest-priority preview (lowest `priority_rank`, ties
    /// broken by `sort_order`) and marks it primary, per §4.6.
    pub fn recompute_primary_preview(&self, design_id: &str) -> Result<Option<Id>> {
        let previews = self.list_previews_for_design(design_id)?;
        let winner = previews
            .iter()
            .min_by_key(|p| (p.priority_rank(), p.sort_order))
            .map(|p| p.id.clone());
        if let Some(ref id) = winner {
            self.set_primary_preview(design_id, id)?;
        }
        Ok(winner)
    }
}

fn row_to_preview(row: &rusqlite::Row) -> rusqlite::Result<PreviewAsset> {
    Ok(PreviewAsset {
        id: row.get("id")?,
        design_id: row.get("design_id")?,
        source: {
            let raw: String = row.get("source")?;
            serde_json::from_str(&raw)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?
        },
        file_path: row.get("file_path")?,
        width: row.get("width")?,
        height: row.get("height")?,
        is_primary: row.get("is_primary")?,
        sort_order: row.get("sort_order")?,
        ai_selected: row.get("ai_selected")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(design_id: &str, source: PreviewSource, ai_selected: bool, sort_order: i32) -> PreviewAsset {
        PreviewAsset {
            id: new_id(),
            design_id: design_id.to_string(),
            source,
            file_path: "preview.jpg".to_string(),
            width: Some(800),
            height: Some(600),
            is_primary: false,
            sort_order,
            ai_selected,
        }
    }

    fn sample_design() -> Design {
        let now = Utc::now();
        Design {
            id: new_id(),
            canonical_title: "Dragon".to_string(),
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
            family_id: None,
            variant_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn ai_selected_outranks_every_other_source() {
        let store = CatalogStore::open_in_memory().unwrap();
        let design = sample_design();
        store.insert_design(&design).unwrap();

        let rendered = sample(&design.id, PreviewSource::Rendered, false, 0);
        let ai = sample(&design.id, PreviewSource::UserUploaded, true, 1);
        store.insert_preview_asset(&rendered).unwrap();
        store.insert_preview_asset(&ai).unwrap();

        let winner = store.recompute_primary_preview(&design.id).unwrap().unwrap();
        assert_eq!(winner, ai.id);
        assert_eq!(store.get_primary_preview(&design.id).unwrap().unwrap().id, ai.id);
    }

    #[test]
    fn setting_primary_clears_previous_primary() {
        let store = CatalogStore::open_in_memory().unwrap();
        let design = sample_design();
        store.insert_design(&design).unwrap();

        let a = sample(&design.id, PreviewSource::Rendered, false, 0);
        let b = sample(&design.id, PreviewSource::ExtractedFromArchive, false, 1);
        store.insert_preview_asset(&a).unwrap();
        store.insert_preview_asset(&b).unwrap();

        store.set_primary_preview(&design.id, &a.id).unwrap();
        store.set_primary_preview(&design.id, &b.id).unwrap();

        let primaries: i64 = store
            .list_previews_for_design(&design.id)
            .unwrap()
            .iter()
            .filter(|p| p.is_primary)
            .count() as i64;
        assert_eq!(primaries, 1);
    }
}
