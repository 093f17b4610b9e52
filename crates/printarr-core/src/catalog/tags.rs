//! Tag / DesignTag / FamilyTag CRUD (spec.md §3).

use rusqlite::OptionalExtension;

use crate::domain::*;
use crate::error::{PrintarrError, Result};

use super::store::CatalogStore;

impl CatalogStore {
    /// Tags are lowercase and unique by name; returns the existing row's id
    /// if one already matches.
    pub fn get_or_create_tag(&self, name: &str, category: Option<&str>) -> Result<Id> {
        let lower = name.to_lowercase();
        let conn = self.lock();
        if let Some(id) = conn
            .query_row("SELECT id FROM tags WHERE name = ?1", rusqlite::params![lower], |r| r.get(0))
            .optional()?
        {
            return Ok(id);
        }
        let id = new_id();
        conn.execute(
            "INSERT INTO tags (id, name, category, is_predefined) VALUES (?1, ?2, ?3, 0)",
            rusqlite::params![id, lower, category],
        )?;
        Ok(id)
    }

    /// Idempotent per `(design_id, tag_id)`: the tag source of the first
    /// write wins rather than being silently overwritten by a later one.
    pub fn link_design_tag(&self, design_id: &str, tag_id: &str, source: TagSource) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO design_tags (design_id, tag_id, source) VALUES (?1, ?2, ?3)
             ON CONFLICT(design_id, tag_id) DO NOTHING",
            rusqlite::params![design_id, tag_id, serde_json::to_string(&source)?],
        )?;
        Ok(())
    }

    pub fn list_tags_for_design(&self, design_id: &str) -> Result<Vec<(Tag, TagSource)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT t.id, t.name, t.category, t.is_predefined, dt.source
             FROM design_tags dt JOIN tags t ON t.id = dt.tag_id
             WHERE dt.design_id = ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![design_id], row_to_tag_with_source)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Manual + automatic-caption tags only, used by family tag aggregation
    /// (spec.md §4.8).
    pub fn list_manual_and_caption_tags_for_design(&self, design_id: &str) -> Result<Vec<Tag>> {
        Ok(self
            .list_tags_for_design(design_id)?
            .into_iter()
            .filter(|(_, source)| matches!(source, TagSource::Manual | TagSource::AutomaticCaption | TagSource::User))
            .map(|(tag, _)| tag)
            .collect())
    }

    pub fn reassign_design_tags(&self, loser_id: &str, survivor_id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO design_tags (design_id, tag_id, source)
             SELECT ?1, tag_id, source FROM design_tags WHERE design_id = ?2",
            rusqlite::params![survivor_id, loser_id],
        )?;
        conn.execute("DELETE FROM design_tags WHERE design_id = ?1", rusqlite::params![loser_id])?;
        Ok(())
    }

    pub fn link_family_tag(&self, family_id: &str, tag_id: &str, source: TagSource) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO family_tags (family_id, tag_id, source) VALUES (?1, ?2, ?3)
             ON CONFLICT(family_id, tag_id) DO NOTHING",
            rusqlite::params![family_id, tag_id, serde_json::to_string(&source)?],
        )?;
        Ok(())
    }

    /// Removes every family-tag row whose source is `AI`, used before
    /// re-synthesising AI tags at family scope (spec.md §4.8).
    pub fn clear_family_ai_tags(&self, family_id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM family_tags WHERE family_id = ?1 AND source = ?2",
            rusqlite::params![family_id, serde_json::to_string(&TagSource::Ai)?],
        )?;
        Ok(())
    }

    pub fn list_tags_for_family(&self, family_id: &str) -> Result<Vec<(Tag, TagSource)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT t.id, t.name, t.category, t.is_predefined, ft.source
             FROM family_tags ft JOIN tags t ON t.id = ft.tag_id
             WHERE ft.family_id = ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![family_id], row_to_tag_with_source)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_all_tags(&self) -> Result<Vec<Tag>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT id, name, category, is_predefined FROM tags ORDER BY name ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(Tag {
                id: row.get(0)?,
                name: row.get(1)?,
                category: row.get(2)?,
                is_predefined: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>().map_err(PrintarrError::from)?)
    }
}

fn row_to_tag_with_source(row: &rusqlite::Row) -> rusqlite::Result<(Tag, TagSource)> {
    let source_raw: String = row.get(4)?;
    let source = serde_json::from_str(&source_raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e)))?;
    Ok((
        Tag {
            id: row.get(0)?,
            name: row.get(1)?,
            category: row.get(2)?,
            is_predefined: row.get(3)?,
        },
        source,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_tag_is_idempotent_and_lowercases() {
        let store = CatalogStore::open_in_memory().unwrap();
        let a = store.get_or_create_tag("Fantasy", None).unwrap();
        let b = store.get_or_create_tag("fantasy", None).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.list_all_tags().unwrap().len(), 1);
    }

    #[test]
    fn design_tag_link_first_source_wins() {
        let store = CatalogStore::open_in_memory().unwrap();
        let tag_id = store.get_or_create_tag("fantasy", None).unwrap();
        let design_id = new_id();
        store.link_design_tag(&design_id, &tag_id, TagSource::AutomaticCaption).unwrap();
        store.link_design_tag(&design_id, &tag_id, TagSource::User).unwrap();
        let tags = store.list_tags_for_design(&design_id).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].1, TagSource::AutomaticCaption);
    }
}
