//! Full-text search over designs (spec.md §4.1): FTS5 MATCH when the
//! query tokenizes cleanly, falling back to a substring `LIKE` scan for
//! queries FTS5 rejects (bare punctuation, single characters, etc), so a
//! search box never surfaces a syntax error to the end user.

use crate::domain::Design;
use crate::error::{PrintarrError, Result};

use super::store::{row_to_design, CatalogStore};

const DEFAULT_LIMIT: i64 = 50;

impl CatalogStore {
    pub fn search_designs(&self, query: &str, limit: Option<i64>) -> Result<Vec<Design>> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        match self.search_designs_fts(trimmed, limit) {
            Ok(results) => Ok(results),
            // FTS5 query syntax errors surface as SQLite errors, not as a
            // typed rusqlite variant: fall back rather than propagate.
            Err(PrintarrError::Database { .. }) => self.search_designs_substring(trimmed, limit),
            Err(other) => Err(other),
        }
    }

    fn search_designs_fts(&self, query: &str, limit: i64) -> Result<Vec<Design>> {
        let match_expr = to_fts_match_expression(query);
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT d.* FROM designs d
             JOIN designs_fts ON designs_fts.rowid = d.rowid
             WHERE designs_fts MATCH ?1
             ORDER BY bm25(designs_fts) LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![match_expr, limit], row_to_design)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(PrintarrError::from)
    }

    fn search_designs_substring(&self, query: &str, limit: i64) -> Result<Vec<Design>> {
        let pattern = format!("%{}%", escape_like(query));
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM designs
             WHERE canonical_title LIKE ?1 ESCAPE '\\' OR canonical_designer LIKE ?1 ESCAPE '\\'
             ORDER BY canonical_title ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![pattern, limit], row_to_design)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(PrintarrError::from)
    }
}

/// Builds a FTS5 MATCH expression that ANDs together each whitespace
/// token as a prefix match, so a partial last word still matches.
fn to_fts_match_expression(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| format!("\"{}\"*", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Design, DesignStatus, MetadataAuthority, MulticolorSource, MulticolorStatus};
    use chrono::Utc;

    fn sample_design(title: &str, designer: &str) -> Design {
        let now = Utc::now();
        Design {
            id: crate::domain::new_id(),
            canonical_title: title.to_string(),
            canonical_designer: designer.to_string(),
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
    fn finds_design_by_title_token() {
        let store = CatalogStore::open_in_memory().unwrap();
        let design = sample_design("Articulated Dragon", "PrintCraft");
        store.insert_design(&design).unwrap();

        let results = store.search_designs("dragon", None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, design.id);
    }

    #[test]
    fn finds_design_by_designer_prefix() {
        let store = CatalogStore::open_in_memory().unwrap();
        let design = sample_design("Benchy", "PrintCraft Studios");
        store.insert_design(&design).unwrap();

        let results = store.search_designs("printcraft", None).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn empty_query_returns_no_results() {
        let store = CatalogStore::open_in_memory().unwrap();
        let results = store.search_designs("   ", None).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn malformed_fts_query_falls_back_to_substring_match() {
        let store = CatalogStore::open_in_memory().unwrap();
        let design = sample_design("Low-Poly Fox (remix)", "Anon");
        store.insert_design(&design).unwrap();

        // Bare FTS5 operator characters are invalid MATCH syntax on their
        // own; the substring fallback still finds the literal text.
        let results = store.search_designs("(remix)", None).unwrap();
        assert_eq!(results.len(), 1);
    }
}
