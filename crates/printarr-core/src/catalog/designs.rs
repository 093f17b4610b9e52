//! Filtered design listing and aggregate counts for the HTTP API's
//! designs and stats resources (spec.md §5: designs list/detail, dashboard
//! and storage stats). Kept separate from the CRUD in `store.rs` since the
//! query shape here is built up dynamically from an optional filter set.

use rusqlite::ToSql;

use crate::domain::{Design, DesignStatus};
use crate::error::Result;

use super::store::{row_to_design, CatalogStore, Page, PagedResult};

/// Optional narrowing applied to a designs listing. `None` fields are
/// simply left out of the generated `WHERE` clause.
#[derive(Debug, Clone, Default)]
pub struct DesignFilter {
    pub status: Option<DesignStatus>,
    pub channel_id: Option<String>,
    pub family_id: Option<String>,
    /// Matched against canonical/override title and designer via `LIKE`.
    pub search: Option<String>,
}

impl CatalogStore {
    pub fn list_designs(&self, filter: &DesignFilter, page: &Page) -> Result<PagedResult<Design>> {
        let deleted = serde_json::to_string(&DesignStatus::Deleted)?;
        let mut clauses: Vec<String> = vec!["d.status != ?".to_string()];
        let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(deleted)];

        if let Some(status) = filter.status {
            clauses.push("d.status = ?".to_string());
            params.push(Box::new(serde_json::to_string(&status)?));
        }
        if let Some(family_id) = &filter.family_id {
            clauses.push("d.family_id = ?".to_string());
            params.push(Box::new(family_id.clone()));
        }
        if let Some(search) = &filter.search {
            clauses.push(
                "(d.canonical_title LIKE ? OR d.canonical_designer LIKE ?
                  OR d.title_override LIKE ? OR d.designer_override LIKE ?)"
                    .to_string(),
            );
            let pattern = format!("%{search}%");
            for _ in 0..4 {
                params.push(Box::new(pattern.clone()));
            }
        }

        let from_clause = if filter.channel_id.is_some() {
            "FROM designs d JOIN design_sources ds ON ds.design_id = d.id"
        } else {
            "FROM designs d"
        };
        if let Some(channel_id) = &filter.channel_id {
            clauses.push("ds.channel_id = ?".to_string());
            params.push(Box::new(channel_id.clone()));
        }

        let where_clause = clauses.join(" AND ");
        let conn = self.lock();

        let count_sql = format!("SELECT COUNT(DISTINCT d.id) {from_clause} WHERE {where_clause}");
        let count_params: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let total: i64 = conn.query_row(&count_sql, count_params.as_slice(), |r| r.get(0))?;

        let list_sql = format!(
            "SELECT DISTINCT d.* {from_clause} WHERE {where_clause}
             ORDER BY d.updated_at DESC LIMIT ? OFFSET ?"
        );
        let limit = page.limit();
        let offset = page.offset();
        let mut list_params: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        list_params.push(&limit);
        list_params.push(&offset);

        let mut stmt = conn.prepare(&list_sql)?;
        let rows = stmt.query_map(list_params.as_slice(), row_to_design)?;
        let items = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        let pages = if page.page_size == 0 {
            0
        } else {
            ((total as f64) / (page.page_size as f64)).ceil() as u32
        };
        Ok(PagedResult { items, total, page: page.page, page_size: page.page_size, pages })
    }

    /// Per-status counts for the dashboard stats endpoint.
    pub fn count_designs_by_status(&self) -> Result<Vec<(DesignStatus, i64)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM designs GROUP BY status")?;
        let rows = stmt.query_map([], |r| {
            let raw: String = r.get(0)?;
            let count: i64 = r.get(1)?;
            Ok((raw, count))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (raw, count) = row?;
            let status: DesignStatus = serde_json::from_str(&raw)?;
            out.push((status, count));
        }
        Ok(out)
    }

    /// User-supplied title/designer overrides (spec.md §3: a user edit
    /// always wins over whatever `metadata_authority` last set).
    pub fn update_design_overrides(
        &self,
        id: &str,
        title_override: Option<&str>,
        designer_override: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE designs SET title_override = ?1, designer_override = ?2,
                metadata_authority = ?3, updated_at = ?4 WHERE id = ?5",
            rusqlite::params![
                title_override,
                designer_override,
                serde_json::to_string(&crate::domain::MetadataAuthority::User)?,
                chrono::Utc::now().to_rfc3339(),
                id,
            ],
        )?;
        if updated == 0 {
            return Err(crate::error::PrintarrError::NotFound {
                resource: "design".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Total bytes across every non-deleted design, for the storage stats
    /// endpoint.
    pub fn total_library_size(&self) -> Result<i64> {
        let conn = self.lock();
        let deleted = serde_json::to_string(&DesignStatus::Deleted)?;
        conn.query_row(
            "SELECT COALESCE(SUM(total_size), 0) FROM designs WHERE status != ?1",
            rusqlite::params![deleted],
            |r| r.get(0),
        )
        .map_err(crate::error::PrintarrError::from)
    }
}
