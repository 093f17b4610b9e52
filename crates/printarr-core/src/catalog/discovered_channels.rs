//! Discovered-channel staging (SPEC_FULL.md §2): a thin read/write path
//! feeding channel-adapter bootstrap. An adapter's scan reports channels
//! it can see but that have no `Channel` row yet; this table lets a
//! future onboarding step list them without inventing a new workflow.

use crate::domain::DiscoveredChannel;
use crate::error::Result;

use super::store::CatalogStore;

impl CatalogStore {
    /// Idempotent per `upstream_id`: a repeated sighting just leaves the
    /// earliest `discovered_at` in place.
    pub fn upsert_discovered_channel(&self, channel: &DiscoveredChannel) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO discovered_channels (id, upstream_id, title, member_count, discovered_at)
             VALUES (?1,?2,?3,?4,?5)
             ON CONFLICT(upstream_id) DO UPDATE SET title = excluded.title, member_count = excluded.member_count",
            rusqlite::params![
                channel.id,
                channel.upstream_id,
                channel.title,
                channel.member_count,
                channel.discovered_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn list_discovered_channels(&self) -> Result<Vec<DiscoveredChannel>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM discovered_channels ORDER BY discovered_at DESC")?;
        let rows = stmt.query_map([], row_to_discovered_channel)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn delete_discovered_channel(&self, id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM discovered_channels WHERE id = ?1", rusqlite::params![id])?;
        Ok(())
    }
}

fn row_to_discovered_channel(row: &rusqlite::Row) -> rusqlite::Result<DiscoveredChannel> {
    Ok(DiscoveredChannel {
        id: row.get("id")?,
        upstream_id: row.get("upstream_id")?,
        title: row.get("title")?,
        member_count: row.get("member_count")?,
        discovered_at: {
            let raw: String = row.get("discovered_at")?;
            chrono::DateTime::parse_from_rfc3339(&raw)
                .map(|t| t.with_timezone(&chrono::Utc))
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::new_id;
    use chrono::Utc;

    #[test]
    fn upsert_is_idempotent_per_upstream_id() {
        let store = CatalogStore::open_in_memory().unwrap();
        let channel = DiscoveredChannel {
            id: new_id(),
            upstream_id: "chan-1".to_string(),
            title: "Random Prints".to_string(),
            member_count: Some(42),
            discovered_at: Utc::now(),
        };
        store.upsert_discovered_channel(&channel).unwrap();
        store.upsert_discovered_channel(&channel).unwrap();
        assert_eq!(store.list_discovered_channels().unwrap().len(), 1);
    }
}
