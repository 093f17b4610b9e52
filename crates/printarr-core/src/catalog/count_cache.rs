//! Short-TTL in-process count cache for list endpoints (spec.md §4.1,
//! ported from `services/count_cache.py`). SQLite has no equivalent of
//! PostgreSQL's `pg_stat_user_tables`, so the "approximate" tier here is
//! simply the most recently computed exact count served again inside a
//! longer TTL window, rather than a statistics-catalog estimate — still
//! good enough for UI responsiveness since approximate counts are never
//! allowed to gate business logic (spec.md §9).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const APPROXIMATE_TTL: Duration = Duration::from_secs(30);
pub const EXACT_TTL: Duration = Duration::from_secs(5);

/// Row-count threshold above which a list endpoint may serve the
/// longer-lived approximate count instead of paying for a fresh exact one.
pub const EXACT_THRESHOLD: i64 = 10_000;

#[derive(Clone, Copy)]
struct CachedCount {
    count: i64,
    computed_at: Instant,
    is_approximate: bool,
}

/// Keyed by `"{table}:{filter_bag}"`. One instance is shared process-wide
/// via `Arc`, mirroring the teacher's single shared connection pattern.
#[derive(Default)]
pub struct CountCache {
    entries: Mutex<HashMap<String, CachedCount>>,
}

impl CountCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn cache_key(table: &str, filter_bag: &str) -> String {
        format!("{table}:{filter_bag}")
    }

    /// Returns a cached count for `(table, filter_bag)` if one exists and
    /// has not exceeded its TTL (approximate counts live 30s, exact counts
    /// 5s — an unfiltered query may still receive a stale exact count from
    /// a still-fresh previous exact computation; `get` applies whichever
    /// TTL that entry was tagged with).
    pub fn get(&self, table: &str, filter_bag: &str) -> Option<(i64, bool)> {
        let key = Self::cache_key(table, filter_bag);
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.get(&key)?;
        let ttl = if entry.is_approximate { APPROXIMATE_TTL } else { EXACT_TTL };
        if entry.computed_at.elapsed() < ttl {
            Some((entry.count, entry.is_approximate))
        } else {
            entries.remove(&key);
            None
        }
    }

    pub fn set(&self, table: &str, filter_bag: &str, count: i64, is_approximate: bool) {
        let key = Self::cache_key(table, filter_bag);
        self.entries.lock().unwrap().insert(
            key,
            CachedCount { count, computed_at: Instant::now(), is_approximate },
        );
    }

    /// Drops every cached entry for `table`, regardless of filter bag.
    /// Call on any write to the table.
    pub fn invalidate(&self, table: &str) {
        let prefix = format!("{table}:");
        self.entries.lock().unwrap().retain(|key, _| !key.starts_with(&prefix));
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Implements the optimized-count strategy: unfiltered queries above
    /// `EXACT_THRESHOLD` rows get served the cached approximate count
    /// without recomputation; everything else calls `compute_exact` and
    /// caches the result as an exact, short-TTL entry.
    pub fn get_or_compute(
        &self,
        table: &str,
        filter_bag: &str,
        compute_exact: impl FnOnce() -> rusqlite::Result<i64>,
    ) -> rusqlite::Result<(i64, bool)> {
        if filter_bag.is_empty() {
            if let Some((count, true)) = self.get(table, "approx") {
                if count > EXACT_THRESHOLD {
                    return Ok((count, true));
                }
            }
        }

        if let Some(cached) = self.get(table, filter_bag) {
            return Ok(cached);
        }

        let count = compute_exact()?;
        self.set(table, filter_bag, count, false);
        if filter_bag.is_empty() && count > EXACT_THRESHOLD {
            self.set(table, "approx", count, true);
        }
        Ok((count, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_set_then_hit() {
        let cache = CountCache::new();
        assert!(cache.get("designs", "none").is_none());
        cache.set("designs", "none", 42, false);
        assert_eq!(cache.get("designs", "none"), Some((42, false)));
    }

    #[test]
    fn invalidate_clears_every_filter_bag_for_table() {
        let cache = CountCache::new();
        cache.set("designs", "none", 1, false);
        cache.set("designs", "status=WANTED", 2, false);
        cache.set("jobs", "none", 3, false);

        cache.invalidate("designs");

        assert!(cache.get("designs", "none").is_none());
        assert!(cache.get("designs", "status=WANTED").is_none());
        assert_eq!(cache.get("jobs", "none"), Some((3, false)));
    }

    #[test]
    fn get_or_compute_calls_closure_once_then_caches() {
        let cache = CountCache::new();
        let mut calls = 0;
        let (count, approx) = cache
            .get_or_compute("designs", "none", || {
                calls += 1;
                Ok(7)
            })
            .unwrap();
        assert_eq!(count, 7);
        assert!(!approx);
        assert_eq!(calls, 1);

        let (count2, _) = cache.get_or_compute("designs", "none", || Ok(999)).unwrap();
        assert_eq!(count2, 7);
    }

    #[test]
    fn large_unfiltered_count_is_cached_as_approximate() {
        let cache = CountCache::new();
        let (count, approx) = cache.get_or_compute("designs", "", || Ok(20_000)).unwrap();
        assert_eq!(count, 20_000);
        assert!(!approx);

        let (count2, approx2) = cache.get("designs", "approx").unwrap();
        assert_eq!(count2, 20_000);
        assert!(approx2);
    }
}
