//! Job Queue: priority-ordered durable work list with claim, heartbeat,
//! retry scheduling, cancellation and completion semantics (spec.md §4.2).

use chrono::Utc;
use rusqlite::OptionalExtension;

use crate::domain::*;
use crate::error::{PrintarrError, Result};
use crate::retry;

use super::store::CatalogStore;

/// Kinds for which enqueue is idempotent per `(design_id, kind)` — the
/// pipeline-successor kinds named in the Job kinds table (spec.md §4.5).
/// `BACKFILL_CHANNEL`/`SYNC_CHANNEL_LIVE` are channel-scoped, not
/// design-scoped, and are excluded from this rule.
fn is_pipeline_successor_kind(kind: JobKind) -> bool {
    !matches!(kind, JobKind::BackfillChannel | JobKind::SyncChannelLive)
}

pub struct EnqueueOptions {
    pub priority: i32,
    pub design_id: Option<Id>,
    pub channel_id: Option<Id>,
    pub max_attempts: i32,
    pub display_name: Option<String>,
    pub delay: Option<chrono::Duration>,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            priority: USER_TRIGGERED_PRIORITY,
            design_id: None,
            channel_id: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            display_name: None,
            delay: None,
        }
    }
}

impl CatalogStore {
    /// Enqueue a job. Idempotent per `(design_id, kind)` for pipeline
    /// successor kinds: if a pending (QUEUED or RUNNING) job of that kind
    /// already exists for the design, returns the existing id.
    pub fn enqueue(&self, kind: JobKind, payload_json: Option<String>, options: EnqueueOptions) -> Result<Id> {
        if is_pipeline_successor_kind(kind) {
            if let Some(design_id) = &options.design_id {
                if let Some(existing) = self.find_pending_job_for_design(design_id, kind)? {
                    return Ok(existing);
                }
            }
        }

        let id = new_id();
        let now = Utc::now();
        let next_retry_at = options.delay.map(|d| now + d);
        let conn = self.lock();
        conn.execute(
            "INSERT INTO jobs (id, kind, status, priority, design_id, channel_id, payload_json,
                progress_current, progress_total, attempts, max_attempts, next_retry_at, display_name, created_at)
             VALUES (?1, ?2, 'QUEUED', ?3, ?4, ?5, ?6, NULL, NULL, 0, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                id,
                serde_json::to_string(&kind)?,
                options.priority,
                options.design_id,
                options.channel_id,
                payload_json,
                options.max_attempts,
                next_retry_at.map(|t| t.to_rfc3339()),
                options.display_name,
                now.to_rfc3339(),
            ],
        )?;
        Ok(id)
    }

    fn find_pending_job_for_design(&self, design_id: &str, kind: JobKind) -> Result<Option<Id>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id FROM jobs WHERE design_id = ?1 AND kind = ?2 AND status IN ('QUEUED', 'RUNNING')
             ORDER BY created_at ASC LIMIT 1",
            rusqlite::params![design_id, serde_json::to_string(&kind)?],
            |r| r.get(0),
        )
        .optional()
        .map_err(PrintarrError::from)
    }

    /// Atomically claims the single highest-priority eligible job whose
    /// kind is in `kinds`. Implements JQ-1 (exactly-once claim) via a
    /// single UPDATE...RETURNING under rusqlite's implicit transaction,
    /// so concurrent claimers serialize on SQLite's writer lock rather
    /// than racing a read-then-write.
    pub fn claim(&self, kinds: &[JobKind], _worker_id: &str) -> Result<Option<Job>> {
        let kind_json: Vec<String> = kinds
            .iter()
            .map(|k| serde_json::to_string(k))
            .collect::<std::result::Result<_, _>>()?;
        let placeholders: Vec<String> = (1..=kind_json.len()).map(|i| format!("?{i}")).collect();
        let now = Utc::now().to_rfc3339();
        let now_param_index = kind_json.len() + 1;

        let conn = self.lock();
        let select_sql = format!(
            "SELECT id FROM jobs
             WHERE status = 'QUEUED' AND kind IN ({})
               AND (next_retry_at IS NULL OR next_retry_at <= ?{now_param_index})
             ORDER BY priority DESC, created_at ASC LIMIT 1",
            placeholders.join(", ")
        );
        let mut params: Vec<&dyn rusqlite::ToSql> = kind_json.iter().map(|k| k as &dyn rusqlite::ToSql).collect();
        params.push(&now);

        let job_id: Option<String> = conn
            .query_row(&select_sql, params.as_slice(), |r| r.get(0))
            .optional()?;

        let Some(job_id) = job_id else {
            return Ok(None);
        };

        let updated = conn.execute(
            "UPDATE jobs SET status = 'RUNNING', started_at = ?1, attempts = attempts + 1
             WHERE id = ?2 AND status = 'QUEUED'",
            rusqlite::params![now, job_id],
        )?;
        if updated == 0 {
            // Lost the race to another claimer between SELECT and UPDATE.
            return Ok(None);
        }

        let job = Self::row_to_job(&conn, &job_id)?;
        Ok(Some(job))
    }

    fn row_to_job(conn: &rusqlite::Connection, id: &str) -> Result<Job> {
        conn.query_row("SELECT * FROM jobs WHERE id = ?1", rusqlite::params![id], row_to_job)
            .map_err(PrintarrError::from)
    }

    pub fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let conn = self.lock();
        conn.query_row("SELECT * FROM jobs WHERE id = ?1", rusqlite::params![id], row_to_job)
            .optional()
            .map_err(PrintarrError::from)
    }

    pub fn heartbeat(&self, job_id: &str) -> Result<bool> {
        let job = self.get_job(job_id)?.ok_or_else(|| PrintarrError::NotFound {
            resource: "job".to_string(),
            id: job_id.to_string(),
        })?;
        Ok(job.status != JobStatus::Canceled)
    }

    pub fn update_progress(&self, job_id: &str, current: i64, total: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE jobs SET progress_current = ?1, progress_total = ?2 WHERE id = ?3",
            rusqlite::params![current, total, job_id],
        )?;
        Ok(())
    }

    /// No-ops (rather than erroring) if the job already left `RUNNING` — a
    /// job canceled while its handler was mid-flight must not be silently
    /// flipped back to `SUCCESS` once the handler finally returns.
    pub fn complete(&self, job_id: &str, result_json: Option<String>) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE jobs SET status = 'SUCCESS', result_json = ?1, finished_at = ?2 WHERE id = ?3 AND status = 'RUNNING'",
            rusqlite::params![result_json, Utc::now().to_rfc3339(), job_id],
        )?;
        Ok(())
    }

    /// JQ-2: a job reaching terminal `FAILED` has either exhausted
    /// `max_attempts` or hit a permanent-keyword error. Delegates the
    /// decision to the Retry Service. Like `complete`, no-ops if the job
    /// already left `RUNNING` (e.g. it was canceled mid-flight).
    pub fn fail(&self, job_id: &str, error: &str) -> Result<()> {
        let job = self.get_job(job_id)?.ok_or_else(|| PrintarrError::NotFound {
            resource: "job".to_string(),
            id: job_id.to_string(),
        })?;

        let decision = retry::decide_retry(job.attempts, job.max_attempts, Some(error), Utc::now());
        let conn = self.lock();
        if decision.should_retry {
            conn.execute(
                "UPDATE jobs SET status = 'QUEUED', next_retry_at = ?1, started_at = NULL,
                    finished_at = NULL, last_error = ?2 WHERE id = ?3 AND status = 'RUNNING'",
                rusqlite::params![decision.next_retry_at.map(|t| t.to_rfc3339()), error, job_id],
            )?;
        } else {
            conn.execute(
                "UPDATE jobs SET status = 'FAILED', last_error = ?1, finished_at = ?2 WHERE id = ?3 AND status = 'RUNNING'",
                rusqlite::params![error, Utc::now().to_rfc3339(), job_id],
            )?;
        }
        Ok(())
    }

    pub fn cancel(&self, job_id: &str) -> Result<()> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE jobs SET status = 'CANCELED', finished_at = ?1 WHERE id = ?2 AND status IN ('QUEUED', 'RUNNING')",
            rusqlite::params![Utc::now().to_rfc3339(), job_id],
        )?;
        if updated == 0 {
            return Err(PrintarrError::Conflict {
                message: format!("job {job_id} is not queued or running"),
            });
        }
        Ok(())
    }

    /// Manual retry: only works on FAILED/CANCELED jobs, resets the
    /// attempt count and requeues immediately regardless of prior
    /// classification.
    pub fn manual_retry(&self, job_id: &str) -> Result<()> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE jobs SET status = 'QUEUED', attempts = 0, next_retry_at = NULL,
                started_at = NULL, finished_at = NULL, last_error = NULL
             WHERE id = ?1 AND status IN ('FAILED', 'CANCELED')",
            rusqlite::params![job_id],
        )?;
        if updated == 0 {
            return Err(PrintarrError::JobNotRetryable {
                job_id: job_id.to_string(),
            });
        }
        Ok(())
    }

    /// On startup: any job left `RUNNING` by a worker that is no longer
    /// alive is returned to `QUEUED` with `attempts` unchanged.
    pub fn recover_orphaned_running_jobs(&self) -> Result<i64> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE jobs SET status = 'QUEUED', started_at = NULL WHERE status = 'RUNNING'",
            [],
        )?;
        Ok(updated as i64)
    }

    pub fn retry_stats(&self) -> Result<retry::RetryStats> {
        let conn = self.lock();
        let pending_retry: i64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = 'QUEUED' AND next_retry_at IS NOT NULL",
            [],
            |r| r.get(0),
        )?;
        let total_retried: i64 =
            conn.query_row("SELECT COUNT(*) FROM jobs WHERE attempts > 1", [], |r| r.get(0))?;
        let failed_after_max: i64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = 'FAILED' AND attempts >= max_attempts",
            [],
            |r| r.get(0),
        )?;
        Ok(retry::RetryStats {
            pending_retry,
            total_retried,
            failed_after_max_retries: failed_after_max,
        })
    }

    /// JQ-3: for `(design_id, kind)` in the pipeline set, at most one job
    /// is in {QUEUED, RUNNING} at any instant — a direct consequence of
    /// `enqueue`'s idempotence check; exposed here for tests to assert on.
    pub fn count_pending_jobs_for_design(&self, design_id: &str, kind: JobKind) -> Result<i64> {
        let conn = self.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE design_id = ?1 AND kind = ?2 AND status IN ('QUEUED', 'RUNNING')",
            rusqlite::params![design_id, serde_json::to_string(&kind)?],
            |r| r.get(0),
        )
        .map_err(PrintarrError::from)
    }

    /// The live queue: jobs not yet finished, highest priority first, same
    /// ordering `claim` uses.
    pub fn list_queue(&self, page: &super::store::Page) -> Result<super::store::PagedResult<Job>> {
        let conn = self.lock();
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status IN ('QUEUED', 'RUNNING')",
            [],
            |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(
            "SELECT * FROM jobs WHERE status IN ('QUEUED', 'RUNNING')
             ORDER BY priority DESC, created_at ASC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![page.limit(), page.offset()], row_to_job)?;
        let items = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(paged(items, total, page))
    }

    /// Finished (or canceled) jobs, most recent first, for an activity feed.
    pub fn list_activity(&self, page: &super::store::Page) -> Result<super::store::PagedResult<Job>> {
        let conn = self.lock();
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status IN ('SUCCESS', 'FAILED', 'CANCELED')",
            [],
            |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(
            "SELECT * FROM jobs WHERE status IN ('SUCCESS', 'FAILED', 'CANCELED')
             ORDER BY finished_at DESC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![page.limit(), page.offset()], row_to_job)?;
        let items = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(paged(items, total, page))
    }

    /// Reprioritizes a job still waiting to run; no-op semantics once a
    /// job has started would be surprising, so only `QUEUED` is allowed.
    pub fn update_job_priority(&self, job_id: &str, priority: i32) -> Result<()> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE jobs SET priority = ?1 WHERE id = ?2 AND status = 'QUEUED'",
            rusqlite::params![priority, job_id],
        )?;
        if updated == 0 {
            return Err(PrintarrError::Conflict {
                message: format!("job {job_id} is not queued"),
            });
        }
        Ok(())
    }
}

fn paged<T>(items: Vec<T>, total: i64, page: &super::store::Page) -> super::store::PagedResult<T> {
    let pages = if page.page_size == 0 {
        0
    } else {
        ((total as f64) / (page.page_size as f64)).ceil() as u32
    };
    super::store::PagedResult {
        items,
        total,
        page: page.page,
        page_size: page.page_size,
        pages,
    }
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
    let parse_time = |s: String| {
        chrono::DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
    };
    let from_json = |raw: String| {
        serde_json::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
    };

    Ok(Job {
        id: row.get("id")?,
        kind: from_json(row.get("kind")?)?,
        status: from_json(row.get("status")?)?,
        priority: row.get("priority")?,
        design_id: row.get("design_id")?,
        channel_id: row.get("channel_id")?,
        payload_json: row.get("payload_json")?,
        result_json: row.get("result_json")?,
        progress_current: row.get("progress_current")?,
        progress_total: row.get("progress_total")?,
        attempts: row.get("attempts")?,
        max_attempts: row.get("max_attempts")?,
        next_retry_at: row.get::<_, Option<String>>("next_retry_at")?.map(parse_time).transpose()?,
        last_error: row.get("last_error")?,
        display_name: row.get("display_name")?,
        created_at: parse_time(row.get("created_at")?)?,
        started_at: row.get::<_, Option<String>>("started_at")?.map(parse_time).transpose()?,
        finished_at: row.get::<_, Option<String>>("finished_at")?.map(parse_time).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jq1_claim_transitions_to_running_and_is_not_claimed_twice() {
        let store = CatalogStore::open_in_memory().unwrap();
        let id = store
            .enqueue(JobKind::DownloadDesign, None, EnqueueOptions::default())
            .unwrap();

        let claimed = store.claim(&[JobKind::DownloadDesign], "w1").unwrap().unwrap();
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(claimed.attempts, 1);

        let second = store.claim(&[JobKind::DownloadDesign], "w2").unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn claim_respects_priority_order() {
        let store = CatalogStore::open_in_memory().unwrap();
        let low = store
            .enqueue(
                JobKind::DownloadDesign,
                None,
                EnqueueOptions { priority: 0, ..Default::default() },
            )
            .unwrap();
        let high = store
            .enqueue(
                JobKind::DownloadDesign,
                None,
                EnqueueOptions { priority: 5, ..Default::default() },
            )
            .unwrap();
        let _ = low;

        let claimed = store.claim(&[JobKind::DownloadDesign], "w1").unwrap().unwrap();
        assert_eq!(claimed.id, high);
    }

    #[test]
    fn enqueue_is_idempotent_per_design_and_kind() {
        let store = CatalogStore::open_in_memory().unwrap();
        let design_id = new_id();
        let first = store
            .enqueue(
                JobKind::ImportToLibrary,
                None,
                EnqueueOptions { design_id: Some(design_id.clone()), ..Default::default() },
            )
            .unwrap();
        let second = store
            .enqueue(
                JobKind::ImportToLibrary,
                None,
                EnqueueOptions { design_id: Some(design_id.clone()), ..Default::default() },
            )
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(
            store.count_pending_jobs_for_design(&design_id, JobKind::ImportToLibrary).unwrap(),
            1
        );
    }

    #[test]
    fn jq2_failed_job_reflects_max_attempts_or_permanent_error() {
        let store = CatalogStore::open_in_memory().unwrap();
        let id = store
            .enqueue(
                JobKind::DownloadDesign,
                None,
                EnqueueOptions { max_attempts: 1, ..Default::default() },
            )
            .unwrap();
        store.claim(&[JobKind::DownloadDesign], "w1").unwrap();
        store.fail(&id, "permission denied").unwrap();

        let job = store.get_job(&id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.attempts >= job.max_attempts || job.last_error.as_deref() == Some("permission denied"));
    }

    #[test]
    fn transient_failure_reschedules_as_queued() {
        let store = CatalogStore::open_in_memory().unwrap();
        let id = store
            .enqueue(JobKind::DownloadDesign, None, EnqueueOptions::default())
            .unwrap();
        store.claim(&[JobKind::DownloadDesign], "w1").unwrap();
        store.fail(&id, "upstream 503").unwrap();

        let job = store.get_job(&id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.next_retry_at.is_some());
    }

    #[test]
    fn cancel_only_applies_to_queued_or_running() {
        let store = CatalogStore::open_in_memory().unwrap();
        let id = store
            .enqueue(JobKind::DownloadDesign, None, EnqueueOptions::default())
            .unwrap();
        store.cancel(&id).unwrap();
        let job = store.get_job(&id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Canceled);
        assert!(store.cancel(&id).is_err());
    }

    #[test]
    fn manual_retry_resets_attempts_and_requeues_immediately() {
        let store = CatalogStore::open_in_memory().unwrap();
        let id = store
            .enqueue(
                JobKind::DownloadDesign,
                None,
                EnqueueOptions { max_attempts: 1, ..Default::default() },
            )
            .unwrap();
        store.claim(&[JobKind::DownloadDesign], "w1").unwrap();
        store.fail(&id, "permission denied").unwrap();
        store.manual_retry(&id).unwrap();

        let job = store.get_job(&id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempts, 0);
        assert!(job.next_retry_at.is_none());
    }

    #[test]
    fn recovers_orphaned_running_jobs_to_queued() {
        let store = CatalogStore::open_in_memory().unwrap();
        let id = store
            .enqueue(JobKind::DownloadDesign, None, EnqueueOptions::default())
            .unwrap();
        store.claim(&[JobKind::DownloadDesign], "w1").unwrap();

        let recovered = store.recover_orphaned_running_jobs().unwrap();
        assert_eq!(recovered, 1);
        let job = store.get_job(&id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
    }
}
