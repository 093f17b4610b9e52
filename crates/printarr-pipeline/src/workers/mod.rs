//! Workers (spec.md §4.5): one cooperative poller per worker slot, each
//! claiming any of the 11 job kinds and dispatching to the handler that
//! knows how to run it. A background heartbeat task keeps the claim alive
//! and races the handler against cancellation observed through it, so a
//! job canceled out from under a handler stops promptly instead of
//! running to completion and silently overwriting the cancellation.

mod channel_sync;
mod dedupe_job;
mod download;
mod extract;
mod import;
mod misc;
mod render;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use printarr_core::catalog::{CatalogStore, SettingsService};
use printarr_core::config::PrintarrConfig;
use printarr_core::domain::{DesignStatus, Id, Job, JobKind};
use printarr_core::error::PrintarrError;
use printarr_core::events::Broadcaster;

use crate::adapters::Adapter;
use crate::ingest::IngestService;

/// How often an idle poller checks the queue again.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// How often the heartbeat task renews a claimed job's lease.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
/// Minimum gap between `update_progress` writes for a single job.
pub const PROGRESS_THROTTLE: Duration = Duration::from_secs(1);

/// Every kind a generic poller is willing to claim, in no particular
/// priority order — `claim` itself orders by job priority and age.
const ALL_KINDS: &[JobKind] = &[
    JobKind::BackfillChannel,
    JobKind::SyncChannelLive,
    JobKind::DownloadDesign,
    JobKind::ExtractArchive,
    JobKind::ImportToLibrary,
    JobKind::Analyze3mf,
    JobKind::GenerateRender,
    JobKind::DedupeReconcile,
    JobKind::DownloadImportRecord,
    JobKind::AiAnalyzeDesign,
    JobKind::DetectFamilyOverlap,
];

/// Shared handles every job handler needs. Cheap to clone: everything
/// inside is itself an `Arc`/connection-pool handle.
#[derive(Clone)]
pub struct JobContext {
    pub store: CatalogStore,
    pub broadcaster: Broadcaster,
    pub settings: SettingsService,
    pub config: Arc<PrintarrConfig>,
    pub adapters: Arc<HashMap<Id, Adapter>>,
    pub ingest: Arc<IngestService>,
}

impl JobContext {
    /// Looks up the adapter backing a channel, if the caller is managing
    /// one (the direct-upload and local-folder adapters usually aren't
    /// associated with a `Channel` row at all, and are resolved by the
    /// caller through other means).
    pub fn adapter_for_channel(&self, channel_id: &str) -> Option<&Adapter> {
        self.adapters.get(channel_id)
    }
}

pub struct WorkerPool {
    ctx: JobContext,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(ctx: JobContext) -> Self {
        Self { ctx, poll_interval: DEFAULT_POLL_INTERVAL }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Spawns `concurrency` independent poller tasks, returning their
    /// join handles so the caller can await a clean shutdown.
    pub fn spawn(self: Arc<Self>, concurrency: usize) -> Vec<tokio::task::JoinHandle<()>> {
        (0..concurrency)
            .map(|i| {
                let pool = self.clone();
                let worker_id = format!("worker-{i}");
                tokio::spawn(async move { pool.run_loop(worker_id).await })
            })
            .collect()
    }

    async fn run_loop(&self, worker_id: String) {
        loop {
            match self.ctx.store.claim(ALL_KINDS, &worker_id) {
                Ok(Some(job)) => self.execute(job, &worker_id).await,
                Ok(None) => tokio::time::sleep(self.poll_interval).await,
                Err(e) => {
                    error!(worker = %worker_id, error = %e, "job claim failed, backing off");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn execute(&self, job: Job, worker_id: &str) {
        let job_id = job.id.clone();
        info!(worker = %worker_id, job_id = %job_id, kind = ?job.kind, "claimed job");
        self.ctx.broadcaster.publish(
            printarr_core::events::EventType::JobStarted,
            serde_json::json!({ "job_id": job_id, "kind": job.kind }),
        );

        // `stop_tx` tells the heartbeat task the handler finished on its
        // own; `cancel_tx` is the reverse signal, raised by the heartbeat
        // task when it observes the job left RUNNING out from under it, so
        // `execute` can abort the in-flight handler rather than await it
        // to completion.
        let (stop_tx, stop_rx) = watch::channel(false);
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let heartbeat_store = self.ctx.store.clone();
        let heartbeat_job_id = job_id.clone();
        let heartbeat_handle = tokio::spawn(async move {
            let mut rx = stop_rx;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                        match heartbeat_store.heartbeat(&heartbeat_job_id) {
                            Ok(true) => {}
                            Ok(false) => {
                                let _ = cancel_tx.send(true);
                                break;
                            }
                            Err(e) => warn!(job_id = %heartbeat_job_id, error = %e, "heartbeat failed"),
                        }
                    }
                    _ = rx.changed() => break,
                }
            }
        });

        let outcome = tokio::select! {
            result = dispatch(&self.ctx, &job) => DispatchOutcome::Finished(result),
            _ = wait_for_cancel(&mut cancel_rx) => DispatchOutcome::Canceled,
        };
        let _ = stop_tx.send(true);
        heartbeat_handle.abort();

        match outcome {
            DispatchOutcome::Canceled => {
                info!(job_id = %job_id, kind = ?job.kind, "job canceled mid-flight, aborting handler");
                cleanup_canceled_job(&self.ctx, &job).await;
                self.ctx.broadcaster.publish(
                    printarr_core::events::EventType::JobCanceled,
                    serde_json::json!({ "job_id": job_id }),
                );
            }
            DispatchOutcome::Finished(Ok(result)) => {
                let result_json = result.map(|v| v.to_string());
                if let Err(e) = self.ctx.store.complete(&job_id, result_json) {
                    error!(job_id = %job_id, error = %e, "failed to mark job complete");
                }
                self.ctx.broadcaster.publish(
                    printarr_core::events::EventType::JobCompleted,
                    serde_json::json!({ "job_id": job_id }),
                );
                enqueue_successor(&self.ctx, &job).await;
            }
            DispatchOutcome::Finished(Err(PrintarrError::Conflict { message })) if message.contains("cannot transition") => {
                debug!(job_id = %job_id, %message, "job no-op, design already past this stage");
                let _ = self.ctx.store.complete(&job_id, None);
            }
            DispatchOutcome::Finished(Err(e)) => {
                warn!(job_id = %job_id, error = %e, "job failed");
                if let Err(store_err) = self.ctx.store.fail(&job_id, &e.to_string()) {
                    error!(job_id = %job_id, error = %store_err, "failed to record job failure");
                }
                self.ctx.broadcaster.publish(
                    printarr_core::events::EventType::JobFailed,
                    serde_json::json!({ "job_id": job_id, "error": e.to_string() }),
                );
            }
        }
    }
}

enum DispatchOutcome {
    Finished(HandlerResult),
    Canceled,
}

/// Resolves once the heartbeat task observes the job left `RUNNING`
/// (canceled). `watch::Receiver::changed` only resolves on change, so a
/// cancellation that happened before this call still fires: the heartbeat
/// task sends `true` exactly once, after which this future returns
/// immediately on every poll (the value it last observed is `true`).
async fn wait_for_cancel(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            // Heartbeat task dropped without ever canceling; never resolve.
            std::future::pending::<()>().await;
        }
    }
}

/// Reverts a canceled job's side effects: the design's status moves back
/// to `WANTED` if the cancel caught it mid-download, and a partially
/// populated staging directory is removed so a retry starts clean.
async fn cleanup_canceled_job(ctx: &JobContext, job: &Job) {
    let Some(design_id) = &job.design_id else { return };

    if job.kind == JobKind::DownloadDesign {
        match ctx.store.get_design(design_id) {
            Ok(Some(design)) if design.status == DesignStatus::Downloading => {
                if let Err(e) = ctx.store.update_design_status(design_id, DesignStatus::Wanted) {
                    error!(design_id, error = %e, "failed to revert design status after cancellation");
                }
            }
            Ok(_) => {}
            Err(e) => error!(design_id, error = %e, "failed to load design after cancellation"),
        }

        let staging_dir = ctx.config.paths.staging_dir(design_id);
        if let Err(e) = tokio::fs::remove_dir_all(&staging_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(design_id, error = %e, "failed to remove staging directory after cancellation");
            }
        }
    }
}

type HandlerResult = printarr_core::error::Result<Option<serde_json::Value>>;

async fn dispatch(ctx: &JobContext, job: &Job) -> HandlerResult {
    match job.kind {
        JobKind::BackfillChannel => channel_sync::run_backfill(ctx, job).await,
        JobKind::SyncChannelLive => channel_sync::run_sync_live(ctx, job).await,
        JobKind::DownloadDesign => download::run(ctx, job).await,
        JobKind::ExtractArchive => extract::run(ctx, job).await,
        JobKind::ImportToLibrary => import::run(ctx, job).await,
        JobKind::Analyze3mf => render::run_analyze(ctx, job).await,
        JobKind::GenerateRender => render::run_render(ctx, job).await,
        JobKind::DedupeReconcile => dedupe_job::run_dedupe_reconcile(ctx, job).await,
        JobKind::DetectFamilyOverlap => dedupe_job::run_detect_family_overlap(ctx, job).await,
        JobKind::DownloadImportRecord => misc::run_download_import_record(ctx, job).await,
        JobKind::AiAnalyzeDesign => misc::run_ai_analyze_design(ctx, job).await,
    }
}

/// Successor kinds a completed job queues for the same design, exactly
/// per the job-kind table (spec.md §4.5). Note that table lists only one
/// declared successor column per kind but several rows enqueue more than
/// one job as a side effect of finishing (e.g. `IMPORT_TO_LIBRARY` queues
/// both `AI_ANALYZE_DESIGN` and `DETECT_FAMILY_OVERLAP`); each enqueue is
/// independently idempotent (§4.2), so calling this after a retraced
/// completion is harmless.
async fn enqueue_successor(ctx: &JobContext, job: &Job) {
    use printarr_core::catalog::EnqueueOptions;
    use printarr_core::domain::{FileKind, AUTO_QUEUE_PRIORITY};

    let Some(design_id) = &job.design_id else { return };

    let enqueue = |kind: JobKind| {
        let design_id = design_id.clone();
        let store = ctx.store.clone();
        async move {
            if let Err(e) = store.enqueue(
                kind,
                None,
                EnqueueOptions { design_id: Some(design_id.clone()), priority: AUTO_QUEUE_PRIORITY, ..Default::default() },
            ) {
                error!(design_id, ?kind, error = %e, "failed to enqueue successor job");
            }
        }
    };

    match job.kind {
        JobKind::DownloadDesign => {
            let has_archive = ctx
                .store
                .list_design_files(design_id)
                .map(|files| files.iter().any(|f| f.file_kind == FileKind::Archive))
                .unwrap_or(false);
            enqueue(if has_archive { JobKind::ExtractArchive } else { JobKind::ImportToLibrary }).await;
            // Post-download dedupe and 3mf analysis happen alongside the
            // main pipeline, not as part of its critical path.
            enqueue(JobKind::DedupeReconcile).await;
            if ctx
                .store
                .list_design_files(design_id)
                .map(|files| files.iter().any(|f| f.model_kind == Some(printarr_core::domain::ModelKind::ThreeMf)))
                .unwrap_or(false)
            {
                enqueue(JobKind::Analyze3mf).await;
            }
        }
        JobKind::ExtractArchive => {
            let files = ctx.store.list_design_files(design_id).unwrap_or_default();
            if files.iter().any(|f| f.is_from_archive) {
                enqueue(JobKind::ImportToLibrary).await;
            }
            if files.iter().any(|f| f.model_kind == Some(printarr_core::domain::ModelKind::ThreeMf)) {
                enqueue(JobKind::Analyze3mf).await;
            }
        }
        JobKind::DownloadImportRecord => {
            enqueue(JobKind::ImportToLibrary).await;
        }
        JobKind::ImportToLibrary => {
            enqueue(JobKind::DetectFamilyOverlap).await;
            let ai_configured = ctx.settings.get("ai_configured").ok().and_then(|v| v.as_bool()).unwrap_or(false);
            let auto_analyze = ctx.settings.get("ai_auto_analyze_on_import").ok().and_then(|v| v.as_bool()).unwrap_or(false);
            if ai_configured && auto_analyze {
                enqueue(JobKind::AiAnalyzeDesign).await;
            }
        }
        _ => {}
    }
}
