//! `BACKFILL_CHANNEL` / `SYNC_CHANNEL_LIVE` handlers (spec.md §4.5): scan a
//! channel's adapter for new items and hand them to the Ingest Service.
//! Backfill always scans from the beginning (the adapter itself applies
//! the channel's backfill horizon); live sync resumes from the channel's
//! stored cursor.

use tracing::info;

use printarr_core::domain::Job;
use printarr_core::error::{PrintarrError, Result};

use super::{HandlerResult, JobContext};

async fn run_scan(ctx: &JobContext, job: &Job, from_cursor: Option<&str>) -> HandlerResult {
    let channel_id = job
        .channel_id
        .as_ref()
        .ok_or_else(|| PrintarrError::Validation { field: "channel_id".into(), message: "channel sync job missing channel_id".into() })?;

    let channel = ctx
        .store
        .get_channel(channel_id)?
        .ok_or_else(|| PrintarrError::NotFound { resource: "channel".into(), id: channel_id.clone() })?;

    let adapter = ctx
        .adapter_for_channel(channel_id)
        .ok_or_else(|| PrintarrError::Config { message: format!("no adapter configured for channel {channel_id}") })?;

    let scan_result = adapter.scan(from_cursor).await?;
    let item_count = scan_result.items.len();
    let outcomes = ctx.ingest.ingest_batch(&channel, scan_result.items).await?;

    if let Some(next_cursor) = scan_result.next_cursor {
        let mut updated = channel.clone();
        updated.sync_cursor = Some(next_cursor);
        updated.updated_at = chrono::Utc::now();
        ctx.store.upsert_channel(&updated)?;
    }

    let designs_created = outcomes.iter().filter(|o| o.design_id.is_some()).count();
    info!(channel_id, item_count, designs_created, "channel scan complete");

    Ok(Some(serde_json::json!({
        "items_scanned": item_count,
        "designs_created": designs_created,
    })))
}

pub async fn run_backfill(ctx: &JobContext, job: &Job) -> HandlerResult {
    run_scan(ctx, job, None).await
}

pub async fn run_sync_live(ctx: &JobContext, job: &Job) -> HandlerResult {
    let channel_id = job
        .channel_id
        .as_ref()
        .ok_or_else(|| PrintarrError::Validation { field: "channel_id".into(), message: "channel sync job missing channel_id".into() })?;
    let channel = ctx
        .store
        .get_channel(channel_id)?
        .ok_or_else(|| PrintarrError::NotFound { resource: "channel".into(), id: channel_id.clone() })?;
    run_scan(ctx, job, channel.sync_cursor.as_deref()).await
}
