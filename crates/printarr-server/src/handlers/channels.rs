//! Channel CRUD and backfill trigger (spec.md §6).

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use printarr_core::catalog::EnqueueOptions;
use printarr_core::domain::{new_id, BackfillMode, Channel, DiscoveredChannel, DownloadMode, Id, JobKind};
use printarr_core::error::PrintarrError;

use crate::error::{ApiError, ApiResult};
use crate::server::SharedState;

pub async fn list(State(state): State<SharedState>) -> ApiResult<Json<Vec<Channel>>> {
    Ok(Json(state.store.list_channels()?))
}

/// Channels an adapter has seen but that have no onboarded `Channel` row
/// yet (SPEC_FULL.md §2), so a future onboarding UI has somewhere to read
/// candidates from without a bespoke discovery workflow.
pub async fn discovered(State(state): State<SharedState>) -> ApiResult<Json<Vec<DiscoveredChannel>>> {
    Ok(Json(state.store.list_discovered_channels()?))
}

pub async fn get(State(state): State<SharedState>, Path(id): Path<Id>) -> ApiResult<Json<Channel>> {
    state
        .store
        .get_channel(&id)?
        .map(Json)
        .ok_or_else(|| ApiError(PrintarrError::NotFound { resource: "channel".to_string(), id }))
}

#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    pub upstream_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub backfill_mode: Option<BackfillMode>,
    pub backfill_value: Option<i64>,
    #[serde(default)]
    pub download_mode: Option<DownloadMode>,
}

pub async fn create(State(state): State<SharedState>, Json(req): Json<CreateChannelRequest>) -> ApiResult<Json<Channel>> {
    let now = chrono::Utc::now();
    let download_mode = req.download_mode.unwrap_or(DownloadMode::Manual);
    let channel = Channel {
        id: new_id(),
        upstream_id: req.upstream_id,
        title: req.title,
        enabled: true,
        backfill_mode: req.backfill_mode.unwrap_or(BackfillMode::AllHistory),
        backfill_value: req.backfill_value,
        download_mode,
        download_mode_enabled_at: if download_mode == DownloadMode::Manual { None } else { Some(now) },
        sync_cursor: None,
        import_source_id: None,
        created_at: now,
        updated_at: now,
    };
    state.store.upsert_channel(&channel)?;
    Ok(Json(channel))
}

pub async fn delete_channel(State(state): State<SharedState>, Path(id): Path<Id>) -> ApiResult<()> {
    state.store.delete_channel(&id)?;
    Ok(())
}

/// Queues an initial `BACKFILL_CHANNEL` job. Idempotency for this kind is
/// deliberately not per-design (spec.md §4.2), so repeated triggers each
/// queue a fresh job rather than being absorbed.
pub async fn trigger_backfill(State(state): State<SharedState>, Path(id): Path<Id>) -> ApiResult<Json<serde_json::Value>> {
    let channel = state
        .store
        .get_channel(&id)?
        .ok_or_else(|| ApiError(PrintarrError::NotFound { resource: "channel".to_string(), id: id.clone() }))?;

    let job_id = state.store.enqueue(
        JobKind::BackfillChannel,
        None,
        EnqueueOptions { channel_id: Some(channel.id), ..Default::default() },
    )?;
    Ok(Json(serde_json::json!({ "job_id": job_id })))
}
