//! Direct upload staging (spec.md §4.3, §6): multipart file intake, a
//! pending-upload listing, removal before processing, and the explicit
//! `process` trigger that drains staged files through the Ingest Service.

use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use printarr_core::domain::new_id;
use printarr_core::error::PrintarrError;
use printarr_pipeline::adapters::direct_upload::StagedUpload;

use crate::error::{ApiError, ApiResult};
use crate::server::SharedState;

pub async fn stage_batch(State(state): State<SharedState>, mut multipart: Multipart) -> ApiResult<Json<Vec<String>>> {
    let mut staged_ids = Vec::new();
    let staging_root = state.config.paths.data_path.join("direct-uploads");
    tokio::fs::create_dir_all(&staging_root)
        .await
        .map_err(|e| ApiError(PrintarrError::Io { message: "creating upload staging dir".into(), path: staging_root.clone(), source: e }))?;

    while let Some(mut field) = multipart.next_field().await.map_err(|e| {
        ApiError(PrintarrError::Validation { field: "multipart".to_string(), message: e.to_string() })
    })? {
        let upload_id = new_id();
        let filename = field.file_name().unwrap_or("upload.bin").to_string();
        let title_hint = field.name().map(|n| n.to_string());
        let dest_dir = staging_root.join(&upload_id);
        tokio::fs::create_dir_all(&dest_dir)
            .await
            .map_err(|e| ApiError(PrintarrError::Io { message: "creating upload dir".into(), path: dest_dir.clone(), source: e }))?;
        let dest_path = dest_dir.join(&filename);

        let mut file = tokio::fs::File::create(&dest_path)
            .await
            .map_err(|e| ApiError(PrintarrError::Io { message: "creating staged file".into(), path: dest_path.clone(), source: e }))?;
        let mut size: i64 = 0;
        while let Some(chunk) = field.chunk().await.map_err(|e| {
            ApiError(PrintarrError::Validation { field: "multipart".to_string(), message: e.to_string() })
        })? {
            size += chunk.len() as i64;
            file.write_all(&chunk)
                .await
                .map_err(|e| ApiError(PrintarrError::Io { message: "writing staged file".into(), path: dest_path.clone(), source: e }))?;
        }

        state
            .direct_upload
            .stage(StagedUpload { upload_id: upload_id.clone(), title_hint, staged_path: dest_path, filename, size })
            .await;
        staged_ids.push(upload_id);
    }

    Ok(Json(staged_ids))
}

#[derive(Serialize)]
pub struct PendingUpload {
    pub upload_id: String,
    pub title_hint: Option<String>,
    pub filename: String,
    pub size: i64,
}

pub async fn pending(State(state): State<SharedState>) -> Json<Vec<PendingUpload>> {
    let staged = state.direct_upload.pending().await;
    Json(
        staged
            .into_iter()
            .map(|u| PendingUpload { upload_id: u.upload_id, title_hint: u.title_hint, filename: u.filename, size: u.size })
            .collect(),
    )
}

pub async fn remove(State(state): State<SharedState>, Path(upload_id): Path<String>) -> ApiResult<()> {
    if state.direct_upload.remove(&upload_id).await {
        Ok(())
    } else {
        Err(ApiError(PrintarrError::NotFound { resource: "upload".to_string(), id: upload_id }))
    }
}

pub async fn process(State(state): State<SharedState>) -> ApiResult<Json<serde_json::Value>> {
    let channel = state
        .store
        .get_channel(&state.upload_channel_id)?
        .ok_or_else(|| ApiError(PrintarrError::NotFound { resource: "channel".to_string(), id: state.upload_channel_id.clone() }))?;

    let scan = state.direct_upload.scan(None).await?;
    let count = scan.items.len();
    let outcomes = state.ingest.ingest_batch(&channel, scan.items).await?;
    let designs_created = outcomes.iter().filter(|o| o.design_id.is_some()).count();

    Ok(Json(serde_json::json!({ "processed": count, "designs_created": designs_created })))
}
