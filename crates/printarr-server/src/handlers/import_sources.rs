//! Import source CRUD and the local-folder sync trigger (spec.md §4.4).
//!
//! A folder import source has no adapter entry in the startup-built
//! adapter map (that map is keyed by `Channel`, and only real upstream
//! channels go through it). Instead each import source gets its own
//! virtual `Channel` (`upstream_id: None`, `import_source_id: Some(..)`)
//! created lazily here, and `sync` builds a `LocalFolderAdapter` on
//! demand per folder rather than going through `JobContext::adapters`.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use printarr_core::catalog::{CatalogStore, EnqueueOptions};
use printarr_core::domain::{
    new_id, BackfillMode, Channel, DownloadMode, Id, ImportRecord, ImportRecordStatus, ImportSource,
    ImportSourceFolder, JobKind,
};
use printarr_core::error::PrintarrError;
use printarr_core::import_profile::ImportProfile;
use printarr_pipeline::adapters::LocalFolderAdapter;

use crate::error::{ApiError, ApiResult};
use crate::server::SharedState;

pub async fn list(State(state): State<SharedState>) -> ApiResult<Json<Vec<ImportSource>>> {
    Ok(Json(state.store.list_import_sources()?))
}

#[derive(Debug, Deserialize)]
pub struct FolderRequest {
    pub path: String,
    pub profile_id: Option<String>,
    pub designer_override: Option<String>,
    #[serde(default)]
    pub tag_defaults: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateImportSourceRequest {
    pub name: String,
    pub profile_id: Option<String>,
    pub designer_default: Option<String>,
    #[serde(default)]
    pub folders: Vec<FolderRequest>,
}

#[derive(serde::Serialize)]
pub struct ImportSourceWithFolders {
    #[serde(flatten)]
    pub source: ImportSource,
    pub folders: Vec<ImportSourceFolder>,
}

pub async fn create(
    State(state): State<SharedState>,
    Json(req): Json<CreateImportSourceRequest>,
) -> ApiResult<Json<ImportSourceWithFolders>> {
    let now = chrono::Utc::now();
    let source = ImportSource {
        id: new_id(),
        name: req.name,
        profile_id: req.profile_id,
        designer_default: req.designer_default,
        created_at: now,
    };
    state.store.insert_import_source(&source)?;

    let mut folders = Vec::with_capacity(req.folders.len());
    for f in req.folders {
        let folder = ImportSourceFolder {
            id: new_id(),
            import_source_id: source.id.clone(),
            path: f.path,
            profile_id: f.profile_id,
            designer_override: f.designer_override,
            tag_defaults: f.tag_defaults,
        };
        state.store.insert_import_source_folder(&folder)?;
        folders.push(folder);
    }

    ensure_import_source_channel(&state.store, &source)?;
    Ok(Json(ImportSourceWithFolders { source, folders }))
}

fn ensure_import_source_channel(store: &CatalogStore, source: &ImportSource) -> ApiResult<Channel> {
    for channel in store.list_channels()? {
        if channel.import_source_id.as_deref() == Some(source.id.as_str()) {
            return Ok(channel);
        }
    }
    let now = chrono::Utc::now();
    let channel = Channel {
        id: new_id(),
        upstream_id: None,
        title: source.name.clone(),
        enabled: true,
        backfill_mode: BackfillMode::AllHistory,
        backfill_value: None,
        download_mode: DownloadMode::DownloadAll,
        download_mode_enabled_at: Some(now),
        sync_cursor: None,
        import_source_id: Some(source.id.clone()),
        created_at: now,
        updated_at: now,
    };
    store.upsert_channel(&channel)?;
    Ok(channel)
}

fn resolve_profile(store: &CatalogStore, folder_profile_id: &Option<String>, source_profile_id: &Option<String>) -> ApiResult<ImportProfile> {
    let profile_id = folder_profile_id.as_ref().or(source_profile_id.as_ref());
    match profile_id {
        Some(id) => fetch_profile(store, id),
        None => Ok(ImportProfile::default_builtin(new_id())),
    }
}

fn fetch_profile(store: &CatalogStore, id: &str) -> ApiResult<ImportProfile> {
    store
        .get_import_profile(id)?
        .ok_or_else(|| ApiError(PrintarrError::NotFound { resource: "import_profile".to_string(), id: id.to_string() }))
}

/// Walks every folder under an import source, ingesting newly-seen
/// design directories and queuing `DOWNLOAD_IMPORT_RECORD` for each.
/// Nothing in the worker pool's successor chain reaches this kind on its
/// own since local-folder items never pass through `DOWNLOAD_DESIGN` —
/// the files are already on disk, they just need placing in the library.
pub async fn sync(State(state): State<SharedState>, Path(id): Path<Id>) -> ApiResult<Json<serde_json::Value>> {
    let source = state
        .store
        .get_import_source(&id)?
        .ok_or_else(|| ApiError(PrintarrError::NotFound { resource: "import_source".to_string(), id: id.clone() }))?;
    let channel = ensure_import_source_channel(&state.store, &source)?;
    let folders = state.store.list_import_source_folders(&source.id)?;

    let mut scanned = 0usize;
    let mut imported = 0usize;

    for folder in folders {
        let profile = resolve_profile(&state.store, &folder.profile_id, &source.profile_id)?;
        let adapter = LocalFolderAdapter::new(std::path::PathBuf::from(&folder.path), profile);
        let result = adapter.scan(None).await?;

        for item in result.items {
            scanned += 1;
            let record = ImportRecord {
                id: new_id(),
                folder_id: folder.id.clone(),
                source_path: item.upstream_id.clone(),
                status: ImportRecordStatus::Pending,
                design_id: None,
                last_error: None,
                created_at: chrono::Utc::now(),
            };
            if !state.store.upsert_import_record(&record)? {
                continue;
            }

            match state.ingest.ingest_item(&channel, &item).await {
                Ok(outcome) => {
                    state.store.update_import_record_status(
                        &record.id,
                        ImportRecordStatus::Imported,
                        outcome.design_id.as_deref(),
                        None,
                    )?;
                    if let Some(design_id) = outcome.design_id {
                        state.store.enqueue(
                            JobKind::DownloadImportRecord,
                            Some(serde_json::json!({ "import_record_id": record.id, "design_id": design_id }).to_string()),
                            EnqueueOptions { design_id: Some(design_id), channel_id: Some(channel.id.clone()), ..Default::default() },
                        )?;
                        imported += 1;
                    }
                }
                Err(err) => {
                    state.store.update_import_record_status(
                        &record.id,
                        ImportRecordStatus::Failed,
                        None,
                        Some(&err.to_string()),
                    )?;
                }
            }
        }
    }

    Ok(Json(serde_json::json!({ "scanned": scanned, "imported": imported })))
}
