//! `DOWNLOAD_IMPORT_RECORD` and `AI_ANALYZE_DESIGN` handlers (spec.md §3/§4.5).
//!
//! An `ImportRecord` tracks one `(folder, source_path)` pair discovered by
//! a local-folder or direct-upload import source, independently of the
//! design it may eventually produce (unique by source path, so a re-scan
//! never double-queues). This handler resolves the record's already-linked
//! design and moves its staged bytes, mirroring `download::run` without
//! going through a `Channel`/`Adapter` pair, since import sources aren't
//! channels.

use tracing::info;

use printarr_core::domain::{DesignStatus, ImportRecordStatus, Job};
use printarr_core::error::{PrintarrError, Result};

use super::{HandlerResult, JobContext};

/// `find_import_record` is keyed by `(folder_id, source_path)`, the same
/// pair `ImportRecord` rows are unique on, so the job payload carries both
/// rather than a bare record id.
#[derive(serde::Deserialize)]
struct DownloadImportRecordPayload {
    folder_id: String,
    source_path: String,
}

pub async fn run_download_import_record(ctx: &JobContext, job: &Job) -> HandlerResult {
    let payload: DownloadImportRecordPayload = job
        .payload_json
        .as_deref()
        .ok_or_else(|| PrintarrError::Validation { field: "payload_json".into(), message: "import record job missing payload".into() })
        .and_then(|raw| serde_json::from_str(raw).map_err(|e| PrintarrError::Validation { field: "payload_json".into(), message: e.to_string() }))?;

    let record = ctx
        .store
        .find_import_record(&payload.folder_id, &payload.source_path)?
        .ok_or_else(|| PrintarrError::NotFound { resource: "import_record".into(), id: format!("{}/{}", payload.folder_id, payload.source_path) })?;

    let design_id = record
        .design_id
        .as_ref()
        .ok_or_else(|| PrintarrError::Conflict { message: format!("import record {} has no linked design yet", record.id) })?;

    let staging_dir = ctx.config.paths.staging_dir(design_id);
    tokio::fs::create_dir_all(&staging_dir)
        .await
        .map_err(|e| PrintarrError::Io { message: "creating staging directory".into(), path: staging_dir.clone(), source: e })?;

    let source_path = std::path::Path::new(&record.source_path);
    let metadata = tokio::fs::metadata(source_path)
        .await
        .map_err(|e| PrintarrError::Io { message: "reading import record source".into(), path: source_path.to_path_buf(), source: e })?;

    if metadata.is_dir() {
        copy_tree(source_path, &staging_dir).await?;
    } else if let Some(filename) = source_path.file_name() {
        tokio::fs::copy(source_path, staging_dir.join(filename))
            .await
            .map_err(|e| PrintarrError::Io { message: "copying import record source".into(), path: source_path.to_path_buf(), source: e })?;
    }

    ctx.store.update_design_status(design_id, DesignStatus::Downloaded)?;
    ctx.store.update_import_record_status(&record.id, ImportRecordStatus::Imported, Some(design_id), None)?;

    info!(record_id = %record.id, design_id, "import record downloaded");
    Ok(Some(serde_json::json!({ "design_id": design_id })))
}

async fn copy_tree(src: &std::path::Path, dst: &std::path::Path) -> Result<()> {
    let mut stack = vec![(src.to_path_buf(), dst.to_path_buf())];
    while let Some((from, to)) = stack.pop() {
        tokio::fs::create_dir_all(&to)
            .await
            .map_err(|e| PrintarrError::Io { message: "creating staged directory".into(), path: to.clone(), source: e })?;
        let mut entries = tokio::fs::read_dir(&from)
            .await
            .map_err(|e| PrintarrError::Io { message: "reading import source directory".into(), path: from.clone(), source: e })?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PrintarrError::Io { message: "reading directory entry".into(), path: from.clone(), source: e })?
        {
            let entry_path = entry.path();
            let dst_path = to.join(entry.file_name());
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                stack.push((entry_path, dst_path));
            } else {
                tokio::fs::copy(&entry_path, &dst_path)
                    .await
                    .map_err(|e| PrintarrError::Io { message: "copying import source file".into(), path: entry_path, source: e })?;
            }
        }
    }
    Ok(())
}

pub async fn run_ai_analyze_design(ctx: &JobContext, job: &Job) -> HandlerResult {
    let design_id = job
        .design_id
        .as_ref()
        .ok_or_else(|| PrintarrError::Validation { field: "design_id".into(), message: "AI analyze job missing design_id".into() })?;

    let ai_configured = ctx.settings.get("ai_configured")?.as_bool().unwrap_or(false);
    if !ai_configured {
        return Err(PrintarrError::Permanent { message: "no AI backend configured".into() });
    }

    // No AI-tagging backend is grounded anywhere in the rest of this
    // codebase; the hook is wired so an operator can point it at one, but
    // there is nothing to call yet.
    info!(design_id, "AI analysis requested but no tagging backend is wired up");
    Ok(Some(serde_json::json!({ "tags_applied": 0 })))
}
