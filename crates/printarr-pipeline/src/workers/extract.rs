//! `EXTRACT_ARCHIVE` handler (spec.md §4.5/§4.6): unpacks every one of a
//! design's downloaded archives into its staging directory and records the
//! files each produced. Runs only when `enqueue_successor` found a
//! `FileKind::Archive` file on the design; everything else short-circuits
//! straight past this stage.

use tracing::info;

use printarr_core::domain::*;
use printarr_core::error::{PrintarrError, Result};
use printarr_core::hashing;

use crate::archive;
use crate::preview;

use super::{HandlerResult, JobContext};

const PREVIEW_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif"];

pub async fn run(ctx: &JobContext, job: &Job) -> HandlerResult {
    let design_id = job
        .design_id
        .as_ref()
        .ok_or_else(|| PrintarrError::Validation { field: "design_id".into(), message: "extract job missing design_id".into() })?;

    let files = ctx.store.list_design_files(design_id)?;
    let archive_files: Vec<_> = files.iter().filter(|f| f.file_kind == FileKind::Archive).collect();
    if archive_files.is_empty() {
        return Err(PrintarrError::Conflict { message: format!("design {design_id} has no archive file to extract") });
    }

    let staging_dir = ctx.config.paths.staging_dir(design_id);
    let delete_archive = ctx
        .settings
        .get("delete_archives_after_extraction")?
        .as_bool()
        .unwrap_or(false);

    let mut previews_registered = 0;
    let mut files_registered = 0;

    for archive_file in &archive_files {
        let archive_path = staging_dir.join(&archive_file.relative_path);
        // Each archive gets its own subdirectory so files with the same
        // name in different archives don't collide.
        let extract_dir = staging_dir.join("extracted").join(&archive_file.id);

        let extracted = archive::extract(&archive_path, &extract_dir).await?;
        let hashes = hashing::compute_file_hashes_batch(
            extracted.iter().map(|f| extract_dir.join(&f.relative_path)).collect(),
        )
        .await;
        let hash_by_path: std::collections::HashMap<_, _> = hashes.into_iter().collect();

        for (i, extracted_file) in extracted.iter().enumerate() {
            let abs_path = extract_dir.join(&extracted_file.relative_path);
            let extension = abs_path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase());

            if let Some(ext) = extension.as_deref() {
                if PREVIEW_EXTENSIONS.contains(&ext) {
                    preview::register_extracted_preview(&ctx.store, design_id, &abs_path.to_string_lossy(), None, None, i as i32)?;
                    previews_registered += 1;
                    continue;
                }
            }

            let is_archive = extension.as_deref().is_some_and(|e| matches!(e, "zip" | "rar" | "7z" | "tar"));
            let file_kind = if is_archive { FileKind::Archive } else { FileKind::Model };
            let model_kind = if is_archive { None } else { extension.as_deref().map(ModelKind::from_extension) };

            let design_file = DesignFile {
                id: new_id(),
                design_id: design_id.clone(),
                relative_path: format!("extracted/{}/{}", archive_file.id, extracted_file.relative_path.display()),
                filename: abs_path.file_name().unwrap().to_string_lossy().to_string(),
                extension,
                size: extracted_file.size,
                sha256: hash_by_path.get(&abs_path).cloned(),
                file_kind,
                model_kind,
                is_from_archive: true,
                parent_archive_id: Some(archive_file.id.clone()),
                is_primary: false,
            };
            ctx.store.insert_design_file(&design_file)?;
            files_registered += 1;
        }

        if delete_archive {
            tokio::fs::remove_file(&archive_path).await.ok();
            ctx.store.delete_design_file(&archive_file.id)?;
        }
    }

    info!(design_id, files_registered, previews_registered, "archive extraction complete");

    Ok(Some(serde_json::json!({
        "files_extracted": files_registered,
        "previews_registered": previews_registered,
    })))
}
