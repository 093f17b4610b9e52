//! `ANALYZE_3MF` and `GENERATE_RENDER` handlers (spec.md §4.5/§4.6).
//! Analysis reads the 3MF's model XML in-process; rendering shells out to
//! an external rasteriser the same way archive extraction shells out to
//! `unrar`/`7z`, so it stays mockable in tests by swapping `RENDERER_BIN`.

use std::path::PathBuf;

use tracing::{info, warn};

use printarr_core::domain::{FileKind, Job, ModelKind, MulticolorSource};
use printarr_core::error::{PrintarrError, Result};
use printarr_core::multicolor;

use crate::preview;

use super::{HandlerResult, JobContext};

/// External binary invoked to rasterise a model file into a PNG preview.
/// Swappable in integration tests via the `PRINTARR_RENDERER_BIN` env var.
const DEFAULT_RENDERER_BIN: &str = "printarr-render";

fn primary_model_file(files: &[printarr_core::domain::DesignFile], kind: ModelKind) -> Option<&printarr_core::domain::DesignFile> {
    files.iter().find(|f| f.file_kind == FileKind::Model && f.model_kind == Some(kind))
}

pub async fn run_analyze(ctx: &JobContext, job: &Job) -> HandlerResult {
    let design_id = job
        .design_id
        .as_ref()
        .ok_or_else(|| PrintarrError::Validation { field: "design_id".into(), message: "analyze job missing design_id".into() })?;

    let staging_dir = ctx.config.paths.staging_dir(design_id);
    let files = ctx.store.list_design_files(design_id)?;
    let Some(threemf) = primary_model_file(&files, ModelKind::ThreeMf) else {
        info!(design_id, "no 3mf file to analyze, skipping");
        return Ok(Some(serde_json::json!({ "analyzed": false })));
    };

    let path = resolve_design_file_path(&staging_dir, &ctx.config.paths.library_path, &threemf.relative_path);
    let analysis = tokio::task::spawn_blocking({
        let path = path.clone();
        move || multicolor::detect_from_3mf(&path)
    })
    .await
    .map_err(|e| PrintarrError::Other(format!("3mf analysis task panicked: {e}")))?;

    let status = if analysis.is_multicolor {
        printarr_core::domain::MulticolorStatus::Multi
    } else {
        printarr_core::domain::MulticolorStatus::Single
    };
    let applied = ctx.store.set_multicolor(design_id, status, MulticolorSource::ThreeMfAnalysis)?;

    info!(design_id, is_multicolor = analysis.is_multicolor, applied, "3mf analysis complete");
    Ok(Some(serde_json::json!({
        "analyzed": true,
        "is_multicolor": analysis.is_multicolor,
        "colors": analysis.colors,
        "materials": analysis.materials,
    })))
}

pub async fn run_render(ctx: &JobContext, job: &Job) -> HandlerResult {
    let design_id = job
        .design_id
        .as_ref()
        .ok_or_else(|| PrintarrError::Validation { field: "design_id".into(), message: "render job missing design_id".into() })?;

    let staging_dir = ctx.config.paths.staging_dir(design_id);
    let files = ctx.store.list_design_files(design_id)?;
    let model_file = primary_model_file(&files, ModelKind::ThreeMf)
        .or_else(|| primary_model_file(&files, ModelKind::Stl))
        .ok_or_else(|| PrintarrError::Conflict { message: format!("design {design_id} has no renderable model file") })?;

    let model_path = resolve_design_file_path(&staging_dir, &ctx.config.paths.library_path, &model_file.relative_path);
    let preview_dir = ctx.config.paths.preview_dir(design_id);
    tokio::fs::create_dir_all(&preview_dir)
        .await
        .map_err(|e| PrintarrError::Io { message: "creating preview directory".into(), path: preview_dir.clone(), source: e })?;
    let output_path = preview_dir.join("render.png");

    invoke_renderer(&model_path, &output_path).await?;

    let preview_id = preview::register_rendered_preview(&ctx.store, design_id, &output_path.to_string_lossy())?;
    info!(design_id, preview_id, "render complete");

    Ok(Some(serde_json::json!({ "preview_id": preview_id })))
}

async fn invoke_renderer(model_path: &std::path::Path, output_path: &std::path::Path) -> Result<()> {
    let bin = std::env::var("PRINTARR_RENDERER_BIN").unwrap_or_else(|_| DEFAULT_RENDERER_BIN.to_string());
    let output = tokio::process::Command::new(&bin)
        .arg(model_path)
        .arg(output_path)
        .output()
        .await
        .map_err(|e| PrintarrError::Upstream { service: "renderer".into(), message: format!("failed to spawn {bin}: {e}") })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(bin, stderr = %stderr, "renderer exited with failure");
        return Err(PrintarrError::Upstream { service: "renderer".into(), message: stderr.trim().to_string() });
    }
    Ok(())
}

/// `relative_path` on a `DesignFile` is relative to the staging directory
/// before import and relative to the library root afterward (see
/// `import::compute_new_relative_path`). A file still only in staging
/// won't exist under the library root, so checking existence there first
/// picks the right base without needing the design's organized status.
fn resolve_design_file_path(staging_dir: &std::path::Path, library_path: &std::path::Path, relative_path: &str) -> PathBuf {
    let in_library = library_path.join(relative_path);
    if in_library.exists() {
        in_library
    } else {
        staging_dir.join(relative_path)
    }
}
