//! `IMPORT_TO_LIBRARY` handler (spec.md §4.6): moves a design's staged
//! files into the organized library tree and marks it `ORGANIZED`.

use tracing::info;

use printarr_core::domain::{DesignStatus, Job};
use printarr_core::error::PrintarrError;

use crate::library;
use crate::preview;

use super::{HandlerResult, JobContext};

pub async fn run(ctx: &JobContext, job: &Job) -> HandlerResult {
    let design_id = job
        .design_id
        .as_ref()
        .ok_or_else(|| PrintarrError::Validation { field: "design_id".into(), message: "import job missing design_id".into() })?;

    let design = ctx
        .store
        .get_design(design_id)?
        .ok_or_else(|| PrintarrError::NotFound { resource: "design".into(), id: design_id.clone() })?;

    let sources = ctx.store.list_design_sources(design_id)?;
    let source = sources
        .first()
        .ok_or_else(|| PrintarrError::Conflict { message: format!("design {design_id} has no source channel") })?;
    let channel = ctx
        .store
        .get_channel(&source.channel_id)?
        .ok_or_else(|| PrintarrError::NotFound { resource: "channel".into(), id: source.channel_id.clone() })?;

    let template = ctx
        .settings
        .get("library_path_template")?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| PrintarrError::Config { message: "library_path_template setting is not a string".into() })?;

    let staging_dir = ctx.config.paths.staging_dir(design_id);
    let final_dir = library::place_design(&staging_dir, &ctx.config.paths.library_path, &template, &design, &channel).await?;

    let files = ctx.store.list_design_files(design_id)?;
    for file in &files {
        let new_relative = compute_new_relative_path(&ctx.config.paths.library_path, &final_dir, &file.relative_path);
        ctx.store.update_design_file(&file.id, &new_relative, file.sha256.as_deref())?;
    }

    ctx.store.update_design_status(design_id, DesignStatus::Organized)?;
    preview::maybe_queue_render(&ctx.store, &ctx.settings, design_id).await?;

    info!(design_id, destination = %final_dir.display(), "design imported into library");

    Ok(Some(serde_json::json!({ "library_path": final_dir.to_string_lossy() })))
}

/// `DesignFile::relative_path` is stored relative to the library root once
/// a design is organized, so later lookups (rendering, serving files over
/// HTTP) don't need to re-derive the per-design destination directory.
fn compute_new_relative_path(library_path: &std::path::Path, final_dir: &std::path::Path, old_relative_path: &str) -> String {
    let dir_relative = final_dir.strip_prefix(library_path).unwrap_or(final_dir);
    dir_relative.join(old_relative_path).to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_relative_path_is_rooted_under_library_path() {
        let library = std::path::Path::new("/library");
        let final_dir = std::path::Path::new("/library/Alice/Dragon Bust");
        assert_eq!(
            compute_new_relative_path(library, final_dir, "model.stl"),
            "Alice/Dragon Bust/model.stl"
        );
    }
}
