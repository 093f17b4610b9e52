//! `DOWNLOAD_DESIGN` handler (spec.md §4.5): streams every candidate
//! design file from the source adapter into the design's staging
//! directory, hashing as it writes, then marks the design `DOWNLOADED`.

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::info;

use printarr_core::domain::*;
use printarr_core::error::{PrintarrError, Result};
use printarr_core::hashing;

use crate::adapters::{RawFileDescriptor, RawItem};

use super::{HandlerResult, JobContext, PROGRESS_THROTTLE};

/// A placeholder item passed to `Adapter::fetch_bytes`: every adapter in
/// this codebase only reads `file.filename` out of the file descriptor,
/// so reconstructing the original scan-time `RawItem` isn't necessary
/// once a design has already been ingested.
fn placeholder_item() -> RawItem {
    RawItem {
        upstream_id: String::new(),
        timestamp: chrono::Utc::now(),
        author: None,
        title_hint: None,
        designer_hint: None,
        caption: None,
        files: Vec::new(),
        previews: Vec::new(),
        folder_path: None,
    }
}

pub async fn run(ctx: &JobContext, job: &Job) -> HandlerResult {
    let design_id = job
        .design_id
        .as_ref()
        .ok_or_else(|| PrintarrError::Validation { field: "design_id".into(), message: "download job missing design_id".into() })?;

    ctx.store
        .get_design(design_id)?
        .ok_or_else(|| PrintarrError::NotFound { resource: "design".into(), id: design_id.clone() })?;

    let sources = ctx.store.list_design_sources(design_id)?;
    let source = sources
        .first()
        .ok_or_else(|| PrintarrError::Conflict { message: format!("design {design_id} has no source to download from") })?;

    let adapter = ctx
        .adapter_for_channel(&source.channel_id)
        .ok_or_else(|| PrintarrError::Config { message: format!("no adapter configured for channel {}", source.channel_id) })?;

    let attachments = ctx
        .store
        .list_attachments_for_message(&source.message_id)?
        .into_iter()
        .filter(|a| a.is_candidate_design_file)
        .collect::<Vec<_>>();

    if attachments.is_empty() {
        return Err(PrintarrError::Conflict { message: format!("design {design_id} has no candidate files to download") });
    }

    ctx.store.update_design_status(design_id, DesignStatus::Downloading)?;

    let staging_dir = ctx.config.paths.staging_dir(design_id);
    tokio::fs::create_dir_all(&staging_dir)
        .await
        .map_err(|e| PrintarrError::Io { message: "creating staging directory".into(), path: staging_dir.clone(), source: e })?;

    let item = placeholder_item();
    let total = attachments.len() as i64;
    let mut last_progress = std::time::Instant::now() - PROGRESS_THROTTLE;

    for (i, attachment) in attachments.iter().enumerate() {
        let descriptor = RawFileDescriptor {
            filename: attachment.filename.clone(),
            size: attachment.size,
            mime: attachment.mime.clone(),
            is_candidate_model: true,
        };
        let fetched = adapter.fetch_bytes(&item, &descriptor).await?;
        let dest_path = staging_dir.join(sanitize_filename(&attachment.filename));

        write_stream_to_file(fetched.stream, &dest_path).await?;
        let sha256 = hashing::compute_file_hash(dest_path.clone()).await?;

        ctx.store.update_attachment_download_state(
            &attachment.id,
            AttachmentDownloadStatus::Downloaded,
            Some(&dest_path.to_string_lossy()),
            Some(&sha256),
        )?;

        let extension = dest_path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase());
        let is_archive = extension.as_deref().is_some_and(|e| matches!(e, "zip" | "rar" | "7z" | "tar"));
        let file_kind = if is_archive { FileKind::Archive } else { FileKind::Model };
        let model_kind = if is_archive { None } else { extension.as_deref().map(ModelKind::from_extension) };

        let design_file = DesignFile {
            id: new_id(),
            design_id: design_id.clone(),
            relative_path: dest_path.file_name().unwrap().to_string_lossy().to_string(),
            filename: attachment.filename.clone(),
            extension,
            size: fetched.size,
            sha256: Some(sha256),
            file_kind,
            model_kind,
            is_from_archive: false,
            parent_archive_id: None,
            is_primary: i == 0,
        };
        ctx.store.insert_design_file(&design_file)?;

        if last_progress.elapsed() >= PROGRESS_THROTTLE || i as i64 == total - 1 {
            ctx.store.update_progress(&job.id, i as i64 + 1, total)?;
            last_progress = std::time::Instant::now();
        }
    }

    ctx.store.update_design_status(design_id, DesignStatus::Downloaded)?;
    info!(design_id, files = attachments.len(), "design download complete");

    Ok(Some(serde_json::json!({ "files_downloaded": attachments.len() })))
}

async fn write_stream_to_file(mut stream: crate::adapters::ByteStream, dest: &std::path::Path) -> Result<()> {
    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| PrintarrError::Io { message: "creating staged file".into(), path: dest.to_path_buf(), source: e })?;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| PrintarrError::Io { message: "reading download stream".into(), path: dest.to_path_buf(), source: e })?;
        file.write_all(&chunk)
            .await
            .map_err(|e| PrintarrError::Io { message: "writing staged file".into(), path: dest.to_path_buf(), source: e })?;
    }
    Ok(())
}

fn sanitize_filename(name: &str) -> String {
    name.rsplit('/').next().unwrap_or(name).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_filename_strips_directory_components() {
        assert_eq!(sanitize_filename("sub/dir/model.stl"), "model.stl");
        assert_eq!(sanitize_filename("model.stl"), "model.stl");
    }
}
