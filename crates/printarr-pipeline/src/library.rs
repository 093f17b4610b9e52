//! Library Service (spec.md §4.6): places a design's files into the
//! user's organized library tree, following a path template, sanitizing
//! each path segment, and resolving name collisions with a numbered
//! suffix.

use std::path::{Path, PathBuf};

use printarr_core::domain::{Channel, Design};
use printarr_core::error::{PrintarrError, Result};

/// Placeholders a `library_path_template` setting may reference.
/// `{date}` resolves to the design's `created_at` date in `YYYY-MM-DD`.
fn render_template(template: &str, design: &Design, channel_title: &str) -> String {
    template
        .replace("{designer}", &sanitize_segment(&effective_designer(design)))
        .replace("{channel}", &sanitize_segment(channel_title))
        .replace("{title}", &sanitize_segment(&effective_title(design)))
        .replace("{date}", &design.created_at.format("%Y-%m-%d").to_string())
}

fn effective_title(design: &Design) -> String {
    design.title_override.clone().unwrap_or_else(|| design.canonical_title.clone())
}

fn effective_designer(design: &Design) -> String {
    design.designer_override.clone().unwrap_or_else(|| design.canonical_designer.clone())
}

/// Strips characters the host filesystem can't represent in a path
/// segment and collapses surrounding whitespace, without touching `/` —
/// callers pass one path component at a time.
fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| if "\\:*?\"<>|".contains(c) { '_' } else { c })
        .collect();
    let trimmed = cleaned.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Computes the destination directory for a design under `library_root`,
/// given the path template from the `library_path_template` setting.
pub fn destination_dir(library_root: &Path, template: &str, design: &Design, channel_title: &str) -> PathBuf {
    let rendered = render_template(template, design, channel_title);
    let mut path = library_root.to_path_buf();
    for segment in rendered.split('/').filter(|s| !s.is_empty()) {
        path.push(segment);
    }
    path
}

/// Appends " (2)", " (3)", ... to `dir` until it names a path that does
/// not yet exist, bounded so a pathological template can't loop forever.
const MAX_CONFLICT_SUFFIX: u32 = 1000;

pub fn resolve_conflict(dir: &Path) -> Result<PathBuf> {
    if !dir.exists() {
        return Ok(dir.to_path_buf());
    }
    let parent = dir.parent().unwrap_or(dir);
    let name = dir.file_name().and_then(|n| n.to_str()).unwrap_or("design").to_string();
    for n in 2..=MAX_CONFLICT_SUFFIX {
        let candidate = parent.join(format!("{name} ({n})"));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(PrintarrError::Conflict {
        message: format!("could not find a free library path for {}", dir.display()),
    })
}

/// Moves a staged design directory into the library, renaming on
/// collision and falling back to copy-then-delete when the staging and
/// library roots live on different filesystems.
pub async fn place_design(
    staging_dir: &Path,
    library_root: &Path,
    template: &str,
    design: &Design,
    channel: &Channel,
) -> Result<PathBuf> {
    let wanted = destination_dir(library_root, template, design, &channel.title);
    let final_dir = resolve_conflict(&wanted)?;

    if let Some(parent) = final_dir.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PrintarrError::Io { message: "creating library parent directory".into(), path: parent.to_path_buf(), source: e })?;
    }

    match tokio::fs::rename(staging_dir, &final_dir).await {
        Ok(()) => {}
        Err(_) => copy_dir_recursive(staging_dir, &final_dir).await?,
    }

    Ok(final_dir)
}

async fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dst)
        .await
        .map_err(|e| PrintarrError::Io { message: "creating library directory".into(), path: dst.to_path_buf(), source: e })?;

    let mut stack = vec![(src.to_path_buf(), dst.to_path_buf())];
    while let Some((from, to)) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&from)
            .await
            .map_err(|e| PrintarrError::Io { message: "reading directory to copy".into(), path: from.clone(), source: e })?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PrintarrError::Io { message: "reading directory entry".into(), path: from.clone(), source: e })?
        {
            let src_path = entry.path();
            let dst_path = to.join(entry.file_name());
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                tokio::fs::create_dir_all(&dst_path)
                    .await
                    .map_err(|e| PrintarrError::Io { message: "creating directory".into(), path: dst_path.clone(), source: e })?;
                stack.push((src_path, dst_path));
            } else {
                tokio::fs::copy(&src_path, &dst_path)
                    .await
                    .map_err(|e| PrintarrError::Io { message: "copying file".into(), path: dst_path.clone(), source: e })?;
            }
        }
    }
    tokio::fs::remove_dir_all(src)
        .await
        .map_err(|e| PrintarrError::Io { message: "removing staging directory".into(), path: src.to_path_buf(), source: e })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use printarr_core::domain::*;

    fn sample_design() -> Design {
        let now = chrono::DateTime::parse_from_rfc3339("2026-01-15T00:00:00Z").unwrap().with_timezone(&chrono::Utc);
        Design {
            id: new_id(),
            canonical_title: "Dragon Bust".to_string(),
            canonical_designer: "Alice".to_string(),
            title_override: None,
            designer_override: None,
            multicolor_status: MulticolorStatus::Unknown,
            multicolor_source: MulticolorSource::Heuristic,
            status: DesignStatus::Downloaded,
            primary_file_type: Some("3mf".to_string()),
            total_size: 0,
            metadata_authority: MetadataAuthority::Caption,
            import_source_id: None,
            family_id: None,
            variant_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn renders_default_template() {
        let design = sample_design();
        let rendered = render_template("{designer}/{channel}/{title}", &design, "Minis Weekly");
        assert_eq!(rendered, "Alice/Minis Weekly/Dragon Bust");
    }

    #[test]
    fn sanitizes_path_unsafe_characters() {
        assert_eq!(sanitize_segment("Dragon: Part 1?"), "Dragon_ Part 1_");
    }

    #[test]
    fn resolve_conflict_appends_numbered_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("Dragon");
        std::fs::create_dir(&base).unwrap();
        let resolved = resolve_conflict(&base).unwrap();
        assert_eq!(resolved, dir.path().join("Dragon (2)"));
    }
}
