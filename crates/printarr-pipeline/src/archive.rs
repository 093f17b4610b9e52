//! Archive Service (spec.md §4.6): extracts a downloaded archive into the
//! design's staging directory, one level deep. `.zip` is handled in-process
//! via the `zip` crate; `.rar`/`.7z`/`.tar`(`.gz`/`.zst`) shell out to the
//! matching system tool the way the rest of this codebase launches
//! external processes, since no pure-Rust crate in this stack reads those
//! formats.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use printarr_core::error::{PrintarrError, Result};

/// Returns the sibling part files a split archive expects to find next to
/// `first_part`, based on whichever naming convention it uses.
fn expected_sibling_parts(first_part: &Path) -> Vec<PathBuf> {
    let Some(dir) = first_part.parent() else { return Vec::new() };
    let Some(name) = first_part.file_name().and_then(|n| n.to_str()) else { return Vec::new() };

    if let Some(pos) = name.to_lowercase().find(".part1.rar") {
        let base = &name[..pos];
        // We cannot know the total part count up front; the caller walks
        // part2, part3, ... until one is missing, which is the only
        // reliable signal a split archive is incomplete.
        return (2..=50)
            .map(|n| dir.join(format!("{base}.part{n}.rar")))
            .collect();
    }
    Vec::new()
}

/// Checks that every part of a split archive this adapter can detect is
/// actually present on disk. Returns the missing filename, if any.
pub fn find_missing_archive_part(first_part: &Path) -> Option<PathBuf> {
    for candidate in expected_sibling_parts(first_part) {
        if !candidate.exists() {
            // Stop scanning once we hit a name past the real part count:
            // treat the first absent candidate as authoritative only when
            // a later one does exist (otherwise we simply ran past the end).
            let later_exists = expected_sibling_parts(first_part)
                .iter()
                .skip_while(|p| *p != &candidate)
                .skip(1)
                .any(|p| p.exists());
            if later_exists {
                return Some(candidate);
            }
            break;
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Rar,
    SevenZip,
    Tar,
    TarGz,
    TarZst,
}

impl ArchiveFormat {
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.zst") {
            Some(Self::TarZst)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".rar") {
            Some(Self::Rar)
        } else if name.ends_with(".7z") {
            Some(Self::SevenZip)
        } else {
            None
        }
    }
}

/// A file produced by extraction, relative to the destination directory.
#[derive(Debug, Clone)]
pub struct ExtractedFile {
    pub relative_path: PathBuf,
    pub size: i64,
}

/// Extracts `archive_path` into `dest_dir`, one level deep: a single
/// top-level directory inside the archive is flattened away so files
/// don't end up double-nested under the design's staging folder.
pub async fn extract(archive_path: &Path, dest_dir: &Path) -> Result<Vec<ExtractedFile>> {
    let format = ArchiveFormat::detect(archive_path)
        .ok_or_else(|| PrintarrError::CorruptedArchive(archive_path.to_path_buf()))?;

    if format == ArchiveFormat::Rar {
        if let Some(missing) = find_missing_archive_part(archive_path) {
            return Err(PrintarrError::MissingArchivePart(missing));
        }
    }

    tokio::fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| PrintarrError::Io { message: "creating extraction directory".into(), path: dest_dir.to_path_buf(), source: e })?;

    let archive_path = archive_path.to_path_buf();
    let dest_dir_owned = dest_dir.to_path_buf();

    let files = match format {
        ArchiveFormat::Zip => {
            tokio::task::spawn_blocking(move || extract_zip(&archive_path, &dest_dir_owned))
                .await
                .map_err(|e| PrintarrError::Other(format!("extraction task panicked: {e}")))??
        }
        ArchiveFormat::Rar => extract_via_external_tool("unrar", &["-o+"], &archive_path, &dest_dir_owned).await?,
        ArchiveFormat::SevenZip => extract_via_external_tool("7z", &["x"], &archive_path, &dest_dir_owned).await?,
        ArchiveFormat::Tar => extract_tar(&archive_path, &dest_dir_owned, false, false).await?,
        ArchiveFormat::TarGz => extract_tar(&archive_path, &dest_dir_owned, true, false).await?,
        ArchiveFormat::TarZst => extract_tar(&archive_path, &dest_dir_owned, false, true).await?,
    };

    flatten_single_top_level_dir(dest_dir).await?;
    Ok(files)
}

fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<Vec<ExtractedFile>> {
    let file = std::fs::File::open(archive_path)
        .map_err(|e| PrintarrError::Io { message: "opening archive".into(), path: archive_path.to_path_buf(), source: e })?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| classify_zip_error(archive_path, e))?;

    let mut files = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| classify_zip_error(archive_path, e))?;
        if entry.is_dir() {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            warn!(index = i, "skipping zip entry with unsafe path");
            continue;
        };
        let out_path = dest_dir.join(&relative);
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PrintarrError::Io { message: "creating extracted directory".into(), path: parent.to_path_buf(), source: e })?;
        }
        let mut out_file = std::fs::File::create(&out_path)
            .map_err(|e| PrintarrError::Io { message: "creating extracted file".into(), path: out_path.clone(), source: e })?;
        std::io::copy(&mut entry, &mut out_file)
            .map_err(|e| PrintarrError::Io { message: "writing extracted file".into(), path: out_path.clone(), source: e })?;
        files.push(ExtractedFile { relative_path: relative, size: entry.size() as i64 });
    }
    Ok(files)
}

fn classify_zip_error(path: &Path, err: zip::result::ZipError) -> PrintarrError {
    match err {
        zip::result::ZipError::UnsupportedArchive(msg) if msg.contains("Password") => {
            PrintarrError::PasswordProtectedArchive(path.to_path_buf())
        }
        _ => PrintarrError::CorruptedArchive(path.to_path_buf()),
    }
}

async fn extract_tar(archive_path: &Path, dest_dir: &Path, gzip: bool, zstd: bool) -> Result<Vec<ExtractedFile>> {
    let archive_path = archive_path.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<Vec<ExtractedFile>> {
        let file = std::fs::File::open(&archive_path)
            .map_err(|e| PrintarrError::Io { message: "opening archive".into(), path: archive_path.clone(), source: e })?;

        let mut files = Vec::new();
        let unpack = |mut archive: tar::Archive<Box<dyn std::io::Read>>| -> Result<Vec<ExtractedFile>> {
            let mut out = Vec::new();
            for entry in archive.entries().map_err(|_| PrintarrError::CorruptedArchive(archive_path.clone()))? {
                let mut entry = entry.map_err(|_| PrintarrError::CorruptedArchive(archive_path.clone()))?;
                let relative = entry.path().map_err(|_| PrintarrError::CorruptedArchive(archive_path.clone()))?.to_path_buf();
                let size = entry.size() as i64;
                entry.unpack_in(&dest_dir).map_err(|e| PrintarrError::Io { message: "unpacking tar entry".into(), path: dest_dir.clone(), source: e })?;
                out.push(ExtractedFile { relative_path: relative, size });
            }
            Ok(out)
        };

        if gzip {
            let reader: Box<dyn std::io::Read> = Box::new(flate2::read::GzDecoder::new(file));
            files = unpack(tar::Archive::new(reader))?;
        } else if zstd {
            let reader: Box<dyn std::io::Read> = Box::new(
                zstd::stream::Decoder::new(file).map_err(|_| PrintarrError::CorruptedArchive(archive_path.clone()))?,
            );
            files = unpack(tar::Archive::new(reader))?;
        } else {
            let reader: Box<dyn std::io::Read> = Box::new(file);
            files = unpack(tar::Archive::new(reader))?;
        }
        Ok(files)
    })
    .await
    .map_err(|e| PrintarrError::Other(format!("extraction task panicked: {e}")))?
}

async fn extract_via_external_tool(tool: &str, args: &[&str], archive_path: &Path, dest_dir: &Path) -> Result<Vec<ExtractedFile>> {
    let mut cmd = tokio::process::Command::new(tool);
    if tool == "unrar" {
        // unrar takes the destination as a bare trailing argument and
        // "-p-" refuses to prompt for a password on a protected archive,
        // turning it into a clean non-interactive failure instead.
        cmd.arg("x").arg("-p-").args(args).arg(archive_path).arg(dest_dir);
    } else {
        cmd.args(args).arg(archive_path).arg(format!("-o{}", dest_dir.display()));
    }

    let output = cmd
        .output()
        .await
        .map_err(|e| PrintarrError::Io { message: format!("spawning {tool}"), path: archive_path.to_path_buf(), source: e })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
        if stderr.contains("password") || stderr.contains("encrypted") {
            return Err(PrintarrError::PasswordProtectedArchive(archive_path.to_path_buf()));
        }
        debug!(tool, stderr = %stderr, "external archive extraction failed");
        return Err(PrintarrError::CorruptedArchive(archive_path.to_path_buf()));
    }

    let mut files = Vec::new();
    let mut walker = tokio::fs::read_dir(dest_dir)
        .await
        .map_err(|e| PrintarrError::Io { message: "listing extracted files".into(), path: dest_dir.to_path_buf(), source: e })?;
    while let Some(entry) = walker.next_entry().await.map_err(|e| PrintarrError::Io { message: "listing extracted files".into(), path: dest_dir.to_path_buf(), source: e })? {
        if let Ok(metadata) = entry.metadata().await {
            if metadata.is_file() {
                files.push(ExtractedFile {
                    relative_path: PathBuf::from(entry.file_name()),
                    size: metadata.len() as i64,
                });
            }
        }
    }
    Ok(files)
}

/// If extraction produced exactly one directory at the top level, moves
/// its contents up so the design's files sit directly in `dest_dir`
/// rather than under an extra `ArchiveName/` layer (spec.md §4.6's
/// one-level-nesting rule).
async fn flatten_single_top_level_dir(dest_dir: &Path) -> Result<()> {
    let mut entries = tokio::fs::read_dir(dest_dir)
        .await
        .map_err(|e| PrintarrError::Io { message: "reading extraction directory".into(), path: dest_dir.to_path_buf(), source: e })?;

    let mut top_level = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| PrintarrError::Io { message: "reading extraction directory".into(), path: dest_dir.to_path_buf(), source: e })? {
        top_level.push(entry.path());
    }

    if top_level.len() == 1 && top_level[0].is_dir() {
        let inner = top_level.into_iter().next().unwrap();
        let mut inner_entries = tokio::fs::read_dir(&inner)
            .await
            .map_err(|e| PrintarrError::Io { message: "reading nested directory".into(), path: inner.clone(), source: e })?;
        while let Some(entry) = inner_entries.next_entry().await.map_err(|e| PrintarrError::Io { message: "reading nested directory".into(), path: inner.clone(), source: e })? {
            let target = dest_dir.join(entry.file_name());
            tokio::fs::rename(entry.path(), &target)
                .await
                .map_err(|e| PrintarrError::Io { message: "flattening nested directory".into(), path: target, source: e })?;
        }
        let _ = tokio::fs::remove_dir(&inner).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_format_from_extension() {
        assert_eq!(ArchiveFormat::detect(Path::new("x.zip")), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::detect(Path::new("x.tar.gz")), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::detect(Path::new("x.rar")), Some(ArchiveFormat::Rar));
        assert_eq!(ArchiveFormat::detect(Path::new("x.txt")), None);
    }

    #[tokio::test]
    async fn extracts_zip_and_flattens_single_top_level_dir() {
        let src_dir = tempfile::tempdir().unwrap();
        let zip_path = src_dir.path().join("model.zip");
        {
            let file = std::fs::File::create(&zip_path).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            writer.start_file("Dragon/model.stl", zip::write::SimpleFileOptions::default()).unwrap();
            std::io::Write::write_all(&mut writer, b"stl-data").unwrap();
            writer.finish().unwrap();
        }

        let dest = tempfile::tempdir().unwrap();
        let files = extract(&zip_path, dest.path()).await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(dest.path().join("model.stl").exists());
    }
}
