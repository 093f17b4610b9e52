//! Local-folder adapter (spec.md §4.3): walks a directory tree already
//! sitting on disk (e.g. a watched "drop folder") and applies an
//! [`ImportProfile`]'s detection rules to decide where one design ends and
//! the next begins.
//!
//! This adapter has no upstream cursor: every scan walks the whole tree
//! again, and idempotency comes entirely from `ImportRecord` uniqueness on
//! `(folder_id, source_path)` downstream in the Ingest Service.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream;
use tokio::io::AsyncReadExt;
use tracing::debug;
use walkdir::WalkDir;

use printarr_core::import_profile::{FolderStructure, ImportProfile};

use printarr_core::error::{PrintarrError, Result};

use super::{ByteStream, FetchedBytes, RawFileDescriptor, RawItem, RawPreviewDescriptor, ScanResult};

const READ_CHUNK_SIZE: usize = 64 * 1024;

pub struct LocalFolderAdapter {
    root: PathBuf,
    profile: ImportProfile,
}

impl LocalFolderAdapter {
    pub fn new(root: PathBuf, profile: ImportProfile) -> Self {
        Self { root, profile }
    }

    fn is_ignored_folder(&self, name: &str) -> bool {
        self.profile.ignore.folders.iter().any(|f| f.eq_ignore_ascii_case(name))
    }

    fn is_ignored_file(&self, path: &Path) -> bool {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
        if self.profile.ignore.extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
            return true;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        self.profile
            .ignore
            .filename_patterns
            .iter()
            .any(|p| glob_match(p, name))
    }

    fn is_model_or_archive(&self, ext: &str) -> (bool, bool) {
        let ext = ext.to_lowercase();
        let is_model = self.profile.detection.model_extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext));
        let is_archive = self.profile.detection.archive_extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext));
        (is_model, is_archive)
    }

    fn is_preview_image(&self, ext: &str) -> bool {
        self.profile.preview.image_extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Determines the design-unit boundary directories for this profile's
    /// structure. `Nested` treats each immediate child of `root` as one
    /// design; `Flat` treats `root` itself as a single design; `Auto`
    /// picks nested when subdirectories exist, flat otherwise.
    fn design_roots(&self) -> Result<Vec<PathBuf>> {
        let structure = match self.profile.detection.structure {
            FolderStructure::Nested => FolderStructure::Nested,
            FolderStructure::Flat => FolderStructure::Flat,
            FolderStructure::Auto => {
                let has_subdirs = std::fs::read_dir(&self.root)
                    .map_err(|e| PrintarrError::Io { message: "reading root folder".into(), path: self.root.clone(), source: e })?
                    .filter_map(|e| e.ok())
                    .any(|e| e.path().is_dir() && !self.is_ignored_folder(&e.file_name().to_string_lossy()));
                if has_subdirs {
                    FolderStructure::Nested
                } else {
                    FolderStructure::Flat
                }
            }
        };

        match structure {
            FolderStructure::Flat => Ok(vec![self.root.clone()]),
            _ => {
                let mut roots = Vec::new();
                for entry in std::fs::read_dir(&self.root)
                    .map_err(|e| PrintarrError::Io { message: "reading root folder".into(), path: self.root.clone(), source: e })?
                {
                    let entry = entry.map_err(|e| PrintarrError::Io { message: "reading directory entry".into(), path: self.root.clone(), source: e })?;
                    let path = entry.path();
                    if path.is_dir() && !self.is_ignored_folder(&entry.file_name().to_string_lossy()) {
                        roots.push(path);
                    }
                }
                Ok(roots)
            }
        }
    }

    fn collect_item(&self, design_root: &Path) -> Result<Option<RawItem>> {
        let mut files = Vec::new();
        let mut previews = Vec::new();
        let mut model_count = 0usize;
        let mut latest_mtime: Option<DateTime<Utc>> = None;

        for entry in WalkDir::new(design_root)
            .into_iter()
            .filter_entry(|e| !e.file_type().is_dir() || !self.is_ignored_folder(&e.file_name().to_string_lossy()))
        {
            let entry = entry.map_err(|e| PrintarrError::Io {
                message: "walking design folder".into(),
                path: design_root.to_path_buf(),
                source: std::io::Error::other(e),
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let path = entry.path();
            if self.is_ignored_file(path) {
                continue;
            }
            let relative = path.strip_prefix(&self.root).unwrap_or(path).to_string_lossy().to_string();
            let metadata = entry.metadata().map_err(|e| PrintarrError::Io {
                message: "reading file metadata".into(),
                path: path.to_path_buf(),
                source: std::io::Error::other(e),
            })?;
            if let Ok(modified) = metadata.modified() {
                let modified: DateTime<Utc> = modified.into();
                latest_mtime = Some(latest_mtime.map_or(modified, |cur| cur.max(modified)));
            }

            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            let (is_model, is_archive) = self.is_model_or_archive(ext);

            if self.is_preview_image(ext) {
                previews.push(RawPreviewDescriptor {
                    filename: relative,
                    width: None,
                    height: None,
                });
                continue;
            }

            if is_model {
                model_count += 1;
            }

            files.push(RawFileDescriptor {
                filename: relative,
                size: metadata.len() as i64,
                mime: None,
                is_candidate_model: is_model || is_archive,
            });
        }

        if model_count < self.profile.detection.min_model_file_count as usize {
            debug!(path = %design_root.display(), model_count, "design folder below minimum model count, skipping");
            return Ok(None);
        }

        let folder_path = design_root
            .strip_prefix(&self.root)
            .unwrap_or(design_root)
            .to_string_lossy()
            .to_string();
        let title_hint = design_root.file_name().map(|n| n.to_string_lossy().to_string());

        Ok(Some(RawItem {
            upstream_id: folder_path.clone(),
            timestamp: latest_mtime.unwrap_or_else(Utc::now),
            author: None,
            title_hint,
            designer_hint: None,
            caption: None,
            files,
            previews,
            folder_path: Some(folder_path),
        }))
    }

    pub async fn scan(&self, _cursor: Option<&str>) -> Result<ScanResult> {
        let roots = self.design_roots()?;
        let mut items = Vec::new();
        for root in roots {
            if let Some(item) = self.collect_item(&root)? {
                items.push(item);
            }
        }
        debug!(root = %self.root.display(), count = items.len(), "local folder scan collected items");
        Ok(ScanResult { items, next_cursor: None })
    }

    pub async fn fetch_bytes(&self, _item: &RawItem, file: &RawFileDescriptor) -> Result<FetchedBytes> {
        let path = self.root.join(&file.filename);
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| PrintarrError::Io { message: "stat local file".into(), path: path.clone(), source: e })?;
        let mtime: DateTime<Utc> = metadata.modified().map(DateTime::from).unwrap_or_else(|_| Utc::now());
        let size = metadata.len() as i64;

        let file_handle = tokio::fs::File::open(&path)
            .await
            .map_err(|e| PrintarrError::Io { message: "open local file".into(), path: path.clone(), source: e })?;

        let stream: ByteStream = Box::pin(stream::unfold(file_handle, |mut f| async move {
            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            match f.read(&mut buf).await {
                Ok(0) => None,
                Ok(n) => {
                    buf.truncate(n);
                    Some((Ok(Bytes::from(buf)), f))
                }
                Err(e) => Some((Err(e), f)),
            }
        }));

        Ok(FetchedBytes { stream, size, mtime: Some(mtime) })
    }
}

/// Minimal glob support (`*` and `?` only) for ignore filename patterns.
fn glob_match(pattern: &str, name: &str) -> bool {
    fn helper(p: &[u8], n: &[u8]) -> bool {
        match (p.first(), n.first()) {
            (None, None) => true,
            (Some(b'*'), _) => helper(&p[1..], n) || (!n.is_empty() && helper(p, &n[1..])),
            (Some(b'?'), Some(_)) => helper(&p[1..], &n[1..]),
            (Some(pc), Some(nc)) if pc.eq_ignore_ascii_case(nc) => helper(&p[1..], &n[1..]),
            _ => false,
        }
    }
    helper(pattern.as_bytes(), name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_wildcard_suffix() {
        assert!(glob_match("*.ds_store", ".ds_store"));
        assert!(glob_match("thumbs.*", "thumbs.db"));
        assert!(!glob_match("thumbs.*", "notthumbs.db"));
    }

    #[tokio::test]
    async fn scan_skips_folders_below_min_model_count() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("empty_design")).unwrap();
        std::fs::write(dir.path().join("empty_design/readme.txt"), b"hi").unwrap();

        let profile = ImportProfile::default_builtin("test".into());
        let adapter = LocalFolderAdapter::new(dir.path().to_path_buf(), profile);
        let result = adapter.scan(None).await.unwrap();
        assert!(result.items.is_empty());
    }

    #[tokio::test]
    async fn scan_finds_nested_design_with_model_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Dragon")).unwrap();
        std::fs::write(dir.path().join("Dragon/model.stl"), b"data").unwrap();

        let profile = ImportProfile::default_builtin("test".into());
        let adapter = LocalFolderAdapter::new(dir.path().to_path_buf(), profile);
        let result = adapter.scan(None).await.unwrap();
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].title_hint.as_deref(), Some("Dragon"));
    }
}
