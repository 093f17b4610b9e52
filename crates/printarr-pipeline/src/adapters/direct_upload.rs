//! Direct-upload adapter (spec.md §4.3): the passive counterpart to the
//! other four. An HTTP handler stages uploaded files onto disk and
//! records an `ImportRecord` per upload; this adapter's `scan` simply
//! drains whatever has been staged since the last call rather than
//! reaching out to any upstream itself.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use futures::stream;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;

use printarr_core::domain::is_candidate_design_extension;
use printarr_core::error::{PrintarrError, Result};

use super::{ByteStream, FetchedBytes, RawFileDescriptor, RawItem, RawPreviewDescriptor, ScanResult};

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// One upload an HTTP handler has staged onto disk, waiting to be picked
/// up by the next `scan`.
#[derive(Debug, Clone)]
pub struct StagedUpload {
    pub upload_id: String,
    pub title_hint: Option<String>,
    pub staged_path: PathBuf,
    pub filename: String,
    pub size: i64,
}

pub struct DirectUploadAdapter {
    pending: Arc<Mutex<Vec<StagedUpload>>>,
}

impl DirectUploadAdapter {
    pub fn new() -> Self {
        Self { pending: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Called by the upload HTTP handler once a file has finished
    /// writing to the staging directory.
    pub async fn stage(&self, upload: StagedUpload) {
        self.pending.lock().await.push(upload);
    }

    /// Snapshot of what's staged without draining it, for a status
    /// listing endpoint.
    pub async fn pending(&self) -> Vec<StagedUpload> {
        self.pending.lock().await.clone()
    }

    /// Removes one staged upload before it's processed. Returns `true` if
    /// something was removed.
    pub async fn remove(&self, upload_id: &str) -> bool {
        let mut guard = self.pending.lock().await;
        let before = guard.len();
        guard.retain(|u| u.upload_id != upload_id);
        guard.len() != before
    }

    pub async fn scan(&self, _cursor: Option<&str>) -> Result<ScanResult> {
        let mut guard = self.pending.lock().await;
        let drained: Vec<StagedUpload> = guard.drain(..).collect();
        drop(guard);

        let items = drained
            .into_iter()
            .map(|upload| {
                let ext = std::path::Path::new(&upload.filename)
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("");
                RawItem {
                    upstream_id: upload.upload_id.clone(),
                    timestamp: Utc::now(),
                    author: None,
                    title_hint: upload.title_hint.clone(),
                    designer_hint: None,
                    caption: None,
                    files: vec![RawFileDescriptor {
                        filename: upload.staged_path.to_string_lossy().to_string(),
                        size: upload.size,
                        mime: None,
                        is_candidate_model: is_candidate_design_extension(ext),
                    }],
                    previews: Vec::<RawPreviewDescriptor>::new(),
                    folder_path: None,
                }
            })
            .collect();

        Ok(ScanResult { items, next_cursor: None })
    }

    pub async fn fetch_bytes(&self, _item: &RawItem, file: &RawFileDescriptor) -> Result<FetchedBytes> {
        let path = PathBuf::from(&file.filename);
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| PrintarrError::Io { message: "stat staged upload".into(), path: path.clone(), source: e })?;
        let size = metadata.len() as i64;

        let file_handle = tokio::fs::File::open(&path)
            .await
            .map_err(|e| PrintarrError::Io { message: "open staged upload".into(), path: path.clone(), source: e })?;

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

        Ok(FetchedBytes { stream, size, mtime: None })
    }
}

impl Default for DirectUploadAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scan_drains_staged_uploads() {
        let adapter = DirectUploadAdapter::new();
        adapter
            .stage(StagedUpload {
                upload_id: "u1".into(),
                title_hint: Some("Dragon".into()),
                staged_path: PathBuf::from("/tmp/u1/model.stl"),
                filename: "model.stl".into(),
                size: 100,
            })
            .await;

        let result = adapter.scan(None).await.unwrap();
        assert_eq!(result.items.len(), 1);

        let second = adapter.scan(None).await.unwrap();
        assert!(second.items.is_empty());
    }
}
