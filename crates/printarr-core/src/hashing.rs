//! Streaming SHA-256, run off the async scheduler thread so large files
//! never block it (spec.md §4.12, property H-1).
//!
//! Chunk size matches the original implementation's
//! `utils/file_hash.py::DEFAULT_CHUNK_SIZE` (8 KiB), grounded in shape on
//! the teacher's `model_library/hashing.rs` (`spawn_blocking` + streaming
//! reader), scaled down from its 8 MiB chunks since spec.md explicitly
//! mandates "chunked 8 KiB" (§4.7).
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{PrintarrError, Result};

pub const CHUNK_SIZE: usize = 8192;

fn hash_file_sync(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path).map_err(|source| PrintarrError::Io {
        message: "failed to open file for hashing".to_string(),
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut buf).map_err(|source| PrintarrError::Io {
            message: "failed to read file while hashing".to_string(),
            path: path.to_path_buf(),
            source,
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compute a file's SHA-256 on a blocking thread, streaming in 8 KiB
/// chunks. Never loads the whole file into memory.
pub async fn compute_file_hash(path: impl Into<PathBuf>) -> Result<String> {
    let path = path.into();
    tokio::task::spawn_blocking(move || hash_file_sync(&path))
        .await
        .map_err(|e| PrintarrError::Other(format!("hashing task panicked: {e}")))?
}

/// Best-effort batch hashing: files that error (not found, permission
/// denied, other I/O errors) are skipped rather than failing the whole
/// batch, matching `compute_file_hashes_batch`'s original semantics.
pub async fn compute_file_hashes_batch(paths: Vec<PathBuf>) -> Vec<(PathBuf, String)> {
    let mut results = Vec::with_capacity(paths.len());
    for path in paths {
        if let Ok(hash) = compute_file_hash(path.clone()).await {
            results.push((path, hash));
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn same_content_hashes_identically() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::File::create(&a).unwrap().write_all(b"hello world").unwrap();
        std::fs::File::create(&b).unwrap().write_all(b"hello world").unwrap();

        assert_eq!(
            compute_file_hash(a).await.unwrap(),
            compute_file_hash(b).await.unwrap()
        );
    }

    #[tokio::test]
    async fn different_content_hashes_differently() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::File::create(&a).unwrap().write_all(b"hello world").unwrap();
        std::fs::File::create(&b).unwrap().write_all(b"goodbye world").unwrap();

        assert_ne!(
            compute_file_hash(a).await.unwrap(),
            compute_file_hash(b).await.unwrap()
        );
    }

    #[tokio::test]
    async fn empty_file_hashes_to_sha256_of_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::File::create(&path).unwrap();

        let hash = compute_file_hash(path).await.unwrap();
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn hash_is_64_char_lowercase_hex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.bin");
        std::fs::write(&path, b"arbitrary content").unwrap();

        let hash = compute_file_hash(path).await.unwrap();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[tokio::test]
    async fn missing_file_is_skipped_in_batch() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.bin");
        std::fs::write(&present, b"data").unwrap();
        let missing = dir.path().join("missing.bin");

        let results = compute_file_hashes_batch(vec![present.clone(), missing]).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, present);
    }
}
