//! Source adapters (spec.md §4.3): a uniform `scan`/`fetch_bytes`
//! capability over five very different upstreams. Each adapter is a
//! variant of the [`Adapter`] sum type rather than a `dyn Trait` object —
//! the concrete source is known at construction time (when a `Channel` or
//! `ImportSource` is configured) and never changes for the lifetime of the
//! value, so dynamic dispatch per call would only hide a decision already
//! made once.

pub mod chat_feed;
pub mod cloud_drive;
pub mod direct_upload;
pub mod forum;
pub mod local_folder;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::pin::Pin;

use printarr_core::error::Result;

pub use chat_feed::ChatFeedAdapter;
pub use cloud_drive::CloudDriveAdapter;
pub use direct_upload::DirectUploadAdapter;
pub use forum::ForumAdapter;
pub use local_folder::LocalFolderAdapter;

/// A file attached to a raw upstream item, before any download has
/// happened.
#[derive(Debug, Clone)]
pub struct RawFileDescriptor {
    pub filename: String,
    pub size: i64,
    pub mime: Option<String>,
    pub is_candidate_model: bool,
}

/// A preview image an adapter can see without downloading the design
/// itself (e.g. a Telegram photo alongside a document, or a thumbnail
/// folder in a cloud-drive listing).
#[derive(Debug, Clone)]
pub struct RawPreviewDescriptor {
    pub filename: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
}

/// One upstream unit of work: a chat message, a cloud-drive folder, a
/// forum post, a local directory, or an uploaded batch. Carries everything
/// the Ingest Service needs without having to know which adapter produced
/// it.
#[derive(Debug, Clone)]
pub struct RawItem {
    /// Stable id in the upstream system, used for idempotent upsert.
    pub upstream_id: String,
    pub timestamp: DateTime<Utc>,
    pub author: Option<String>,
    pub title_hint: Option<String>,
    pub designer_hint: Option<String>,
    pub caption: Option<String>,
    pub files: Vec<RawFileDescriptor>,
    pub previews: Vec<RawPreviewDescriptor>,
    /// Set by folder-shaped sources (cloud-drive, local-folder); carries
    /// the relative directory an item was found under.
    pub folder_path: Option<String>,
}

/// Result of a single `scan` call: a batch of items collected in memory,
/// plus the cursor to resume from next time.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub items: Vec<RawItem>,
    pub next_cursor: Option<String>,
}

pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Result of `fetch_bytes`: a byte stream plus whatever metadata the
/// source could report without buffering the whole file.
pub struct FetchedBytes {
    pub stream: ByteStream,
    pub size: i64,
    pub mtime: Option<DateTime<Utc>>,
}

/// Every concrete adapter this system knows how to ingest from. Selecting
/// a variant happens once, at construction from a `Channel`/`ImportSource`
/// configuration row; from then on `scan`/`fetch_bytes` simply match on
/// `self`.
pub enum Adapter {
    ChatFeed(ChatFeedAdapter),
    CloudDrive(CloudDriveAdapter),
    Forum(ForumAdapter),
    LocalFolder(LocalFolderAdapter),
    DirectUpload(DirectUploadAdapter),
}

impl Adapter {
    /// Two-phase scan entry point (spec.md §9 design note 3): collects a
    /// batch of raw items via external I/O only, in memory. The caller
    /// (Ingest Service) runs the database phase afterwards, one item at a
    /// time.
    pub async fn scan(&self, cursor: Option<&str>) -> Result<ScanResult> {
        match self {
            Adapter::ChatFeed(a) => a.scan(cursor).await,
            Adapter::CloudDrive(a) => a.scan(cursor).await,
            Adapter::Forum(a) => a.scan(cursor).await,
            Adapter::LocalFolder(a) => a.scan(cursor).await,
            Adapter::DirectUpload(a) => a.scan(cursor).await,
        }
    }

    pub async fn fetch_bytes(&self, item: &RawItem, file: &RawFileDescriptor) -> Result<FetchedBytes> {
        match self {
            Adapter::ChatFeed(a) => a.fetch_bytes(item, file).await,
            Adapter::CloudDrive(a) => a.fetch_bytes(item, file).await,
            Adapter::Forum(a) => a.fetch_bytes(item, file).await,
            Adapter::LocalFolder(a) => a.fetch_bytes(item, file).await,
            Adapter::DirectUpload(a) => a.fetch_bytes(item, file).await,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Adapter::ChatFeed(_) => "chat_feed",
            Adapter::CloudDrive(_) => "cloud_drive",
            Adapter::Forum(_) => "forum",
            Adapter::LocalFolder(_) => "local_folder",
            Adapter::DirectUpload(_) => "direct_upload",
        }
    }
}
