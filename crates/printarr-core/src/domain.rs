//! Entities and enums from the data model: channels, messages, attachments,
//! designs, jobs, tags, import sources, duplicate candidates, families and
//! preview assets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A 36-char UUID string, used for every primary key in the catalog.
pub type Id = String;

pub fn new_id() -> Id {
    uuid::Uuid::new_v4().to_string()
}

// --- Channel ----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackfillMode {
    AllHistory,
    LastNMessages,
    LastNDays,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadMode {
    DownloadAll,
    DownloadAllNew,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Id,
    /// Nullable: absent for a virtual channel backing an import source.
    pub upstream_id: Option<String>,
    pub title: String,
    pub enabled: bool,
    pub backfill_mode: BackfillMode,
    pub backfill_value: Option<i64>,
    pub download_mode: DownloadMode,
    /// The instant `download_mode` first became non-manual.
    pub download_mode_enabled_at: Option<DateTime<Utc>>,
    /// Highest upstream message id processed, used as the incremental
    /// sync cursor.
    pub sync_cursor: Option<String>,
    /// Set when this channel is the virtual channel for an import source.
    pub import_source_id: Option<Id>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A chat channel the bot account can see but that has not been onboarded
/// as a `Channel` yet (spec.md §2 supplemented feature). Purely a read
/// path for UI bootstrap — onboarding itself still goes through the
/// ordinary channel-create flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredChannel {
    pub id: Id,
    pub upstream_id: String,
    pub title: String,
    pub member_count: Option<i64>,
    pub discovered_at: DateTime<Utc>,
}

// --- Message / Attachment ----------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Id,
    pub channel_id: Id,
    pub upstream_id: String,
    pub timestamp: DateTime<Utc>,
    pub author: Option<String>,
    pub caption: Option<String>,
    pub has_media: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaKind {
    Document,
    Photo,
    Video,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttachmentDownloadStatus {
    NotDownloaded,
    Downloading,
    Downloaded,
    Failed,
}

/// Extensions that mark an attachment as a candidate design file.
pub const CANDIDATE_DESIGN_EXTENSIONS: &[&str] =
    &["stl", "3mf", "obj", "step", "stp", "zip", "rar", "7z"];

pub fn is_candidate_design_extension(extension: &str) -> bool {
    CANDIDATE_DESIGN_EXTENSIONS
        .iter()
        .any(|ext| ext.eq_ignore_ascii_case(extension))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Id,
    pub message_id: Id,
    pub media_kind: MediaKind,
    pub filename: String,
    pub mime: Option<String>,
    pub size: i64,
    pub extension: Option<String>,
    pub is_candidate_design_file: bool,
    pub download_status: AttachmentDownloadStatus,
    pub local_path: Option<String>,
    pub sha256: Option<String>,
}

impl Attachment {
    pub fn extension_lower(&self) -> Option<String> {
        self.extension.as_ref().map(|e| e.to_ascii_lowercase())
    }
}

// --- Design --------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DesignStatus {
    Discovered,
    Wanted,
    Downloading,
    Downloaded,
    Organized,
    /// Terminal cross-cut used by merge; not reachable by forward
    /// transition from any other status.
    Deleted,
}

impl DesignStatus {
    /// True if `next` is a legal forward transition from `self`, or a
    /// transition to `Deleted` (always legal, used by merge).
    pub fn can_transition_to(self, next: DesignStatus) -> bool {
        if next == DesignStatus::Deleted {
            return true;
        }
        // spec.md §8 boundary behaviour: canceling an in-flight download
        // reverts the design to WANTED rather than leaving it stuck at
        // DOWNLOADING. The only permitted backward transition.
        if self == DesignStatus::Downloading && next == DesignStatus::Wanted {
            return true;
        }
        use DesignStatus::*;
        let order = [Discovered, Wanted, Downloading, Downloaded, Organized];
        let Some(from) = order.iter().position(|s| *s == self) else {
            return false;
        };
        let Some(to) = order.iter().position(|s| *s == next) else {
            return false;
        };
        to >= from
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MulticolorStatus {
    Unknown,
    Single,
    Multi,
}

/// Precedence source for `multicolor_status`, per the Open Question
/// resolved in SPEC_FULL.md §4: USER_OVERRIDE > 3MF_ANALYSIS > HEURISTIC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MulticolorSource {
    Heuristic,
    ThreeMfAnalysis,
    UserOverride,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Design {
    pub id: Id,
    pub canonical_title: String,
    pub canonical_designer: String,
    pub title_override: Option<String>,
    pub designer_override: Option<String>,
    pub multicolor_status: MulticolorStatus,
    pub multicolor_source: MulticolorSource,
    pub status: DesignStatus,
    /// Summary of the primary file-type present, e.g. "3MF", "STL".
    pub primary_file_type: Option<String>,
    pub total_size: i64,
    /// Where canonical_title/canonical_designer came from last.
    pub metadata_authority: MetadataAuthority,
    pub import_source_id: Option<Id>,
    pub family_id: Option<Id>,
    pub variant_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetadataAuthority {
    Profile,
    Caption,
    ExternalMetadata,
    User,
}

/// Many-to-one link from a Design to the Message(s) that contributed to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignSource {
    pub id: Id,
    pub design_id: Id,
    pub channel_id: Id,
    pub message_id: Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileKind {
    Model,
    Archive,
    Image,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelKind {
    Stl,
    ThreeMf,
    Obj,
    Step,
    Unknown,
}

impl ModelKind {
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "stl" => ModelKind::Stl,
            "3mf" => ModelKind::ThreeMf,
            "obj" => ModelKind::Obj,
            "step" | "stp" => ModelKind::Step,
            _ => ModelKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignFile {
    pub id: Id,
    pub design_id: Id,
    pub relative_path: String,
    pub filename: String,
    pub extension: Option<String>,
    pub size: i64,
    pub sha256: Option<String>,
    pub file_kind: FileKind,
    pub model_kind: Option<ModelKind>,
    pub is_from_archive: bool,
    /// Set when this file was extracted from another `DesignFile` that was
    /// itself an archive, to model one level of nested extraction.
    pub parent_archive_id: Option<Id>,
    pub is_primary: bool,
}

// --- Job -------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    BackfillChannel,
    SyncChannelLive,
    DownloadDesign,
    ExtractArchive,
    ImportToLibrary,
    Analyze3mf,
    GenerateRender,
    DedupeReconcile,
    DownloadImportRecord,
    AiAnalyzeDesign,
    DetectFamilyOverlap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    Failed,
    Canceled,
}

/// Default `max_attempts` for a newly enqueued job (1 initial + 3 retries).
pub const DEFAULT_MAX_ATTEMPTS: i32 = 4;

/// Priority used for downloads auto-queued by the ingest service.
pub const AUTO_QUEUE_PRIORITY: i32 = 5;

/// Default priority for user-triggered work.
pub const USER_TRIGGERED_PRIORITY: i32 = 0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Id,
    pub kind: JobKind,
    pub status: JobStatus,
    pub priority: i32,
    pub design_id: Option<Id>,
    pub channel_id: Option<Id>,
    pub payload_json: Option<String>,
    pub result_json: Option<String>,
    pub progress_current: Option<i64>,
    pub progress_total: Option<i64>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn progress_percent(&self) -> Option<f64> {
        match (self.progress_current, self.progress_total) {
            (Some(current), Some(total)) if total > 0 => {
                Some(current as f64 / total as f64 * 100.0)
            }
            _ => None,
        }
    }
}

// --- Tags ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TagSource {
    User,
    Manual,
    AutomaticCaption,
    AutomaticFilename,
    AutomaticExternal,
    Ai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: Id,
    /// Lowercase, unique.
    pub name: String,
    pub category: Option<String>,
    pub is_predefined: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignTag {
    pub design_id: Id,
    pub tag_id: Id,
    pub source: TagSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyTag {
    pub family_id: Id,
    pub tag_id: Id,
    pub source: TagSource,
}

// --- Import sources ----------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSource {
    pub id: Id,
    pub name: String,
    pub profile_id: Option<Id>,
    pub designer_default: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSourceFolder {
    pub id: Id,
    pub import_source_id: Id,
    pub path: String,
    pub profile_id: Option<Id>,
    pub designer_override: Option<String>,
    pub tag_defaults: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportRecordStatus {
    Pending,
    Imported,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRecord {
    pub id: Id,
    pub folder_id: Id,
    pub source_path: String,
    pub status: ImportRecordStatus,
    pub design_id: Option<Id>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

// --- Duplicate candidates -------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    Hash,
    ExternalId,
    TitleDesigner,
    FilenameSize,
}

impl MatchType {
    /// `confidence` is a fixed function of `match_type` (spec.md §3).
    pub fn confidence(self) -> f64 {
        match self {
            MatchType::Hash => 1.0,
            MatchType::ExternalId => 1.0,
            MatchType::TitleDesigner => 0.7,
            MatchType::FilenameSize => 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DuplicateCandidateStatus {
    Pending,
    Merged,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    pub id: Id,
    pub design_id: Id,
    pub candidate_design_id: Id,
    pub match_type: MatchType,
    pub confidence: f64,
    pub status: DuplicateCandidateStatus,
    pub created_at: DateTime<Utc>,
}

// --- Family ----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FamilyDetectionMethod {
    NamePattern,
    FileHashOverlap,
    AiDetected,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignFamily {
    pub id: Id,
    pub name: String,
    pub detection_method: FamilyDetectionMethod,
    pub detection_confidence: f64,
    pub created_at: DateTime<Utc>,
}

// --- Preview -----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreviewSource {
    TelegramIngested,
    ExtractedFromArchive,
    Rendered,
    UserUploaded,
}

impl PreviewSource {
    /// Base priority tier, lower is preferred; combined with `ai_selected`
    /// by `PreviewAsset::priority_rank`.
    fn tier(self) -> u8 {
        match self {
            PreviewSource::ExtractedFromArchive => 1,
            PreviewSource::Rendered => 2,
            PreviewSource::TelegramIngested => 3,
            PreviewSource::UserUploaded => 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewAsset {
    pub id: Id,
    pub design_id: Id,
    pub source: PreviewSource,
    pub file_path: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub is_primary: bool,
    pub sort_order: i32,
    /// AI selection overrides every source tier (§4.6 priority list:
    /// AI-selected > embedded-in-3D-archive > rendered > ingested > uploaded).
    pub ai_selected: bool,
}

impl PreviewAsset {
    /// Lower is preferred. AI-selected previews always outrank any other.
    pub fn priority_rank(&self) -> u8 {
        if self.ai_selected {
            0
        } else {
            self.source.tier()
        }
    }
}

// --- Settings ----------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value_json: String,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn design_status_forward_transitions_only() {
        assert!(DesignStatus::Discovered.can_transition_to(DesignStatus::Wanted));
        assert!(DesignStatus::Discovered.can_transition_to(DesignStatus::Organized));
        assert!(!DesignStatus::Organized.can_transition_to(DesignStatus::Discovered));
        assert!(DesignStatus::Organized.can_transition_to(DesignStatus::Organized));
    }

    #[test]
    fn downloading_can_revert_to_wanted_on_cancel() {
        assert!(DesignStatus::Downloading.can_transition_to(DesignStatus::Wanted));
        assert!(!DesignStatus::Downloaded.can_transition_to(DesignStatus::Wanted));
        assert!(!DesignStatus::Organized.can_transition_to(DesignStatus::Wanted));
    }

    #[test]
    fn deleted_is_reachable_from_any_status() {
        for status in [
            DesignStatus::Discovered,
            DesignStatus::Wanted,
            DesignStatus::Downloading,
            DesignStatus::Downloaded,
            DesignStatus::Organized,
        ] {
            assert!(status.can_transition_to(DesignStatus::Deleted));
        }
    }

    #[test]
    fn match_type_confidence_is_fixed() {
        assert_eq!(MatchType::Hash.confidence(), 1.0);
        assert_eq!(MatchType::ExternalId.confidence(), 1.0);
        assert_eq!(MatchType::TitleDesigner.confidence(), 0.7);
        assert_eq!(MatchType::FilenameSize.confidence(), 0.5);
    }

    #[test]
    fn candidate_extension_matching_is_case_insensitive() {
        assert!(is_candidate_design_extension("STL"));
        assert!(is_candidate_design_extension("3mf"));
        assert!(!is_candidate_design_extension("png"));
    }

    #[test]
    fn ai_selected_preview_outranks_every_source() {
        let mut p = PreviewAsset {
            id: new_id(),
            design_id: new_id(),
            source: PreviewSource::UserUploaded,
            file_path: "x.png".into(),
            width: None,
            height: None,
            is_primary: false,
            sort_order: 0,
            ai_selected: false,
        };
        assert_eq!(p.priority_rank(), 4);
        p.ai_selected = true;
        assert_eq!(p.priority_rank(), 0);
    }
}
