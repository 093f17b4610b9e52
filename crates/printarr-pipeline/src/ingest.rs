//! Ingest Service (spec.md §4.4): turns a batch of [`RawItem`]s from an
//! adapter into `Message`/`Attachment`/`Design` rows, runs multicolor and
//! auto-tag heuristics, raises duplicate candidates, and queues the
//! downstream job for whichever designs the channel's download mode says
//! should be fetched automatically.
//!
//! Scanning and ingesting are split on purpose (spec.md §9 design note 3):
//! `Adapter::scan` does all network I/O up front and returns a batch in
//! memory; `ingest_batch` then does all database I/O, one item at a time,
//! so a slow upstream call never holds a SQLite write lock and a slow
//! write never blocks on the network.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use printarr_core::catalog::{CatalogStore, EnqueueOptions};
use printarr_core::dedupe;
use printarr_core::domain::*;
use printarr_core::error::Result;
use printarr_core::events::{Broadcaster, EventType};
use printarr_core::{autotag, multicolor};

use crate::adapters::RawItem;

pub struct IngestService {
    store: CatalogStore,
    broadcaster: Broadcaster,
}

/// Outcome of ingesting a single `RawItem`, reported back to the caller
/// (a worker, or a test) so scan loops can log a useful summary.
#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    pub message_inserted: bool,
    pub design_id: Option<Id>,
    pub duplicate_candidates_raised: usize,
    pub download_queued: bool,
}

impl IngestService {
    pub fn new(store: CatalogStore, broadcaster: Broadcaster) -> Self {
        Self { store, broadcaster }
    }

    pub async fn ingest_batch(&self, channel: &Channel, items: Vec<RawItem>) -> Result<Vec<IngestOutcome>> {
        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            outcomes.push(self.ingest_item(channel, &item).await?);
        }
        Ok(outcomes)
    }

    pub async fn ingest_item(&self, channel: &Channel, item: &RawItem) -> Result<IngestOutcome> {
        let now = chrono::Utc::now();
        let message = Message {
            id: new_id(),
            channel_id: channel.id.clone(),
            upstream_id: item.upstream_id.clone(),
            timestamp: item.timestamp,
            author: item.author.clone(),
            caption: item.caption.clone(),
            has_media: !item.files.is_empty(),
            created_at: now,
        };

        let inserted = self.store.upsert_message(&message)?;
        if !inserted {
            debug!(channel_id = %channel.id, upstream_id = %item.upstream_id, "message already ingested, skipping");
            return Ok(IngestOutcome { message_inserted: false, ..Default::default() });
        }

        let stored_message = self
            .store
            .find_message(&channel.id, &item.upstream_id)?
            .unwrap_or(message);

        let mut attachments = Vec::with_capacity(item.files.len());
        for file in &item.files {
            let extension = std::path::Path::new(&file.filename)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase());
            let attachment = Attachment {
                id: new_id(),
                message_id: stored_message.id.clone(),
                media_kind: if file.is_candidate_model { MediaKind::Document } else { MediaKind::Other },
                filename: file.filename.clone(),
                mime: file.mime.clone(),
                size: file.size,
                extension,
                is_candidate_design_file: file.is_candidate_model,
                download_status: AttachmentDownloadStatus::NotDownloaded,
                local_path: None,
                sha256: None,
            };
            self.store.insert_attachment(&attachment)?;
            attachments.push(attachment);
        }

        let candidate_count = attachments.iter().filter(|a| a.is_candidate_design_file).count();
        let caption_signals_design = item.caption.as_deref().is_some_and(autotag::caption_indicates_design);
        if candidate_count == 0 && !caption_signals_design {
            debug!(message_id = %stored_message.id, "no candidate design files or caption signal, not creating a design");
            return Ok(IngestOutcome { message_inserted: true, ..Default::default() });
        }

        let design = self.create_design(channel, item, &attachments)?;
        self.store.link_design_source(&design.id, &channel.id, &stored_message.id)?;

        self.apply_multicolor_heuristic(&design, item, &attachments)?;
        self.apply_auto_tags(&design.id, item, &attachments)?;
        let duplicate_candidates_raised = self.raise_duplicate_candidates(&design)?;

        self.broadcaster.publish(
            EventType::DesignCreated,
            serde_json::json!({ "design_id": design.id, "channel_id": channel.id, "title": design.canonical_title }),
        );

        let download_queued = self.maybe_queue_download(channel, &design, item)?;

        Ok(IngestOutcome {
            message_inserted: true,
            design_id: Some(design.id),
            duplicate_candidates_raised,
            download_queued,
        })
    }

    fn create_design(&self, channel: &Channel, item: &RawItem, attachments: &[Attachment]) -> Result<Design> {
        let now = chrono::Utc::now();
        let title = item
            .title_hint
            .clone()
            .or_else(|| attachments.first().map(|a| a.filename.clone()))
            .unwrap_or_else(|| "Untitled design".to_string());
        let designer = item.designer_hint.clone().unwrap_or_else(|| "Unknown".to_string());
        let total_size: i64 = attachments.iter().map(|a| a.size).sum();
        let primary_file_type = attachments
            .iter()
            .find(|a| a.is_candidate_design_file)
            .and_then(|a| a.extension_lower());

        let design = Design {
            id: new_id(),
            canonical_title: title,
            canonical_designer: designer,
            title_override: None,
            designer_override: None,
            multicolor_status: MulticolorStatus::Unknown,
            multicolor_source: MulticolorSource::Heuristic,
            status: DesignStatus::Discovered,
            primary_file_type,
            total_size,
            metadata_authority: if item.caption.is_some() { MetadataAuthority::Caption } else { MetadataAuthority::Profile },
            import_source_id: channel.import_source_id.clone(),
            family_id: None,
            variant_name: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_design(&design)?;
        Ok(design)
    }

    fn apply_multicolor_heuristic(&self, design: &Design, item: &RawItem, attachments: &[Attachment]) -> Result<()> {
        let filenames: Vec<String> = attachments.iter().map(|a| a.filename.clone()).collect();
        let is_multicolor = multicolor::detect_from_caption_and_files(item.caption.as_deref(), &filenames);
        if is_multicolor {
            self.store.set_multicolor(
                &design.id,
                MulticolorStatus::Multi,
                MulticolorSource::Heuristic,
            )?;
        }
        Ok(())
    }

    fn apply_auto_tags(&self, design_id: &str, item: &RawItem, attachments: &[Attachment]) -> Result<()> {
        let mut tags = Vec::new();
        if let Some(caption) = &item.caption {
            tags.extend(autotag::extract_from_caption(caption));
        }
        for attachment in attachments {
            tags.extend(autotag::extract_from_filename(&attachment.filename));
        }
        for tag in tags {
            let tag_id = self.store.get_or_create_tag(&tag.name, None)?;
            self.store.link_design_tag(design_id, &tag_id, tag.source)?;
        }
        Ok(())
    }

    fn raise_duplicate_candidates(&self, design: &Design) -> Result<usize> {
        let mut raised = 0;

        let existing = self.store.list_designs_title_designer()?;
        let existing_filtered: Vec<(String, String, String)> =
            existing.into_iter().filter(|(id, _, _)| id != &design.id).collect();
        for candidate in dedupe::find_title_designer_candidates(
            &design.canonical_title,
            &design.canonical_designer,
            &existing_filtered,
        ) {
            if self.raise_one_candidate(&design.id, &candidate)? {
                raised += 1;
            }
        }

        let own_files: Vec<(String, i64)> = self
            .store
            .list_design_files(&design.id)?
            .into_iter()
            .map(|f| (f.filename, f.size))
            .collect();
        if !own_files.is_empty() {
            let existing_files: Vec<(String, String, i64)> = self
                .store
                .list_all_file_name_sizes()?
                .into_iter()
                .filter(|(id, _, _)| id != &design.id)
                .collect();
            for candidate in dedupe::find_filename_size_candidates(&own_files, &existing_files) {
                if self.raise_one_candidate(&design.id, &candidate)? {
                    raised += 1;
                }
            }
        }

        Ok(raised)
    }

    fn raise_one_candidate(&self, design_id: &str, candidate: &dedupe::CandidatePair) -> Result<bool> {
        if self.store.has_pending_candidate(design_id, &candidate.other_design_id, candidate.match_type)? {
            return Ok(false);
        }
        self.store.insert_duplicate_candidate(design_id, &candidate.other_design_id, candidate.match_type)?;
        Ok(true)
    }

    fn maybe_queue_download(&self, channel: &Channel, design: &Design, item: &RawItem) -> Result<bool> {
        let should_queue = match channel.download_mode {
            DownloadMode::DownloadAll => true,
            DownloadMode::DownloadAllNew => channel
                .download_mode_enabled_at
                .is_none_or(|enabled_at| item.timestamp >= enabled_at),
            DownloadMode::Manual => false,
        };
        if !should_queue {
            return Ok(false);
        }

        let payload = serde_json::json!({ "design_id": design.id }).to_string();
        self.store.enqueue(
            JobKind::DownloadDesign,
            Some(payload),
            EnqueueOptions {
                design_id: Some(design.id.clone()),
                channel_id: Some(channel.id.clone()),
                priority: AUTO_QUEUE_PRIORITY,
                display_name: Some(design.canonical_title.clone()),
                ..Default::default()
            },
        )?;
        info!(design_id = %design.id, channel_id = %channel.id, "queued download for newly ingested design");
        Ok(true)
    }
}

/// A set of upstream ids a channel has already ingested, used by adapters
/// that cannot rely on a server-side cursor (e.g. a forum thread that
/// might be edited out of order).
pub fn seen_upstream_ids(messages: &[Message]) -> HashSet<String> {
    messages.iter().map(|m| m.upstream_id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RawFileDescriptor;

    fn sample_channel() -> Channel {
        let now = chrono::Utc::now();
        Channel {
            id: new_id(),
            upstream_id: Some("123".into()),
            title: "Test Channel".into(),
            enabled: true,
            backfill_mode: BackfillMode::AllHistory,
            backfill_value: None,
            download_mode: DownloadMode::DownloadAll,
            download_mode_enabled_at: None,
            sync_cursor: None,
            import_source_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_item() -> RawItem {
        RawItem {
            upstream_id: "1".into(),
            timestamp: chrono::Utc::now(),
            author: Some("Alice".into()),
            title_hint: Some("Dragon Bust".into()),
            designer_hint: Some("Alice".into()),
            caption: Some("multi-color dragon #fantasy".into()),
            files: vec![RawFileDescriptor {
                filename: "dragon.3mf".into(),
                size: 2048,
                mime: None,
                is_candidate_model: true,
            }],
            previews: vec![],
            folder_path: None,
        }
    }

    #[tokio::test]
    async fn ingesting_new_item_creates_design_and_queues_download() {
        let store = CatalogStore::open_in_memory().unwrap();
        let broadcaster = Broadcaster::new();
        let service = IngestService::new(store.clone(), broadcaster);
        let channel = sample_channel();
        store.upsert_channel(&channel).unwrap();

        let outcome = service.ingest_item(&channel, &sample_item()).await.unwrap();
        assert!(outcome.message_inserted);
        assert!(outcome.design_id.is_some());
        assert!(outcome.download_queued);

        let design = store.get_design(outcome.design_id.as_ref().unwrap()).unwrap().unwrap();
        assert_eq!(design.multicolor_status, MulticolorStatus::Multi);
    }

    #[tokio::test]
    async fn re_ingesting_same_upstream_id_is_a_no_op() {
        let store = CatalogStore::open_in_memory().unwrap();
        let broadcaster = Broadcaster::new();
        let service = IngestService::new(store.clone(), broadcaster);
        let channel = sample_channel();
        store.upsert_channel(&channel).unwrap();

        let item = sample_item();
        let first = service.ingest_item(&channel, &item).await.unwrap();
        let second = service.ingest_item(&channel, &item).await.unwrap();

        assert!(first.message_inserted);
        assert!(!second.message_inserted);
    }

    #[tokio::test]
    async fn caption_only_signal_still_creates_a_design() {
        let store = CatalogStore::open_in_memory().unwrap();
        let broadcaster = Broadcaster::new();
        let service = IngestService::new(store.clone(), broadcaster);
        let channel = sample_channel();
        store.upsert_channel(&channel).unwrap();

        let mut item = sample_item();
        item.files.clear();
        item.caption = Some("new release, grab dragon.stl from the link".into());

        let outcome = service.ingest_item(&channel, &item).await.unwrap();
        assert!(outcome.design_id.is_some());
    }

    #[tokio::test]
    async fn manual_download_mode_does_not_auto_queue() {
        let store = CatalogStore::open_in_memory().unwrap();
        let broadcaster = Broadcaster::new();
        let service = IngestService::new(store.clone(), broadcaster);
        let mut channel = sample_channel();
        channel.download_mode = DownloadMode::Manual;
        store.upsert_channel(&channel).unwrap();

        let outcome = service.ingest_item(&channel, &sample_item()).await.unwrap();
        assert!(!outcome.download_queued);
    }
}
