//! Preview Service orchestration (spec.md §4.6). The database primitives
//! (`insert_preview_asset`, `recompute_primary_preview`, ...) live in
//! `printarr-core::catalog::previews`; this module is the pipeline-side
//! trigger that decides when a render needs to be queued at all.

use tracing::debug;

use printarr_core::catalog::{CatalogStore, EnqueueOptions, SettingsService};
use printarr_core::domain::{new_id, Id, JobKind, PreviewAsset, PreviewSource, AUTO_QUEUE_PRIORITY};
use printarr_core::error::Result;

const AUTO_QUEUE_RENDER_SETTING: &str = "auto_queue_render_after_import";

/// After a design gains a new file (import, extraction), checks whether
/// it still has zero previews and, if `auto_queue_render_after_import` is
/// enabled, queues a `GenerateRender` job.
pub async fn maybe_queue_render(store: &CatalogStore, settings: &SettingsService, design_id: &str) -> Result<bool> {
    if !store.list_previews_for_design(design_id)?.is_empty() {
        return Ok(false);
    }

    let auto_queue = settings
        .get(AUTO_QUEUE_RENDER_SETTING)?
        .as_bool()
        .unwrap_or(false);
    if !auto_queue {
        debug!(design_id, "no previews yet but auto-queue-render is disabled");
        return Ok(false);
    }

    store.enqueue(
        JobKind::GenerateRender,
        None,
        EnqueueOptions {
            design_id: Some(design_id.to_string()),
            priority: AUTO_QUEUE_PRIORITY,
            ..Default::default()
        },
    )?;
    Ok(true)
}

/// Registers a preview extracted from inside a downloaded archive and
/// recomputes which preview is primary for the design (spec.md §4.6's
/// priority list: ai-selected > extracted-from-archive > rendered >
/// ingested > uploaded).
pub fn register_extracted_preview(
    store: &CatalogStore,
    design_id: &str,
    file_path: &str,
    width: Option<i32>,
    height: Option<i32>,
    sort_order: i32,
) -> Result<Id> {
    let preview = PreviewAsset {
        id: new_id(),
        design_id: design_id.to_string(),
        source: PreviewSource::ExtractedFromArchive,
        file_path: file_path.to_string(),
        width,
        height,
        is_primary: false,
        sort_order,
        ai_selected: false,
    };
    store.insert_preview_asset(&preview)?;
    store.recompute_primary_preview(design_id)?;
    Ok(preview.id)
}

/// Registers a rendered preview produced by a `GenerateRender` job.
pub fn register_rendered_preview(store: &CatalogStore, design_id: &str, file_path: &str) -> Result<Id> {
    let preview = PreviewAsset {
        id: new_id(),
        design_id: design_id.to_string(),
        source: PreviewSource::Rendered,
        file_path: file_path.to_string(),
        width: None,
        height: None,
        is_primary: false,
        sort_order: 0,
        ai_selected: false,
    };
    store.insert_preview_asset(&preview)?;
    store.recompute_primary_preview(design_id)?;
    Ok(preview.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use printarr_core::events::Broadcaster;

    #[tokio::test]
    async fn queues_render_when_no_previews_and_setting_enabled() {
        let store = CatalogStore::open_in_memory().unwrap();
        let settings = SettingsService::new(store.clone(), Broadcaster::new());
        settings.put(AUTO_QUEUE_RENDER_SETTING, serde_json::json!(true)).unwrap();

        let design_id = new_id();
        let queued = maybe_queue_render(&store, &settings, &design_id).await.unwrap();
        assert!(queued);
    }

    #[tokio::test]
    async fn does_not_queue_when_setting_disabled() {
        let store = CatalogStore::open_in_memory().unwrap();
        let settings = SettingsService::new(store.clone(), Broadcaster::new());
        settings.put(AUTO_QUEUE_RENDER_SETTING, serde_json::json!(false)).unwrap();

        let design_id = new_id();
        let queued = maybe_queue_render(&store, &settings, &design_id).await.unwrap();
        assert!(!queued);
    }
}
