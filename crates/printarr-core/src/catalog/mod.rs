//! Catalog: the SQLite-backed store of record for every entity in
//! spec.md §3, plus the Job Queue (§4.2) built on top of the same
//! connection.

mod attachments;
mod channels;
mod count_cache;
mod designs;
mod discovered_channels;
mod families;
mod import_sources;
mod jobs;
mod merge;
mod previews;
mod schema;
mod search;
mod settings_service;
mod store;
mod tags;

pub use count_cache::CountCache;
pub use designs::DesignFilter;
pub use jobs::EnqueueOptions;
pub use settings_service::SettingsService;
pub use store::{CatalogStore, PagedResult, Page};
