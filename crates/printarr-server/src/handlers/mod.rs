pub mod channels;
pub mod designs;
pub mod events;
pub mod external_metadata;
pub mod families;
pub mod health;
pub mod import_profiles;
pub mod import_sources;
pub mod jobs;
pub mod settings;
pub mod stats;
pub mod tags;
pub mod uploads;

use serde::Deserialize;

use printarr_core::catalog::Page;

/// Maximum rows a single page may request, regardless of what the caller
/// asks for (spec.md §6: pagination via `page`+`page_size` with maxima).
const MAX_PAGE_SIZE: u32 = 200;
const DEFAULT_PAGE_SIZE: u32 = 25;

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl PageParams {
    pub fn into_page(self) -> Page {
        Page {
            page: self.page.unwrap_or(1).max(1),
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }
}
