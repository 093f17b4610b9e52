//! External metadata lookup (spec.md §4.11 AI/metadata enrichment): no
//! provider is wired into this build, so this endpoint reports that
//! honestly instead of pretending to search anything.

use axum::extract::Query;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[allow(dead_code)]
    pub q: Option<String>,
}

pub async fn search(Query(_params): Query<SearchQuery>) -> Json<serde_json::Value> {
    Json(json!({
        "results": [],
        "provider_configured": false,
        "message": "no external metadata provider is configured for this deployment",
    }))
}
