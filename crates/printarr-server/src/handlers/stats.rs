//! Dashboard and storage stats (spec.md §6), rolled up from the counts the
//! catalog already tracks rather than scanning the filesystem at request
//! time.

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::error::ApiResult;
use crate::server::SharedState;

pub async fn dashboard(State(state): State<SharedState>) -> ApiResult<Json<serde_json::Value>> {
    let by_status: Vec<(String, i64)> = state
        .store
        .count_designs_by_status()?
        .into_iter()
        .map(|(status, count)| (format!("{status:?}"), count))
        .collect();
    let retry = state.store.retry_stats()?;
    let queue = state.store.list_queue(&printarr_core::catalog::Page { page: 1, page_size: 1 })?;

    Ok(Json(json!({
        "designs_by_status": by_status,
        "queue_depth": queue.total,
        "retry": retry,
    })))
}

pub async fn storage(State(state): State<SharedState>) -> ApiResult<Json<serde_json::Value>> {
    let total_bytes = state.store.total_library_size()?;
    Ok(Json(json!({ "total_library_bytes": total_bytes })))
}
