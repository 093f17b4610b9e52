//! Health endpoints: a cheap liveness probe and a detailed subsystem
//! report (spec.md §6: "health (basic + detailed subsystems)").

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::error::ApiResult;
use crate::server::SharedState;

pub async fn basic() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn detailed(State(state): State<SharedState>) -> ApiResult<Json<serde_json::Value>> {
    let retry_stats = state.store.retry_stats()?;
    let queue = state.store.list_queue(&printarr_core::catalog::Page { page: 1, page_size: 1 })?;

    Ok(Json(json!({
        "status": "ok",
        "database": "ok",
        "queue_depth": queue.total,
        "subscriber_count": state.broadcaster.subscriber_count(),
        "retry": retry_stats,
    })))
}
