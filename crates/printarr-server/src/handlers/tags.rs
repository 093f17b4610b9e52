//! Tag listing (spec.md §3).

use axum::extract::State;
use axum::Json;

use printarr_core::domain::Tag;

use crate::error::ApiResult;
use crate::server::SharedState;

pub async fn list(State(state): State<SharedState>) -> ApiResult<Json<Vec<Tag>>> {
    Ok(Json(state.store.list_all_tags()?))
}
