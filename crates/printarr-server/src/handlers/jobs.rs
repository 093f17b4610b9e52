//! Job queue and activity feed, plus the manual controls spec.md §6 names:
//! cancel, retry, reprioritize.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use printarr_core::catalog::PagedResult;
use printarr_core::domain::{Id, Job};

use super::PageParams;
use crate::error::ApiResult;
use crate::server::SharedState;

pub async fn list_queue(
    State(state): State<SharedState>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<PagedResult<Job>>> {
    Ok(Json(state.store.list_queue(&params.into_page())?))
}

pub async fn list_activity(
    State(state): State<SharedState>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<PagedResult<Job>>> {
    Ok(Json(state.store.list_activity(&params.into_page())?))
}

pub async fn cancel(State(state): State<SharedState>, Path(id): Path<Id>) -> ApiResult<()> {
    state.store.cancel(&id)?;
    Ok(())
}

pub async fn retry(State(state): State<SharedState>, Path(id): Path<Id>) -> ApiResult<()> {
    state.store.manual_retry(&id)?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct SetPriorityRequest {
    pub priority: i32,
}

pub async fn set_priority(
    State(state): State<SharedState>,
    Path(id): Path<Id>,
    Json(req): Json<SetPriorityRequest>,
) -> ApiResult<()> {
    state.store.update_job_priority(&id, req.priority)?;
    Ok(())
}
