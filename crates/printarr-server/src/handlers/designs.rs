//! Design listing, detail, title/designer overrides and merge (spec.md §5).

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use printarr_core::catalog::DesignFilter;
use printarr_core::domain::{Design, DesignStatus, Id};
use printarr_core::error::PrintarrError;

use super::PageParams;
use crate::error::{ApiError, ApiResult};
use crate::server::SharedState;

#[derive(Debug, Deserialize)]
pub struct ListDesignsQuery {
    #[serde(flatten)]
    pub page: PageParams,
    pub status: Option<DesignStatus>,
    pub channel_id: Option<String>,
    pub family_id: Option<String>,
    pub search: Option<String>,
}

pub async fn list(
    State(state): State<SharedState>,
    Query(query): Query<ListDesignsQuery>,
) -> ApiResult<Json<printarr_core::catalog::PagedResult<Design>>> {
    let filter = DesignFilter {
        status: query.status,
        channel_id: query.channel_id,
        family_id: query.family_id,
        search: query.search,
    };
    let page = query.page.into_page();
    Ok(Json(state.store.list_designs(&filter, &page)?))
}

pub async fn get(State(state): State<SharedState>, Path(id): Path<Id>) -> ApiResult<Json<Design>> {
    state
        .store
        .get_design(&id)?
        .map(Json)
        .ok_or_else(|| ApiError(PrintarrError::NotFound { resource: "design".to_string(), id }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateOverridesRequest {
    pub title_override: Option<String>,
    pub designer_override: Option<String>,
}

pub async fn update_overrides(
    State(state): State<SharedState>,
    Path(id): Path<Id>,
    Json(req): Json<UpdateOverridesRequest>,
) -> ApiResult<Json<Design>> {
    state
        .store
        .update_design_overrides(&id, req.title_override.as_deref(), req.designer_override.as_deref())?;
    let design = state
        .store
        .get_design(&id)?
        .ok_or_else(|| ApiError(PrintarrError::NotFound { resource: "design".to_string(), id }))?;
    Ok(Json(design))
}

pub async fn merge(
    State(state): State<SharedState>,
    Path((survivor_id, loser_id)): Path<(Id, Id)>,
) -> ApiResult<()> {
    state.store.merge_designs(&survivor_id, &loser_id)?;
    Ok(())
}
