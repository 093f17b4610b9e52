//! Design family listing, membership and manual assignment (spec.md §4.8).

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use printarr_core::domain::{Design, DesignFamily, Id};

use crate::error::ApiResult;
use crate::server::SharedState;

pub async fn list(State(state): State<SharedState>) -> ApiResult<Json<Vec<DesignFamily>>> {
    Ok(Json(state.store.list_families()?))
}

pub async fn members(State(state): State<SharedState>, Path(id): Path<Id>) -> ApiResult<Json<Vec<Design>>> {
    Ok(Json(state.store.list_family_members(&id)?))
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub variant_name: Option<String>,
}

pub async fn assign(
    State(state): State<SharedState>,
    Path((family_id, design_id)): Path<(Id, Id)>,
    Json(req): Json<AssignRequest>,
) -> ApiResult<()> {
    state.store.assign_design_to_family(&design_id, &family_id, req.variant_name.as_deref())?;
    Ok(())
}

pub async fn detach(State(state): State<SharedState>, Path(design_id): Path<Id>) -> ApiResult<()> {
    state.store.detach_design_from_family(&design_id)?;
    Ok(())
}
