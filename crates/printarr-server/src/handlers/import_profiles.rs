//! Import profile CRUD (spec.md §6). Profiles are identified by name in
//! requests; built-in profiles are seeded at startup and cannot be created
//! through this surface.

use axum::extract::{Path, State};
use axum::Json;

use printarr_core::domain::new_id;
use printarr_core::error::PrintarrError;
use printarr_core::import_profile::ImportProfile;

use crate::error::{ApiError, ApiResult};
use crate::server::SharedState;

pub async fn list(State(state): State<SharedState>) -> ApiResult<Json<Vec<ImportProfile>>> {
    Ok(Json(state.store.list_import_profiles()?))
}

pub async fn get(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<Json<ImportProfile>> {
    state
        .store
        .get_import_profile(&id)?
        .map(Json)
        .ok_or_else(|| ApiError(PrintarrError::NotFound { resource: "import_profile".to_string(), id }))
}

pub async fn create(State(state): State<SharedState>, Json(mut profile): Json<ImportProfile>) -> ApiResult<Json<ImportProfile>> {
    if profile.is_builtin {
        return Err(ApiError(PrintarrError::Validation {
            field: "is_builtin".to_string(),
            message: "built-in profiles cannot be created through the API".to_string(),
        }));
    }
    profile.validate()?;
    profile.id = new_id();
    state.store.insert_import_profile(&profile)?;
    Ok(Json(profile))
}
