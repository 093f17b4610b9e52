//! Settings read/write and the schema listing (spec.md §4.10, §6).
//!
//! `SettingSchemaEntry` doesn't derive `Serialize` (it carries a
//! `&'static str` description alongside a `serde_json::Value` default,
//! not worth a custom impl for internal-only use) so `schema` builds its
//! own DTO here rather than serializing `SCHEMA` directly.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use printarr_core::settings::SCHEMA;

use crate::error::ApiResult;
use crate::server::SharedState;

pub async fn get_all(State(state): State<SharedState>) -> ApiResult<Json<std::collections::HashMap<String, Value>>> {
    Ok(Json(state.settings.get_all()?))
}

pub async fn get_one(State(state): State<SharedState>, Path(key): Path<String>) -> ApiResult<Json<Value>> {
    Ok(Json(state.settings.get(&key)?))
}

pub async fn put_one(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    Json(value): Json<Value>,
) -> ApiResult<()> {
    state.settings.put(&key, value)?;
    Ok(())
}

pub async fn delete_one(State(state): State<SharedState>, Path(key): Path<String>) -> ApiResult<()> {
    state.settings.delete(&key)?;
    Ok(())
}

pub async fn reset(State(state): State<SharedState>) -> ApiResult<Json<std::collections::HashMap<String, Value>>> {
    Ok(Json(state.settings.reset_to_defaults()?))
}

#[derive(Serialize)]
pub struct SchemaEntryDto {
    pub key: &'static str,
    pub value_type: &'static str,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub description: &'static str,
    pub default: Value,
    pub restart_required: bool,
}

pub async fn schema() -> Json<Vec<SchemaEntryDto>> {
    let entries = SCHEMA
        .iter()
        .map(|e| SchemaEntryDto {
            key: e.key,
            value_type: match e.value_type {
                printarr_core::settings::SettingValueType::Integer => "integer",
                printarr_core::settings::SettingValueType::Float => "float",
                printarr_core::settings::SettingValueType::Boolean => "boolean",
                printarr_core::settings::SettingValueType::String => "string",
            },
            min: e.min,
            max: e.max,
            description: e.description,
            default: e.default.clone(),
            restart_required: e.restart_required,
        })
        .collect();
    Json(entries)
}
