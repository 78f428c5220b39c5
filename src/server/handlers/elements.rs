//! Element add / patch / delete handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::Value;
use std::sync::Arc;

use super::{ApiError, api_error};
use crate::server::state::AppState;
use crate::template::Element;

/// Handle POST /api/elements - append an element.
pub async fn add(
    State(state): State<Arc<AppState>>,
    Json(element): Json<Element>,
) -> Result<(StatusCode, Json<Element>), ApiError> {
    let added = state
        .mutate(|s| {
            s.add_element(element.clone())?;
            Ok(element)
        })
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(added)))
}

/// Handle PATCH /api/elements/:id - merge fields into an element.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> Result<Json<Element>, ApiError> {
    let updated = state
        .mutate(|s| {
            s.update_element(&id, &patch)?;
            // the patch may have renamed the element
            let new_id = patch.get("id").and_then(Value::as_str).unwrap_or(&id);
            Ok(s.template().element(new_id).cloned())
        })
        .await
        .map_err(api_error)?;
    updated
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("element '{}' not found", id)))
}

/// Handle DELETE /api/elements/:id.
pub async fn delete(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state
        .mutate(|s| s.delete_element(&id))
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}
