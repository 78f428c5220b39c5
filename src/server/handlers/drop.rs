//! Drag-and-drop upload handler.

use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
};
use log::info;
use std::sync::Arc;

use super::{ApiError, api_error};
use crate::server::state::AppState;
use crate::session::DropOutcome;

/// Handle POST /api/drop - multipart upload with a `file` field.
///
/// Images become a static image element, JSON and CSV files become records
/// or a template import.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<DropOutcome>, ApiError> {
    let mut upload: Option<(String, Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Failed to read upload: {}", e)))?;
        upload = Some((file_name, content_type, bytes.to_vec()));
        break;
    }

    let (file_name, content_type, bytes) =
        upload.ok_or((StatusCode::BAD_REQUEST, "No file field found".to_string()))?;

    let outcome = state
        .mutate(|s| s.ingest_drop(&file_name, content_type.as_deref(), &bytes))
        .await
        .map_err(api_error)?;
    info!("[server] dropped {} -> {:?}", file_name, outcome);
    Ok(Json(outcome))
}
