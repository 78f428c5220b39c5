//! Template, project, font and history handlers.

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ApiError, api_error};
use crate::error::CardpressError;
use crate::export::TEMPLATE_FILE_NAME;
use crate::server::state::AppState;
use crate::template::fonts::available_fonts;
use crate::template::{CARD_SIZES, CardSize, TemplateBundle, card_size_by_name};

/// Handle GET /api/template - current template and rules.
pub async fn get(State(state): State<Arc<AppState>>) -> Json<TemplateBundle> {
    Json(state.session.read().await.bundle())
}

/// Handle POST /api/template - import a template file (replaces template and rules).
pub async fn import(State(state): State<Arc<AppState>>, body: String) -> Result<Json<TemplateBundle>, ApiError> {
    let bundle = state
        .mutate(|s| {
            s.import_template(&body)?;
            Ok(s.bundle())
        })
        .await
        .map_err(api_error)?;
    Ok(Json(bundle))
}

/// Handle GET /api/template/export - download the template file.
pub async fn export(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let json = state.session.read().await.export_template().map_err(api_error)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", TEMPLATE_FILE_NAME),
            ),
        ],
        json,
    ))
}

/// Handle POST /api/project/new - start a blank project.
pub async fn new_project(State(state): State<Arc<AppState>>) -> Result<Json<TemplateBundle>, ApiError> {
    let bundle = state
        .mutate(|s| {
            s.new_project();
            Ok(s.bundle())
        })
        .await
        .map_err(api_error)?;
    Ok(Json(bundle))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SizeRequest {
    Preset { preset: String },
    Explicit { width: f32, height: f32 },
}

/// Handle PUT /api/template/size - change the card size.
pub async fn set_size(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SizeRequest>,
) -> Result<Json<TemplateBundle>, ApiError> {
    let (width, height) = match req {
        SizeRequest::Explicit { width, height } => (width, height),
        SizeRequest::Preset { preset } => {
            let size = card_size_by_name(&preset).ok_or_else(|| {
                api_error(CardpressError::Template(format!("unknown card size '{}'", preset)))
            })?;
            (size.width, size.height)
        }
    };
    let bundle = state
        .mutate(|s| {
            s.set_card_size(width, height)?;
            Ok(s.bundle())
        })
        .await
        .map_err(api_error)?;
    Ok(Json(bundle))
}

/// Handle GET /api/template/sizes - card size presets.
pub async fn sizes() -> Json<&'static [CardSize]> {
    Json(CARD_SIZES)
}

#[derive(Debug, Serialize)]
pub struct FontsResponse {
    /// Families selectable in the editor.
    pub families: Vec<String>,
    /// Families backed by a font file on the server.
    pub installed: Vec<String>,
}

/// Handle GET /api/fonts - selectable and installed font families.
pub async fn fonts(State(state): State<Arc<AppState>>) -> Json<FontsResponse> {
    let custom = state.session.read().await.template().custom_fonts.clone();
    Json(FontsResponse {
        families: available_fonts(&custom),
        installed: state.batch.engine().fonts().families(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FontRequest {
    Url { url: String },
    Family { family: String },
}

/// Handle POST /api/fonts - add a custom family by name or Google Fonts URL.
pub async fn add_font(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FontRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let family = state
        .mutate(|s| match req {
            FontRequest::Url { url } => s.add_font_from_url(&url),
            FontRequest::Family { family } => s.add_custom_font(&family).map(|_| family.trim().to_string()),
        })
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "family": family }))))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub changed: bool,
    pub can_undo: bool,
    pub can_redo: bool,
    pub bundle: TemplateBundle,
}

/// Handle GET /api/history - undo/redo availability.
pub async fn history(State(state): State<Arc<AppState>>) -> Json<HistoryResponse> {
    let session = state.session.read().await;
    Json(HistoryResponse {
        changed: false,
        can_undo: session.can_undo(),
        can_redo: session.can_redo(),
        bundle: session.bundle(),
    })
}

async fn step(state: &AppState, forward: bool) -> Result<Json<HistoryResponse>, ApiError> {
    let response = state
        .mutate(|s| {
            let changed = if forward { s.redo() } else { s.undo() };
            Ok(HistoryResponse {
                changed,
                can_undo: s.can_undo(),
                can_redo: s.can_redo(),
                bundle: s.bundle(),
            })
        })
        .await
        .map_err(api_error)?;
    Ok(Json(response))
}

/// Handle POST /api/history/undo.
pub async fn undo(State(state): State<Arc<AppState>>) -> Result<Json<HistoryResponse>, ApiError> {
    step(&state, false).await
}

/// Handle POST /api/history/redo.
pub async fn redo(State(state): State<Arc<AppState>>) -> Result<Json<HistoryResponse>, ApiError> {
    step(&state, true).await
}

/// Handle DELETE /api/history - keep only the current template.
pub async fn clear_history(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state
        .mutate(|s| {
            s.clear_history();
            Ok(())
        })
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}
