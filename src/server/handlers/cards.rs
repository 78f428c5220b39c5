//! Card preview and export handlers.
//!
//! Previews are rendered on demand, one card per request, and cached by the
//! batch renderer until the template or records change.

use axum::{
    Json,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use serde::Serialize;
use std::sync::Arc;

use super::{ApiError, api_error};
use crate::export::{ZIP_FILE_NAME, cards_zip};
use crate::render::CardLayout;
use crate::server::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardsResponse {
    pub count: usize,
    pub cached: usize,
    pub width: f32,
    pub height: f32,
}

/// Handle GET /api/cards - card count and size.
pub async fn summary(State(state): State<Arc<AppState>>) -> Json<CardsResponse> {
    let (width, height) = {
        let session = state.session.read().await;
        (session.template().width, session.template().height)
    };
    Json(CardsResponse {
        count: state.batch.len().await,
        cached: state.batch.cached_count().await,
        width,
        height,
    })
}

/// Handle GET /api/cards/:index/png - render one card.
pub async fn png(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> Result<impl IntoResponse, ApiError> {
    let card = state.batch.render_index(index).await.map_err(api_error)?;
    let png_bytes = card.to_png().map_err(api_error)?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png_bytes))
}

/// Handle GET /api/cards/:index/layout - resolved layout of one card.
pub async fn layout(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> Result<Json<CardLayout>, ApiError> {
    let card = state.batch.render_index(index).await.map_err(api_error)?;
    Ok(Json(card.layout.clone()))
}

/// Handle GET /api/cards/export - every card as PNGs in a ZIP archive.
pub async fn export(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let cards = state.batch.render_all().await.map_err(api_error)?;
    let zip = cards_zip(&cards).map_err(api_error)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", ZIP_FILE_NAME),
            ),
        ],
        zip,
    ))
}
