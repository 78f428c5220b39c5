//! Record handlers.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::{ApiError, api_error};
use crate::record::{self, Record};
use crate::server::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsResponse {
    /// Records after process rules.
    pub records: Vec<Record>,
    pub original: Vec<Record>,
    /// Field names available for binding.
    pub fields: Vec<String>,
}

async fn snapshot(state: &AppState) -> RecordsResponse {
    let session = state.session.read().await;
    RecordsResponse {
        records: session.records().to_vec(),
        original: session.original_records().to_vec(),
        fields: record::field_names(session.records()),
    }
}

/// Handle GET /api/records.
pub async fn list(State(state): State<Arc<AppState>>) -> Json<RecordsResponse> {
    Json(snapshot(&state).await)
}

/// Handle PUT /api/records - replace the records with a JSON array of objects.
pub async fn replace(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<RecordsResponse>, ApiError> {
    let records = record::records_from_value(body).map_err(api_error)?;
    state
        .mutate(|s| {
            s.set_records(records);
            Ok(())
        })
        .await
        .map_err(api_error)?;
    Ok(Json(snapshot(&state).await))
}

#[derive(Debug, Deserialize)]
pub struct ImportParams {
    /// File name; its extension picks the parser.
    pub name: String,
}

/// Handle POST /api/records/import?name=cards.csv - import a record file body.
pub async fn import(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ImportParams>,
    body: String,
) -> Result<Json<RecordsResponse>, ApiError> {
    state
        .mutate(|s| s.import_records(&params.name, &body))
        .await
        .map_err(api_error)?;
    Ok(Json(snapshot(&state).await))
}
