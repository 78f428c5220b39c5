//! Process rule handlers. Every change re-derives the working records.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use std::sync::Arc;

use super::{ApiError, api_error};
use crate::rules::ProcessRule;
use crate::server::state::AppState;

#[derive(Debug, Serialize)]
pub struct RuleView {
    #[serde(flatten)]
    pub rule: ProcessRule,
    pub description: String,
}

fn view(rules: &[ProcessRule]) -> Vec<RuleView> {
    rules
        .iter()
        .map(|rule| RuleView {
            rule: rule.clone(),
            description: rule.describe(),
        })
        .collect()
}

/// Handle GET /api/rules.
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<RuleView>> {
    Json(view(state.session.read().await.rules()))
}

/// Handle PUT /api/rules - replace the whole rule list.
pub async fn replace(
    State(state): State<Arc<AppState>>,
    Json(rules): Json<Vec<ProcessRule>>,
) -> Result<Json<Vec<RuleView>>, ApiError> {
    let rules = state
        .mutate(|s| {
            s.set_rules(rules);
            Ok(view(s.rules()))
        })
        .await
        .map_err(api_error)?;
    Ok(Json(rules))
}

/// Handle POST /api/rules - append a rule.
pub async fn add(
    State(state): State<Arc<AppState>>,
    Json(rule): Json<ProcessRule>,
) -> Result<Json<Vec<RuleView>>, ApiError> {
    let rules = state
        .mutate(|s| {
            s.add_rule(rule);
            Ok(view(s.rules()))
        })
        .await
        .map_err(api_error)?;
    Ok(Json(rules))
}

/// Handle PUT /api/rules/:index.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
    Json(rule): Json<ProcessRule>,
) -> Result<Json<Vec<RuleView>>, ApiError> {
    let rules = state
        .mutate(|s| {
            s.update_rule(index, rule)?;
            Ok(view(s.rules()))
        })
        .await
        .map_err(api_error)?;
    Ok(Json(rules))
}

/// Handle DELETE /api/rules/:index.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> Result<Json<Vec<RuleView>>, ApiError> {
    let rules = state
        .mutate(|s| {
            s.remove_rule(index)?;
            Ok(view(s.rules()))
        })
        .await
        .map_err(api_error)?;
    Ok(Json(rules))
}
