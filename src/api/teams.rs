use axum::{
    extract::{Query, State},
    Form, Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::AppState;
use crate::{
    config::ScoringRules,
    error::ApiError,
    scouting::{
        self, aggregate::{Comparison, DefenseEntry, MatchPrediction, Note},
        parse_team_number, write_snapshot, Ordered,
    },
};

/// All values posted under `key` (PHP-style `key[]` arrays included).
pub(super) fn form_values(form: &[(String, String)], key: &str) -> Vec<String> {
    let array_key = format!("{key}[]");
    form.iter()
        .filter(|(k, _)| *k == key || *k == array_key)
        .map(|(_, v)| v.clone())
        .collect()
}

pub(super) fn form_value<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
    form.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

#[derive(Deserialize)]
pub(super) struct TeamForm {
    team_number: Option<String>,
}

pub(super) async fn get_team_averages(
    State(state): State<AppState>,
    Form(form): Form<TeamForm>,
) -> Result<Json<Value>, ApiError> {
    let team = form
        .team_number
        .as_deref()
        .and_then(parse_team_number)
        .ok_or_else(|| ApiError::bad_request("Invalid team number."))?;
    let sheet = state.sheet().await?;
    let averages = scouting::team_averages(&sheet, &state.config.snapshot(), team)?;
    Ok(Json(json!({ "team_number": team, "averages": averages })))
}

pub(super) async fn get_all_teams(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let sheet = state.sheet().await?;
    let teams = scouting::all_teams(&sheet, &state.config.snapshot())?;
    Ok(Json(json!({ "teams": teams })))
}

pub(super) async fn get_all_team_averages(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<u32, scouting::aggregate::ColumnAverages>>, ApiError> {
    let sheet = state.sheet().await?;
    let averages = scouting::all_team_averages(&sheet, &state.config.snapshot())?;
    let snapshot = state.data_dir.join("team_averages.json");
    if let Err(e) = write_snapshot(&snapshot, &averages) {
        warn!(target: "api", error = %e, "could not write averages snapshot");
    }
    Ok(Json(averages))
}

pub(super) async fn get_all_notes(State(state): State<AppState>) -> Result<Json<Vec<Note>>, ApiError> {
    let sheet = state.sheet().await?;
    Ok(Json(scouting::all_notes(&sheet)?))
}

#[derive(Deserialize)]
pub(super) struct MatchQuery {
    team_number: Option<String>,
}

pub(super) async fn get_match_data(
    State(state): State<AppState>,
    Query(q): Query<MatchQuery>,
) -> Result<Json<Vec<Map<String, Value>>>, ApiError> {
    let raw = q
        .team_number
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Team number is required."))?;
    let sheet = state.sheet().await?;
    let team = parse_team_number(&raw)
        .ok_or_else(|| ApiError::bad_request("Please enter a valid team number."))?;
    Ok(Json(scouting::match_data(&sheet, &state.config.snapshot(), team)?))
}

pub(super) async fn get_team_rankings(
    State(state): State<AppState>,
) -> Result<Json<Ordered<u32, f64>>, ApiError> {
    let sheet = state.sheet().await?;
    let cfg = state.config.snapshot();
    Ok(Json(scouting::team_rankings(&sheet, &cfg, &cfg.scoring_rules)?))
}

pub(super) async fn get_team_match_counts(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<u32, usize>>, ApiError> {
    let sheet = state.sheet().await?;
    Ok(Json(scouting::team_match_counts(&sheet, &state.config.snapshot())?))
}

/// `scoring_rules` from a posted config, when it parses.
fn rules_override(raw: Option<&str>) -> Option<ScoringRules> {
    let value: Value = serde_json::from_str(raw?).ok()?;
    let rules = value.get("scoring_rules")?.clone();
    match serde_json::from_value(rules) {
        Ok(r) => Some(r),
        Err(e) => {
            debug!(target: "api", error = %e, "ignoring posted scoring rules");
            None
        }
    }
}

pub(super) async fn calculate_match_points(
    State(state): State<AppState>,
    Form(form): Form<Vec<(String, String)>>,
) -> Result<Json<MatchPrediction>, ApiError> {
    let red = form_values(&form, "red_teams");
    let blue = form_values(&form, "blue_teams");
    let cfg = state.config.snapshot();
    let rules = rules_override(form_value(&form, "config")).unwrap_or_else(|| cfg.scoring_rules.clone());
    let sheet = state.sheet().await?;
    Ok(Json(scouting::predict_match(&sheet, &cfg, &red, &blue, &rules)?))
}

pub(super) async fn compare_teams(
    State(state): State<AppState>,
    Form(form): Form<Vec<(String, String)>>,
) -> Result<Json<Ordered<String, Comparison>>, ApiError> {
    let teams = form_values(&form, "teams");
    if teams.is_empty() {
        return Err(ApiError::bad_request("Please provide at least one team number"));
    }
    let sheet = state.sheet().await?;
    Ok(Json(scouting::compare_teams(&sheet, &state.config.snapshot(), &teams)?))
}

pub(super) async fn get_defense_teams(
    State(state): State<AppState>,
) -> Result<Json<Ordered<u32, DefenseEntry>>, ApiError> {
    let sheet = state.sheet().await?;
    Ok(Json(scouting::defense_scores(&sheet, &state.config.snapshot())?))
}
