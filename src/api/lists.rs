use axum::{extract::State, Extension, Form, Json};
use serde_json::{json, Value};

use super::{
    teams::{form_value, form_values},
    AppState,
};
use crate::{auth::SessionUser, error::ApiError, lists::TeamListKind};

fn save_team_list(
    state: &AppState,
    kind: TeamListKind,
    form: &[(String, String)],
) -> Result<Json<Value>, ApiError> {
    let saved = state.lists.save_team_list(kind, &form_values(form, "teams"))?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Saved {} teams to \"{}\" list", saved.len(), kind.label()),
    })))
}

pub(super) async fn save_do_not_pick_list(
    State(state): State<AppState>,
    Form(form): Form<Vec<(String, String)>>,
) -> Result<Json<Value>, ApiError> {
    save_team_list(&state, TeamListKind::DoNotPick, &form)
}

pub(super) async fn load_do_not_pick_list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let teams = state.lists.load_team_list(TeamListKind::DoNotPick)?;
    Ok(Json(json!({ "teams": teams })))
}

pub(super) async fn save_avoid_list(
    State(state): State<AppState>,
    Form(form): Form<Vec<(String, String)>>,
) -> Result<Json<Value>, ApiError> {
    save_team_list(&state, TeamListKind::Avoid, &form)
}

pub(super) async fn load_avoid_list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let teams = state.lists.load_team_list(TeamListKind::Avoid)?;
    Ok(Json(json!({ "teams": teams })))
}

pub(super) async fn save_defense_list(
    State(state): State<AppState>,
    Form(form): Form<Vec<(String, String)>>,
) -> Result<Json<Value>, ApiError> {
    let raw = form_value(&form, "teams").unwrap_or("[]");
    let n = state.lists.save_defense_list(raw)?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Saved {n} teams to Defense list"),
    })))
}

pub(super) async fn load_defense_list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let teams = state.lists.load_defense_list()?;
    Ok(Json(json!({ "teams": teams })))
}

pub(super) async fn save_alliance_selections(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Form(form): Form<Vec<(String, String)>>,
) -> Result<Json<Value>, ApiError> {
    let raw = form_value(&form, "selections").unwrap_or("{}");
    let (reset, saved_at) = state.lists.save_alliance_selections(raw)?;
    let action = if reset { "reset" } else { "saved" };
    state
        .monitor
        .log(format!("Alliance selections {action} by {}", user.id));
    Ok(Json(json!({
        "success": true,
        "message": format!("Alliance selections {action}"),
        "timestamp": saved_at,
    })))
}

pub(super) async fn load_alliance_selections(
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let (selections, timestamp) = state.lists.load_alliance_selections()?;
    Ok(Json(json!({ "selections": selections, "timestamp": timestamp })))
}
