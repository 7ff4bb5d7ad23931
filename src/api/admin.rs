use axum::{extract::State, Extension, Form, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use tracing::{info, warn};

use super::{AppState, ClientAddr};
use crate::{auth::SessionUser, error::ApiError};

/// Reloads the script from disk, then returns the config without credentials.
pub(super) async fn get_config(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    if let Err(e) = state.config.reload() {
        warn!(target: "config", error = %e, "reload on request failed, serving current config");
    }
    let mut value = serde_json::to_value(state.config.snapshot())
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if let Some(obj) = value.as_object_mut() {
        obj.remove("users");
    }
    Ok(Json(value))
}

#[derive(Deserialize)]
pub(super) struct ConfigForm {
    config: Option<String>,
}

pub(super) async fn update_config(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Form(form): Form<ConfigForm>,
) -> Result<Json<Value>, ApiError> {
    let raw = form
        .config
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("No configuration data received"))?;
    let update: Value =
        serde_json::from_str(&raw).map_err(|_| ApiError::bad_request("Invalid JSON configuration"))?;
    state.config.apply_update(&update)?;

    info!(target: "config", user = %user.id, "configuration updated from front end");
    state
        .monitor
        .log(format!("Configuration updated by {} ({})", user.name, user.id));
    Ok(Json(json!({
        "success": true,
        "message": "Configuration updated successfully",
    })))
}

#[derive(Deserialize)]
pub(super) struct RefreshForm {
    message: Option<String>,
}

pub(super) async fn log_search_refresh(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Extension(ClientAddr(ip)): Extension<ClientAddr>,
    Form(form): Form<RefreshForm>,
) -> Json<Value> {
    let message = form
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| "Search refresh event".to_string());
    state.monitor.log(format!(
        "SEARCH REFRESH: {message} - User: {} ({}) - IP: {ip}",
        user.name, user.id
    ));
    Json(json!({ "success": true }))
}

pub(super) async fn server_status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let monitor = state.monitor.clone();
    let system = tokio::task::spawn_blocking(move || monitor.system_snapshot())
        .await
        .map_err(|e| ApiError::Internal(format!("status probe crashed: {e}")))?;

    let cfg = state.config.snapshot();
    let workbook = state.workbook_path();
    let modified = fs::metadata(&workbook)
        .and_then(|m| m.modified())
        .ok()
        .map(|t| DateTime::<Utc>::from(t).to_rfc3339());
    let clients = state.monitor.clients();

    Ok(Json(json!({
        "system": system,
        "client_count": clients.len(),
        "clients": clients,
        "logs": state.monitor.log_lines(),
        "sessions": state.sessions.len(),
        "workbook": {
            "path": workbook.display().to_string(),
            "exists": workbook.exists(),
            "modified": modified,
            "scanner_device": cfg.server.scanner_device,
            "refresh_interval_secs": cfg.server.data_refresh_interval,
        },
        "assistant": {
            "battery_saving": cfg.ai.battery_saving,
            "model_state": state.model.state(),
            "backend": state.model.backend_name(),
        },
    })))
}
