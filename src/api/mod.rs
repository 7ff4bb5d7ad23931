//! HTTP surface: shared state, router and the request-level middleware.

mod admin;
mod assistant;
mod auth;
mod lists;
mod teams;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Router,
};
use metrics::counter;
use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::fs;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::{debug, warn};

use crate::{
    assistant::{responder::SESSION_FILE, Assistant, LocalModel},
    auth::{resolve, session_cookie, Resolution, SessionStore, SessionUser},
    config::ConfigHandle,
    error::ApiError,
    ingest::{ensure_workbook, WorkbookSource},
    lists::ListStore,
    metrics::{Metrics, HTTP_REQUESTS},
    monitor::Monitor,
    scouting::{read_workbook, MatchSheet, MATCH_SHEET},
};

/// Everything handlers need; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: ConfigHandle,
    pub sessions: SessionStore,
    pub lists: ListStore,
    pub assistant: Arc<Mutex<Assistant>>,
    pub model: Arc<LocalModel>,
    pub monitor: Monitor,
    pub metrics: Metrics,
    pub data_dir: PathBuf,
    pub static_dir: PathBuf,
    pub source: Option<Arc<dyn WorkbookSource>>,
}

impl AppState {
    /// Lists, assistant analytics and the workbook all live under `data_dir`.
    pub fn new(config: ConfigHandle, data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            config,
            sessions: SessionStore::new(),
            lists: ListStore::new(data_dir.clone()),
            assistant: Arc::new(Mutex::new(Assistant::new(Some(data_dir.join(SESSION_FILE))))),
            model: LocalModel::disabled(),
            monitor: Monitor::new(),
            metrics: Metrics::init(),
            static_dir: PathBuf::from("static"),
            source: None,
            data_dir,
        }
    }

    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = dir.into();
        self
    }

    /// Used to fetch the workbook on demand when it is missing.
    pub fn with_source(mut self, source: Arc<dyn WorkbookSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_model(mut self, model: Arc<LocalModel>) -> Self {
        self.model = model;
        self
    }

    pub fn with_sessions(mut self, sessions: SessionStore) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_assistant(mut self, assistant: Assistant) -> Self {
        self.assistant = Arc::new(Mutex::new(assistant));
        self
    }

    pub fn workbook_path(&self) -> PathBuf {
        self.data_dir
            .join(self.config.snapshot().server.local_file_path)
    }

    pub(crate) fn assistant(&self) -> std::sync::MutexGuard<'_, Assistant> {
        self.assistant.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current `Match Data` sheet; downloads the workbook first when it is
    /// missing and a source is configured.
    pub async fn sheet(&self) -> Result<MatchSheet, ApiError> {
        let path = self.workbook_path();
        if let Some(source) = &self.source {
            if let Err(e) = ensure_workbook(source.as_ref(), &path).await {
                warn!(target: "ingest", error = %e, "on-demand workbook download failed");
            }
        }
        read_sheet(path).await
    }

    /// Like [`AppState::sheet`] but never downloads; `None` when unreadable.
    pub async fn cached_sheet(&self) -> Option<MatchSheet> {
        let path = self.workbook_path();
        if !path.exists() {
            return None;
        }
        read_sheet(path).await.ok()
    }
}

async fn read_sheet(path: PathBuf) -> Result<MatchSheet, ApiError> {
    let sheet = tokio::task::spawn_blocking(move || read_workbook(&path, MATCH_SHEET))
        .await
        .map_err(|e| ApiError::Internal(format!("workbook reader crashed: {e}")))??;
    Ok(sheet)
}

/// Remote address (or `unknown` when the server runs without connect info).
#[derive(Debug, Clone)]
pub struct ClientAddr(pub String);

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/", get(index))
        .route("/get_config", get(admin::get_config))
        .route("/update_config", post(admin::update_config))
        .route("/get_team_averages", post(teams::get_team_averages))
        .route("/get_all_teams", get(teams::get_all_teams))
        .route("/get_all_team_averages", get(teams::get_all_team_averages))
        .route("/get_all_notes", get(teams::get_all_notes))
        .route("/get_match_data", get(teams::get_match_data))
        .route("/get_team_rankings", get(teams::get_team_rankings))
        .route("/get_team_match_counts", get(teams::get_team_match_counts))
        .route("/calculate_match_points", post(teams::calculate_match_points))
        .route("/compare_teams", post(teams::compare_teams))
        .route("/get_defense_teams", get(teams::get_defense_teams))
        .route("/save_do_not_pick_list", post(lists::save_do_not_pick_list))
        .route("/load_do_not_pick_list", get(lists::load_do_not_pick_list))
        .route("/save_avoid_list", post(lists::save_avoid_list))
        .route("/load_avoid_list", get(lists::load_avoid_list))
        .route("/save_defense_list", post(lists::save_defense_list))
        .route("/load_defense_list", get(lists::load_defense_list))
        .route("/save_alliance_selections", post(lists::save_alliance_selections))
        .route("/load_alliance_selections", get(lists::load_alliance_selections))
        .route("/ai_query", post(assistant::ai_query))
        .route("/update_ai_mode", post(assistant::update_ai_mode))
        .route("/log_search_refresh", post(admin::log_search_refresh))
        .route("/server_status", get(admin::server_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_login));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", get(auth::logout))
        .merge(state.metrics.router())
        .merge(protected)
        .nest_service("/static", ServeDir::new(state.static_dir.clone()))
        .layer(middleware::from_fn_with_state(state.clone(), track_client))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Counts requests and keeps the connected-client table fresh.
async fn track_client(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    counter!(HTTP_REQUESTS).increment(1);
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|c| c.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.monitor.touch_client(&ip, forwarded.as_deref());
    req.extensions_mut().insert(ClientAddr(ip));
    next.run(req).await
}

fn wants_html(req: &Request) -> bool {
    if req.method() != Method::GET {
        return false;
    }
    req.uri().path() == "/"
        || req
            .headers()
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|a| a.contains("text/html"))
}

/// Pages redirect to `/login`; API calls get a 401 JSON body.
async fn require_login(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let cfg = state.config.snapshot();
    match resolve(&cfg, &state.sessions, req.headers()) {
        Resolution::Session(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Resolution::Restored { user, sid } => {
            req.extensions_mut().insert(user);
            let mut resp = next.run(req).await;
            if let Ok(v) = HeaderValue::from_str(&session_cookie(&sid)) {
                resp.headers_mut().append(header::SET_COOKIE, v);
            }
            resp
        }
        Resolution::Anonymous => {
            debug!(target: "auth", path = %req.uri().path(), "unauthenticated request");
            if wants_html(&req) {
                Redirect::to("/login").into_response()
            } else {
                ApiError::Unauthorized("Login required".into()).into_response()
            }
        }
    }
}

async fn index(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> Result<Html<String>, ApiError> {
    let path = state.static_dir.join("index.html");
    let page = fs::read_to_string(&path)
        .await
        .map_err(|_| ApiError::NotFound(format!("{} not found", path.display())))?;
    let name = html_escape::encode_text(&user.name);
    Ok(Html(page.replace("{{ user_name }}", &name)))
}
