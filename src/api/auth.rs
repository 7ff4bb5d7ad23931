use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Extension, Form,
};
use serde::Deserialize;
use tokio::fs;
use tracing::{info, warn};

use super::{AppState, ClientAddr};
use crate::auth::{
    check_credentials, cookie_value, expired_cookie, remember_cookie, session_cookie,
    REMEMBER_COOKIE, SESSION_COOKIE,
};

const ERROR_SLOT: &str = "<!-- login-error -->";

const FALLBACK_LOGIN: &str = r#"<!doctype html>
<html><head><meta charset="utf-8"><title>Scouting login</title></head>
<body>
<h1>Scouting login</h1>
<!-- login-error -->
<form method="post" action="/login">
<input name="username" placeholder="Username" required>
<input name="password" type="password" placeholder="Password" required>
<label><input type="checkbox" name="remember"> Remember me</label>
<button type="submit">Log in</button>
</form>
</body></html>
"#;

async fn render_login(state: &AppState, error: Option<&str>) -> String {
    let page = fs::read_to_string(state.static_dir.join("login.html"))
        .await
        .unwrap_or_else(|_| FALLBACK_LOGIN.to_string());
    let slot = error
        .map(|e| format!(r#"<p class="error">{}</p>"#, html_escape::encode_text(e)))
        .unwrap_or_default();
    page.replace(ERROR_SLOT, &slot)
}

pub(super) async fn login_page(State(state): State<AppState>) -> Response {
    if !state.config.snapshot().server.require_login {
        return Redirect::to("/").into_response();
    }
    Html(render_login(&state, None).await).into_response()
}

#[derive(Deserialize)]
pub(super) struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    remember: Option<String>,
}

pub(super) async fn login(
    State(state): State<AppState>,
    Extension(ClientAddr(ip)): Extension<ClientAddr>,
    Form(form): Form<LoginForm>,
) -> Response {
    let cfg = state.config.snapshot();
    if !cfg.server.require_login {
        return Redirect::to("/").into_response();
    }

    let Some(user) = check_credentials(&cfg, &form.username, &form.password) else {
        warn!(target: "auth", user = %form.username, %ip, "failed login");
        let page = render_login(&state, Some("Invalid credentials. Please try again.")).await;
        return (StatusCode::UNAUTHORIZED, Html(page)).into_response();
    };

    let sid = state.sessions.create(user.clone());
    let mut resp = Redirect::to("/").into_response();
    let mut cookies = vec![session_cookie(&sid)];
    if form.remember.is_some() {
        cookies.push(remember_cookie(&state.sessions.issue_remember_token(&user.id)));
    }
    for c in cookies {
        if let Ok(v) = HeaderValue::from_str(&c) {
            resp.headers_mut().append(header::SET_COOKIE, v);
        }
    }
    info!(target: "auth", user = %user.id, remember = form.remember.is_some(), "login");
    state.monitor.log(format!("User {} ({}) logged in from {ip}", user.name, user.id));
    resp
}

pub(super) async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(sid) = cookie_value(&headers, SESSION_COOKIE) {
        state.sessions.remove(sid);
    }
    let mut resp = Redirect::to("/login").into_response();
    for name in [SESSION_COOKIE, REMEMBER_COOKIE] {
        if let Ok(v) = HeaderValue::from_str(&expired_cookie(name)) {
            resp.headers_mut().append(header::SET_COOKIE, v);
        }
    }
    resp
}
