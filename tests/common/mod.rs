// tests/common/mod.rs
//
// Shared fixtures for the HTTP tests: a temp data dir holding a small
// `Match Data` workbook and an in-memory game config bound to a config
// script path inside the same dir.

#![allow(dead_code)]

use axum::{
    body::{self, Body},
    http::{header, Request, Response},
    Router,
};
use rust_xlsxwriter::Workbook;
use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;
use tower::ServiceExt as _;

use scout_dashboard::{router, AppState, ConfigHandle, GameConfig};

pub const BODY_LIMIT: usize = 1024 * 1024;

pub const HEADERS: [&str; 8] = [
    "Scouter Name",
    "Match Number",
    "Team Number",
    "Coral L4 (#)",
    "Auto Leave (T/F)",
    "Endgame Barge",
    "Defense Performed (T/F)",
    "Additional Observations",
];

/// (scouter, match, team, coral, leave, barge, defense, notes)
pub const ROWS: [(&str, f64, f64, f64, &str, f64, &str, &str); 6] = [
    ("Ana", 1.0, 254.0, 4.0, "TRUE", 3.0, "FALSE", "fast cycles"),
    ("Ben", 1.0, 1678.0, 2.0, "TRUE", 2.0, "TRUE", "solid defender"),
    ("Ana", 2.0, 254.0, 6.0, "FALSE", 3.0, "FALSE", ""),
    ("Cy", 2.0, 5454.0, 1.0, "FALSE", 0.0, "TRUE", "tipped over"),
    ("Ben", 3.0, 1678.0, 3.0, "TRUE", 2.0, "FALSE", ""),
    ("Cy", 3.0, 0.0, 9.0, "TRUE", 3.0, "FALSE", "practice row"),
];

pub fn game_config(require_login: bool) -> GameConfig {
    serde_json::from_value(json!({
        "game_name": "Reefscape",
        "team_column": "Team Number",
        "include_columns": ["Coral L4 (#)", "Auto Leave (T/F)", "Endgame Barge"],
        "scoring_rules": {
            "Coral L4 (#)": 5,
            "Auto Leave (T/F)": 3,
            "Endgame Barge": {"0": 0, "2": 6, "3": 12}
        },
        "server": {"require_login": require_login, "local_file_path": "qr_codes.xlsx"},
        "ai": {"battery_saving": true},
        "users": {"5454": {"password": "5568", "name": "Team 5454"}}
    }))
    .expect("fixture config")
}

pub fn write_workbook(path: &Path) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Match Data").expect("sheet name");
    for (col, h) in HEADERS.iter().enumerate() {
        sheet.write_string(0, col as u16, *h).expect("header");
    }
    for (i, (scouter, m, team, coral, leave, barge, defense, notes)) in ROWS.iter().enumerate() {
        let r = i as u32 + 1;
        sheet.write_string(r, 0, *scouter).expect("cell");
        sheet.write_number(r, 1, *m).expect("cell");
        sheet.write_number(r, 2, *team).expect("cell");
        sheet.write_number(r, 3, *coral).expect("cell");
        sheet.write_string(r, 4, *leave).expect("cell");
        sheet.write_number(r, 5, *barge).expect("cell");
        sheet.write_string(r, 6, *defense).expect("cell");
        if !notes.is_empty() {
            sheet.write_string(r, 7, *notes).expect("cell");
        }
    }
    workbook.save(path).expect("save workbook");
}

pub struct TestApp {
    pub dir: TempDir,
    pub state: AppState,
}

impl TestApp {
    pub fn new(require_login: bool) -> Self {
        Self::build(require_login, true)
    }

    /// No workbook on disk.
    pub fn without_workbook(require_login: bool) -> Self {
        Self::build(require_login, false)
    }

    fn build(require_login: bool, with_workbook: bool) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ConfigHandle::with_config(dir.path().join("config.js"), game_config(require_login));
        let state = AppState::new(config, dir.path()).with_static_dir(dir.path().join("static"));
        if with_workbook {
            write_workbook(&state.workbook_path());
        }
        Self { dir, state }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router().oneshot(req).await.expect("oneshot")
    }

    /// Logs in as the fixture user and returns the `Cookie` header value.
    pub async fn login(&self) -> String {
        let resp = self
            .send(form_post("/login", "username=5454&password=5568", None))
            .await;
        let cookie = resp
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .expect("session cookie");
        cookie.split(';').next().unwrap_or_default().to_string()
    }
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut b = Request::builder().method("GET").uri(uri);
    if let Some(c) = cookie {
        b = b.header(header::COOKIE, c);
    }
    b.body(Body::empty()).expect("build GET")
}

pub fn form_post(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut b = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(c) = cookie {
        b = b.header(header::COOKIE, c);
    }
    b.body(Body::from(body.to_string())).expect("build POST")
}

pub async fn body_text(resp: Response<Body>) -> String {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf8")
}

pub async fn body_json(resp: Response<Body>) -> Value {
    let text = body_text(resp).await;
    serde_json::from_str(&text).unwrap_or_else(|e| panic!("not json ({e}): {text}"))
}

/// Percent-encodes a form value.
pub fn enc(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() * 3);
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
