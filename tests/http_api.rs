// tests/http_api.rs
//
// Router-level tests without opening sockets (tower::ServiceExt::oneshot).
//
// Covered:
// - GET /health, /metrics
// - login gate: 401 for API calls, redirect for pages, session cookie
// - team endpoints over a generated workbook
// - match prediction with and without a posted scoring override
// - defense ranking
// - missing workbook -> 404

mod common;

use axum::http::{header, StatusCode};
use common::{body_json, body_text, enc, form_post, get, TestApp};

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new(true);
    let resp = app.send(get("/health", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await.trim(), "ok");
}

#[tokio::test]
async fn api_without_session_is_401_json() {
    let app = TestApp::new(true);
    let resp = app.send(get("/get_all_teams", None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let v = body_json(resp).await;
    assert_eq!(v["error"], "Login required");
}

#[tokio::test]
async fn index_without_session_redirects_to_login() {
    let app = TestApp::new(true);
    let resp = app.send(get("/", None)).await;
    assert!(resp.status().is_redirection(), "got {}", resp.status());
    assert_eq!(resp.headers()[header::LOCATION], "/login");
}

#[tokio::test]
async fn bad_credentials_render_login_error() {
    let app = TestApp::new(true);
    let resp = app
        .send(form_post("/login", "username=5454&password=nope", None))
        .await;
    // 401 rather than 200, but still the rendered login page
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().get(header::SET_COOKIE).is_none());
    let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/html"), "{content_type}");
    let page = body_text(resp).await;
    assert!(page.contains("Invalid credentials"), "{page}");
}

#[tokio::test]
async fn login_cookie_grants_access() {
    let app = TestApp::new(true);
    let cookie = app.login().await;
    assert!(cookie.starts_with("scout_sid="), "{cookie}");

    let resp = app.send(get("/get_all_teams", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let v = body_json(resp).await;
    assert_eq!(v["teams"], serde_json::json!([254, 1678, 5454]));
}

#[tokio::test]
async fn logout_drops_the_session() {
    let app = TestApp::new(true);
    let cookie = app.login().await;
    let resp = app.send(get("/logout", Some(&cookie))).await;
    assert!(resp.status().is_redirection());

    let resp = app.send(get("/get_all_teams", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_disabled_serves_guest() {
    let app = TestApp::new(false);
    let resp = app.send(get("/get_team_match_counts", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let v = body_json(resp).await;
    assert_eq!(v["254"], 2);
    assert_eq!(v["1678"], 2);
    assert_eq!(v["5454"], 1);
    assert!(v.get("0").is_none());

    let resp = app.send(get("/login", None)).await;
    assert!(resp.status().is_redirection());
}

#[tokio::test]
async fn rankings_are_best_first() {
    let app = TestApp::new(false);
    let resp = app.send(get("/get_team_rankings", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let v = body_json(resp).await;
    let obj = v.as_object().expect("rankings object");
    let order: Vec<&str> = obj.keys().map(String::as_str).collect();
    assert_eq!(order, ["254", "1678", "5454"]);
    assert_eq!(obj["254"], 77.0);
    assert_eq!(obj["1678"], 43.0);
    assert_eq!(obj["5454"], 5.0);
}

#[tokio::test]
async fn team_averages_validate_team_number() {
    let app = TestApp::new(false);

    let resp = app
        .send(form_post("/get_team_averages", "team_number=254", None))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let v = body_json(resp).await;
    assert_eq!(v["team_number"], 254);
    assert_eq!(v["averages"]["Coral L4 (#)"], 5.0);
    assert_eq!(v["averages"]["Endgame Barge"], 3.0);

    let resp = app
        .send(form_post("/get_team_averages", "team_number=0", None))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "Invalid team number.");

    let resp = app
        .send(form_post("/get_team_averages", "team_number=9999", None))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn match_data_requires_a_team() {
    let app = TestApp::new(false);

    let resp = app.send(get("/get_match_data", None)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "Team number is required.");

    let resp = app.send(get("/get_match_data?team_number=abc", None)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app.send(get("/get_match_data?team_number=1678", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let rows = body_json(resp).await;
    let rows = rows.as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["Score"], 19.0);
    assert_eq!(rows[1]["Scouter Name"], "Ben");
}

#[tokio::test]
async fn notes_skip_blank_observations() {
    let app = TestApp::new(false);
    let resp = app.send(get("/get_all_notes", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let notes = body_json(resp).await;
    let notes = notes.as_array().expect("notes");
    assert_eq!(notes.len(), 4);
    assert_eq!(notes[0]["observation"], "fast cycles");
    assert_eq!(notes[0]["team_number"], 254);
}

#[tokio::test]
async fn all_team_averages_writes_snapshot() {
    let app = TestApp::new(false);
    let resp = app.send(get("/get_all_team_averages", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let v = body_json(resp).await;
    assert!(v.get("254").is_some());
    assert!(app.dir.path().join("team_averages.json").exists());
}

#[tokio::test]
async fn compare_needs_teams() {
    let app = TestApp::new(false);
    let resp = app.send(form_post("/compare_teams", "", None)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(resp).await["error"],
        "Please provide at least one team number"
    );

    let resp = app
        .send(form_post("/compare_teams", "teams%5B%5D=254&teams%5B%5D=1678", None))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let v = body_json(resp).await;
    assert!(v.get("254").is_some());
    assert!(v.get("1678").is_some());
}

#[tokio::test]
async fn match_points_use_configured_rules() {
    let app = TestApp::new(false);
    let resp = app
        .send(form_post(
            "/calculate_match_points",
            "red_teams%5B%5D=254&blue_teams%5B%5D=1678",
            None,
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let v = body_json(resp).await;
    // 254: coral 5.0 * 5 + barge lookup 3 -> 12; 1678: coral 2.5 * 5 + barge 2 -> 6
    assert_eq!(v["red_alliance_points"].as_f64(), Some(37.0));
    assert_eq!(v["blue_alliance_points"].as_f64(), Some(18.5));
    assert_eq!(v["team_points"]["254"]["total"].as_f64(), Some(37.0));
    assert_eq!(v["team_points"]["254"]["breakdown"]["Coral L4 (#)"].as_f64(), Some(5.0));
    assert_eq!(v["team_points"]["1678"]["breakdown"]["Endgame Barge"].as_f64(), Some(2.0));
}

#[tokio::test]
async fn match_points_accept_scoring_override() {
    let app = TestApp::new(false);
    let body = format!(
        "red_teams%5B%5D=254&blue_teams%5B%5D=1678&blue_teams%5B%5D=5454&config={}",
        enc(r#"{"scoring_rules": {"Coral L4 (#)": 10}}"#)
    );
    let resp = app.send(form_post("/calculate_match_points", &body, None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let v = body_json(resp).await;
    assert_eq!(v["red_alliance_points"].as_f64(), Some(50.0));
    assert_eq!(v["blue_alliance_points"].as_f64(), Some(35.0));
    assert_eq!(v["team_points"]["5454"]["total"].as_f64(), Some(10.0));

    // the stored rules are untouched
    assert_eq!(app.state.config.snapshot().scoring_rules["Coral L4 (#)"].weight(), Some(5.0));
}

#[tokio::test]
async fn defense_teams_are_ranked_best_first() {
    let app = TestApp::new(false);
    let resp = app.send(get("/get_defense_teams", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let v = body_json(resp).await;
    let entries = v.as_object().expect("object keyed by team");

    let mut teams: Vec<&str> = entries.keys().map(String::as_str).collect();
    teams.sort_unstable();
    assert_eq!(teams, ["1678", "254", "5454"]);

    let scores: Vec<f64> = entries
        .values()
        .map(|e| e["score"].as_f64().expect("score"))
        .collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]), "{scores:?}");
    // no explicit defense columns in the workbook, so the rating is derived
    for entry in entries.values() {
        assert!(entry["metrics"].get("Defense Rating").is_some(), "{entry}");
    }
}

#[tokio::test]
async fn missing_workbook_is_404() {
    let app = TestApp::without_workbook(false);
    let resp = app.send(get("/get_all_teams", None)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_endpoint_renders_request_counter() {
    let app = TestApp::new(false);
    let _ = app.send(get("/health", None)).await;
    let resp = app.send(get("/metrics", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let text = body_text(resp).await;
    assert!(text.contains("http_requests_total"), "{text}");
}
