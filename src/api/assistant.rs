use axum::{extract::State, Form, Json};
use metrics::counter;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::AppState;
use crate::{
    assistant::{anon_hash, extract_team_numbers, keyword_reply, ChatMessage, Reply, Standings},
    config::GameConfig,
    error::ApiError,
    metrics::ASSISTANT_QUERIES,
    scouting::{parse_team_number, team_rankings},
};

#[derive(Deserialize)]
pub(super) struct AiForm {
    query: Option<String>,
    context: Option<String>,
}

/// `context` as posted by the chat widget.
#[derive(Debug, Default, Deserialize)]
struct QueryContext {
    #[serde(default)]
    conversation_history: Vec<ChatMessage>,
    #[serde(default, rename = "teamMentions")]
    team_mentions: Vec<Value>,
}

fn parse_context(raw: Option<&str>) -> QueryContext {
    raw.and_then(|r| serde_json::from_str(r).ok()).unwrap_or_default()
}

fn mention_numbers(values: &[Value]) -> Vec<u32> {
    values
        .iter()
        .filter_map(|v| match v {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).filter(|n| *n != 0),
            Value::String(s) => parse_team_number(s),
            _ => None,
        })
        .collect()
}

fn system_prompt(cfg: &GameConfig) -> String {
    let game = if cfg.game_name.is_empty() {
        "this season's game"
    } else {
        cfg.game_name.as_str()
    };
    format!(
        "You are Bob, a friendly scouting assistant for a robotics competition team playing {game}. \
         Answer briefly and use team numbers when you mention teams."
    )
}

async fn load_standings(state: &AppState, cfg: &GameConfig) -> Option<Standings> {
    let sheet = state.cached_sheet().await?;
    let ranking = team_rankings(&sheet, cfg, &cfg.scoring_rules).ok()?;
    Some(Standings::new(ranking.0))
}

pub(super) async fn ai_query(
    State(state): State<AppState>,
    Form(form): Form<AiForm>,
) -> Result<Json<Reply>, ApiError> {
    let query = form
        .query
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::bad_request("No query provided"))?;
    let ctx = parse_context(form.context.as_deref());
    let mentions = mention_numbers(&ctx.team_mentions);
    counter!(ASSISTANT_QUERIES).increment(1);

    let cfg = state.config.snapshot();
    let standings = load_standings(&state, &cfg).await;
    let hinted = if mentions.is_empty() {
        extract_team_numbers(&query)
    } else {
        mentions.clone()
    };

    // Bob keeps the conversation context; the keyword table owns the reply.
    let (mut reply, pending) = {
        let mut bob = state.assistant();
        bob.respond(&query, &mentions, standings.as_ref());
        let reply = keyword_reply(&query, &hinted, bob.rng());
        (reply, bob.take_pending_save())
    };
    if let Some(snapshot) = pending {
        tokio::task::spawn_blocking(move || {
            if let Err(e) = snapshot.write() {
                warn!(target: "assistant", error = %e, "could not save session data");
            }
        });
    }

    if !cfg.ai.battery_saving {
        reply.response = state
            .model
            .generate(&query, Some(&system_prompt(&cfg)), &ctx.conversation_history)
            .await;
        reply.source = "local_model";
    }

    info!(target: "assistant", query = %anon_hash(&query), source = reply.source, "answered");
    Ok(Json(reply))
}

#[derive(Deserialize)]
pub(super) struct ModeForm {
    battery_saving: Option<String>,
}

pub(super) async fn update_ai_mode(
    State(state): State<AppState>,
    Form(form): Form<ModeForm>,
) -> Result<Json<Value>, ApiError> {
    let battery_saving = form
        .battery_saving
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(true);
    state.config.set_battery_saving(battery_saving);
    if let Err(e) = state.config.persist() {
        warn!(target: "config", error = %e, "could not persist assistant mode");
        return Err(ApiError::Internal(format!("Server error: {e}")));
    }

    let mode = if battery_saving {
        "Battery Saving Mode"
    } else {
        "Full AI Mode"
    };
    state.monitor.log(format!("AI Assistant mode changed: {mode}"));
    Ok(Json(json!({
        "success": true,
        "mode": if battery_saving { "battery_saving" } else { "full_ai" },
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_lenient() {
        let ctx = parse_context(Some(
            r#"{"conversation_history": [{"role": "user", "content": "hi"}], "teamMentions": [5454, "254", "x", 0]}"#,
        ));
        assert_eq!(ctx.conversation_history.len(), 1);
        assert_eq!(mention_numbers(&ctx.team_mentions), vec![5454, 254]);

        let ctx = parse_context(Some("not json"));
        assert!(ctx.conversation_history.is_empty());
        assert!(parse_context(None).team_mentions.is_empty());
    }

    #[test]
    fn system_prompt_names_the_game() {
        let cfg = GameConfig {
            game_name: "Reefscape".into(),
            ..GameConfig::default()
        };
        assert!(system_prompt(&cfg).contains("playing Reefscape"));
    }
}
