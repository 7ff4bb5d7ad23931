// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::env;

/// Overrides `ai.local_endpoint` (e.g. `http://127.0.0.1:11434/v1`).
pub const ENV_LOCAL_MODEL_URL: &str = "SCOUT_LOCAL_MODEL_URL";

fn default_true() -> bool {
    true
}
fn default_local_model() -> String {
    "DialoGPT-small".to_string()
}
fn default_loading_timeout() -> u64 {
    300
}

/// `ai` section of `GAME_CONFIG`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSettings {
    /// Try to bring up the local text-generation backend at startup.
    #[serde(default)]
    pub use_local_model: bool,
    /// Battery saving = rule-based answers only.
    #[serde(default = "default_true")]
    pub battery_saving: bool,
    /// OpenAI-compatible chat endpoint of the local model server.
    #[serde(default)]
    pub local_endpoint: Option<String>,
    #[serde(default = "default_local_model")]
    pub local_model: String,
    #[serde(default = "default_loading_timeout")]
    pub loading_timeout_secs: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            use_local_model: false,
            battery_saving: true,
            local_endpoint: None,
            local_model: default_local_model(),
            loading_timeout_secs: default_loading_timeout(),
        }
    }
}

impl AiSettings {
    /// Apply env overrides and clamp odd values coming from a hand-edited file.
    pub fn sanitized(mut self) -> Self {
        if let Ok(url) = env::var(ENV_LOCAL_MODEL_URL) {
            if !url.trim().is_empty() {
                self.local_endpoint = Some(url);
            }
        }

        self.local_endpoint = self
            .local_endpoint
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());

        if self.local_model.trim().is_empty() {
            self.local_model = default_local_model();
        }
        if self.loading_timeout_secs == 0 {
            self.loading_timeout_secs = default_loading_timeout();
        }
        self
    }
}
