//! Local text-generation wrapper.
//!
//! The model itself runs out of process behind an OpenAI-compatible HTTP
//! endpoint. Until that endpoint has answered a validation prompt the wrapper
//! is `Loading`; if it never does, it drops to `Simulation` and answers from
//! templates.

use once_cell::sync::Lazy;
use rand::{rngs::StdRng, seq::IndexedRandom, SeedableRng};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};
use tracing::{debug, error, info, warn};

use super::anon_hash;
use crate::config::AiSettings;

const VALIDATION_PROMPT: &str = "Hello, how are you?";
const MAX_PROMPT_CHARS: usize = 512;
const MAX_NEW_TOKENS: u32 = 200;
const HISTORY_MESSAGES: usize = 6;

const REDUCED_NOTICE: &str = "I'm currently operating with reduced capabilities because the AI model couldn't be loaded. I'll do my best to help with basic questions, but advanced analysis may not be available.";
const STILL_LOADING: &str = "I'm still loading my brain. Please try again in a moment.";
const LOAD_TIMED_OUT: &str = "I've been trying to load my thinking module for a while but I'm having some trouble. You might want to check if your computer has enough resources or try restarting the application.";
const EMPTY_FALLBACK: &str = "I understand your question but I'm struggling to formulate a good response right now. Could you try rephrasing or asking about something else?";

static RE_SIM_TEAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"team\s+(\d+)|(\d+)\s+team").expect("team mention regex"));

const BUILT_IN: &[(&str, &[&str])] = &[
    (
        "hi",
        &[
            "Hello! I'm Bob, your scouting assistant. How can I help you today?",
            "Hi there! I'm Bob. What would you like to know about team performance?",
        ],
    ),
    (
        "hello",
        &[
            "Hello! I'm Bob, your scouting assistant. How can I help you today?",
            "Hi there! I'm Bob. What would you like to know about team performance?",
        ],
    ),
    (
        "hey",
        &[
            "Hey! I'm Bob, your scouting assistant. How can I help you today?",
            "Hey there! What team data would you like to analyze?",
        ],
    ),
    (
        "who are you",
        &["I'm Bob, the AI scouting assistant! I can help you analyze team data, compare performances, and provide insights for your scouting needs."],
    ),
    (
        "what can you do",
        &["I can help you analyze team performance data, compare teams, create visualizations, and provide scouting insights. Just ask me about specific teams or metrics!"],
    ),
    (
        "help",
        &["I can assist with team analysis, comparisons, and scouting insights. Try asking about a specific team like 'Tell me about team 5454' or 'Compare teams 1234 and 5678'."],
    ),
];

static RE_BUILT_IN: Lazy<Vec<(Regex, &'static [&'static str])>> = Lazy::new(|| {
    BUILT_IN
        .iter()
        .map(|(key, replies)| {
            let re = Regex::new(&format!(r"\b{}\b", regex::escape(key))).expect("built-in regex");
            (re, *replies)
        })
        .collect()
});

/// One turn of the conversation the front end sends along.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

fn default_role() -> String {
    "user".to_string()
}

/// A text-completion backend.
pub trait TextBackend: Send + Sync + 'static {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        max_tokens: u32,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
    fn name(&self) -> &'static str;
}

/// Chat-completions client for a local model server (llama.cpp, Ollama, ...).
pub struct HttpBackend {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

impl HttpBackend {
    pub fn new(endpoint: &str, model: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("scout-dashboard/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

impl TextBackend for HttpBackend {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        max_tokens: u32,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move {
            #[derive(Serialize)]
            struct Msg<'m> {
                role: &'m str,
                content: &'m str,
            }
            #[derive(Serialize)]
            struct Req<'m> {
                model: &'m str,
                messages: Vec<Msg<'m>>,
                temperature: f32,
                top_p: f32,
                max_tokens: u32,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                content: String,
            }

            let req = Req {
                model: &self.model,
                messages: vec![Msg {
                    role: "user",
                    content: prompt,
                }],
                temperature: 0.7,
                top_p: 0.9,
                max_tokens,
            };
            let url = format!("{}/chat/completions", self.endpoint);
            let resp = match self.http.post(&url).json(&req).send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(target: "assistant", error = %e, "local model request failed");
                    return None;
                }
            };
            if !resp.status().is_success() {
                warn!(target: "assistant", status = %resp.status(), "local model returned an error");
                return None;
            }
            let body: Resp = resp.json().await.ok()?;
            let content = body
                .choices
                .first()
                .map(|c| c.message.content.trim().to_string())
                .unwrap_or_default();
            (!content.is_empty()).then_some(content)
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Fixed-reply backend for tests and offline demos; records every prompt.
#[derive(Default)]
pub struct MockBackend {
    pub reply: Option<String>,
    pub prompts: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new(reply: Option<&str>) -> Self {
        Self {
            reply: reply.map(str::to_string),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl TextBackend for MockBackend {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        _max_tokens: u32,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());
        let out = self.reply.clone();
        Box::pin(async move { out })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    Loading,
    Ready,
    Simulation,
}

struct Inner {
    state: ModelState,
    loading_started: Option<Instant>,
    notice_shown: bool,
    rng: StdRng,
}

pub struct LocalModel {
    backend: Option<Arc<dyn TextBackend>>,
    loading_timeout: Duration,
    inner: Mutex<Inner>,
}

impl LocalModel {
    /// Starts in `Loading` when a backend is given, `Simulation` otherwise.
    /// Call [`LocalModel::load`] (or use [`LocalModel::start`]) to validate it.
    pub fn new(backend: Option<Arc<dyn TextBackend>>, loading_timeout: Duration) -> Self {
        let state = if backend.is_some() {
            ModelState::Loading
        } else {
            ModelState::Simulation
        };
        Self {
            backend,
            loading_timeout,
            inner: Mutex::new(Inner {
                state,
                loading_started: None,
                notice_shown: false,
                rng: StdRng::from_os_rng(),
            }),
        }
    }

    /// No backend: simulation answers only.
    pub fn disabled() -> Arc<Self> {
        Arc::new(Self::new(None, Duration::from_secs(300)))
    }

    /// Validates the backend on a background task. Needs a Tokio runtime.
    pub fn start(backend: Arc<dyn TextBackend>, loading_timeout: Duration) -> Arc<Self> {
        let model = Arc::new(Self::new(Some(backend), loading_timeout));
        let bg = model.clone();
        tokio::spawn(async move { bg.load().await });
        model
    }

    pub fn from_settings(settings: &AiSettings) -> Arc<Self> {
        let timeout = Duration::from_secs(settings.loading_timeout_secs);
        match (settings.use_local_model, settings.local_endpoint.as_deref()) {
            (true, Some(endpoint)) => match HttpBackend::new(endpoint, &settings.local_model) {
                Ok(backend) => {
                    info!(target: "assistant", endpoint, model = %settings.local_model, "loading local model");
                    Self::start(Arc::new(backend), timeout)
                }
                Err(e) => {
                    error!(target: "assistant", error = %e, "could not build local model client");
                    Self::disabled()
                }
            },
            (true, None) => {
                warn!(target: "assistant", "local model enabled without an endpoint; using simulation mode");
                Self::disabled()
            }
            (false, _) => Self::disabled(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends the validation prompt; success → `Ready`, anything else → `Simulation`.
    pub async fn load(&self) {
        let Some(backend) = self.backend.clone() else {
            self.lock().state = ModelState::Simulation;
            return;
        };
        {
            let mut inner = self.lock();
            inner.state = ModelState::Loading;
            inner.loading_started = Some(Instant::now());
        }
        let ok = backend
            .complete(VALIDATION_PROMPT, 30)
            .await
            .is_some_and(|r| !r.trim().is_empty());

        let mut inner = self.lock();
        inner.loading_started = None;
        if ok {
            inner.state = ModelState::Ready;
            info!(target: "assistant", backend = backend.name(), "local model ready");
        } else {
            inner.state = ModelState::Simulation;
            warn!(target: "assistant", backend = backend.name(), "validation failed, operating in simulation mode");
        }
    }

    pub fn state(&self) -> ModelState {
        self.lock().state
    }

    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend.as_ref().map(|b| b.name())
    }

    /// Usable for answers, possibly only in simulation mode.
    pub fn is_ready(&self) -> bool {
        matches!(self.state(), ModelState::Ready | ModelState::Simulation)
    }

    pub fn loading_timed_out(&self) -> bool {
        let inner = self.lock();
        inner.state == ModelState::Loading
            && inner
                .loading_started
                .is_some_and(|t| t.elapsed() > self.loading_timeout)
    }

    /// Canned answer for greetings, "help" and bare team lookups.
    pub fn builtin_response(&self, prompt: &str) -> Option<String> {
        let lower = prompt.trim().to_lowercase();
        for (re, replies) in RE_BUILT_IN.iter() {
            if re.is_match(&lower) {
                let mut inner = self.lock();
                return replies.choose(&mut inner.rng).map(|s| s.to_string());
            }
        }
        if lower.contains("team") {
            if let Some(team) = lower
                .split_whitespace()
                .find(|w| !w.is_empty() && w.chars().all(|c| c.is_ascii_digit()))
            {
                return Some(format!(
                    "I'd be happy to tell you about Team {team}! What specific information would you like to know about their performance?"
                ));
            }
        }
        None
    }

    fn simulate(&self, prompt: &str) -> String {
        {
            let mut inner = self.lock();
            if !inner.notice_shown {
                inner.notice_shown = true;
                return REDUCED_NOTICE.to_string();
            }
        }

        let lower = prompt.to_lowercase();
        let teams: Vec<&str> = RE_SIM_TEAM
            .captures_iter(&lower)
            .filter_map(|c| c.get(1).or_else(|| c.get(2)))
            .map(|m| m.as_str())
            .collect();
        if !teams.is_empty() {
            return format!(
                "I see you're asking about Team {}. In my current mode, I can't perform advanced analysis, but I can help you find basic information about them if you have specific questions.",
                teams.join(", ")
            );
        }
        if lower.contains("compare") {
            return "I'd like to help you compare teams, but I'm currently running in basic mode. You can still use the team comparison tool in the interface to see detailed performance data.".to_string();
        }
        if lower.contains("strategy") {
            return "Strategy development is important! While I'm in basic mode, I can suggest focusing on teams with complementary capabilities - strong autonomous performers paired with good endgame climbers often make good alliance partners.".to_string();
        }
        "I understand you're asking for assistance. While I'm running in basic mode, I can still help with simple questions about teams and scouting. Feel free to ask about specific team numbers.".to_string()
    }

    /// Answer for one user prompt with optional system prompt and history.
    pub async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        history: &[ChatMessage],
    ) -> String {
        if let Some(reply) = self.builtin_response(prompt) {
            debug!(target: "assistant", query = %anon_hash(prompt), "built-in response");
            return reply;
        }

        match self.state() {
            ModelState::Simulation => return self.simulate(prompt),
            ModelState::Loading if self.loading_timed_out() => return LOAD_TIMED_OUT.to_string(),
            ModelState::Loading => return STILL_LOADING.to_string(),
            ModelState::Ready => {}
        }
        let Some(backend) = &self.backend else {
            return self.simulate(prompt);
        };

        let formatted = format_prompt(prompt, system_prompt, history);
        let formatted = truncate_chars(&formatted, MAX_PROMPT_CHARS);
        match backend.complete(formatted, MAX_NEW_TOKENS).await {
            Some(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => {
                warn!(target: "assistant", query = %anon_hash(prompt), "empty generation");
                self.builtin_response(prompt)
                    .unwrap_or_else(|| EMPTY_FALLBACK.to_string())
            }
        }
    }
}

/// `System:` / `User:` / `Assistant:` transcript ending with an open assistant turn.
pub fn format_prompt(prompt: &str, system_prompt: Option<&str>, history: &[ChatMessage]) -> String {
    let mut out = String::new();
    if let Some(sys) = system_prompt.filter(|s| !s.trim().is_empty()) {
        out.push_str(&format!("System: {sys}\n\n"));
    }
    let recent = &history[history.len().saturating_sub(HISTORY_MESSAGES)..];
    for msg in recent {
        let speaker = if msg.role == "user" { "User" } else { "Assistant" };
        out.push_str(&format!("{speaker}: {}\n", msg.content));
    }
    out.push_str(&format!("User: {prompt}\nAssistant:"));
    out
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => {
            warn!(target: "assistant", from = text.chars().count(), to = max, "truncating prompt");
            &text[..idx]
        }
        None => text,
    }
}
