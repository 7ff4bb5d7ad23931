//! Conversational responder: intent → canned template, with a little
//! personality and a short memory of the conversation.

use chrono::{Local, Utc};
use rand::{rngs::StdRng, seq::IndexedRandom, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

use super::{
    anon_hash,
    intent::{detect_intent, extract_match_number, extract_team_numbers, Intent},
    Standings,
};
use crate::lists::write_atomic;

pub const ASSISTANT_NAME: &str = "Bob";
pub const MEMORY_SIZE: usize = 10;
pub const SESSION_FILE: &str = "assistant_session.json";
const SAVE_EVERY: u64 = 10;

pub(crate) const GREETINGS: &[&str] = &[
    "Hi there! I'm Bob, your scouting assistant. What can I help you with today?",
    "Hello! Bob here, ready to help with your scouting questions.",
    "Hey! I'm Bob, your AI scouting buddy. What would you like to know?",
    "Greetings! Bob at your service. How can I assist with your scouting needs?",
];

const TEAM_INFO: &[&str] = &[
    "Let me pull up the information for team {}...",
    "Looking up team {}'s stats for you...",
    "Accessing data for team {}, one moment...",
    "I'll get you the details on team {} right away...",
];

const COMPARE_INTRO: &[&str] = &[
    "Let's compare teams {}...",
    "I'll analyze the performance of teams {} for you...",
    "Comparing teams {} now...",
    "Let me break down the comparison between teams {}...",
];

const UNKNOWN: &[&str] = &[
    "I'm not sure I understand. Could you rephrase that?",
    "I didn't quite catch that. Can you ask in a different way?",
    "I'm still learning, and I'm not sure what you're asking. Could you try rewording your question?",
    "I don't have enough information to answer that question yet.",
];

pub(crate) const JOKES: &[&str] = &[
    "Why did the robot go back to robot school? Because its skills were getting a little rusty!",
    "What do you call a robot that always takes the scenic route? A meandroid!",
    "How do robots eat pizza? One byte at a time!",
    "Why was the robot so tired? It had a hard drive!",
    "What do you call a robot that can't tell a joke? Humor-less!",
    "Why are robots never afraid? Because they have nerves of steel!",
    "What's a robot's favorite type of music? Heavy metal!",
    "What do you get when you cross a robot with a tractor? A trans-farmer!",
    "How does a robot make a decision? It uses its algo-rhythm!",
    "Why did the robot apply for the job? It was well-programmed for it!",
];

struct Trait {
    phrases: &'static [&'static str],
    frequency: f64,
}

const TRAITS: &[Trait] = &[
    Trait {
        phrases: &["Wow!", "Amazing!", "That's impressive!", "Fascinating!"],
        frequency: 0.3,
    },
    Trait {
        phrases: &["Interestingly,", "Notably,", "The data suggests that", "Analysis shows"],
        frequency: 0.4,
    },
    Trait {
        phrases: &[
            "I'd recommend looking at",
            "You might want to consider",
            "It would be beneficial to focus on",
            "Let me help you understand",
        ],
        frequency: 0.5,
    },
];

#[derive(Debug, Clone, Serialize)]
pub struct MemoryEntry {
    pub query: String,
    pub response: String,
    pub timestamp: String,
}

#[derive(Debug, Default)]
struct Context {
    current_teams: Vec<u32>,
    last_query: Option<String>,
    current_topic: Option<Intent>,
    conversation_depth: u64,
    session_analytics: BTreeMap<String, u64>,
    mentioned_teams: BTreeSet<u32>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct SessionFile {
    #[serde(default)]
    session_analytics: BTreeMap<String, u64>,
    #[serde(default)]
    last_updated: Option<String>,
}

/// Serialized analytics waiting to be written outside the assistant lock.
#[derive(Debug)]
pub struct SessionSnapshot {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl SessionSnapshot {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocking write; call from `spawn_blocking` inside async handlers.
    pub fn write(&self) -> anyhow::Result<()> {
        write_atomic(&self.path, &self.bytes)
    }
}

pub struct Assistant {
    rng: StdRng,
    memory: VecDeque<MemoryEntry>,
    context: Context,
    session_path: Option<PathBuf>,
    save_due: bool,
}

impl Assistant {
    /// `session_path` is where per-intent analytics are kept between runs.
    pub fn new(session_path: Option<PathBuf>) -> Self {
        Self::build(StdRng::from_os_rng(), session_path)
    }

    /// Deterministic phrasing for tests.
    pub fn with_seed(seed: u64, session_path: Option<PathBuf>) -> Self {
        Self::build(StdRng::seed_from_u64(seed), session_path)
    }

    fn build(rng: StdRng, session_path: Option<PathBuf>) -> Self {
        let mut assistant = Self {
            rng,
            memory: VecDeque::with_capacity(MEMORY_SIZE),
            context: Context::default(),
            session_path,
            save_due: false,
        };
        assistant.load_session();
        info!(target: "assistant", name = ASSISTANT_NAME, "assistant initialized");
        assistant
    }

    fn load_session(&mut self) {
        let Some(path) = &self.session_path else { return };
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!(target: "assistant", path = %path.display(), error = %e, "could not read session data");
                return;
            }
        };
        match serde_json::from_str::<SessionFile>(&text) {
            Ok(saved) => {
                let n = saved.session_analytics.len();
                for (topic, count) in saved.session_analytics {
                    *self.context.session_analytics.entry(topic).or_default() += count;
                }
                info!(target: "assistant", entries = n, "loaded previous session analytics");
            }
            Err(e) => warn!(target: "assistant", error = %e, "ignoring unreadable session data"),
        }
    }

    fn snapshot(&self) -> Option<SessionSnapshot> {
        let path = self.session_path.as_ref()?;
        let data = SessionFile {
            session_analytics: self.context.session_analytics.clone(),
            last_updated: Some(Local::now().to_rfc3339()),
        };
        match serde_json::to_vec(&data) {
            Ok(bytes) => Some(SessionSnapshot {
                path: path.clone(),
                bytes,
            }),
            Err(e) => {
                warn!(target: "assistant", error = %e, "could not serialize session data");
                None
            }
        }
    }

    /// Snapshot owed to disk since the last call, every `SAVE_EVERY` replies.
    pub fn take_pending_save(&mut self) -> Option<SessionSnapshot> {
        if !std::mem::take(&mut self.save_due) {
            return None;
        }
        self.snapshot()
    }

    pub fn memory(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.memory.iter()
    }

    pub fn analytics(&self) -> &BTreeMap<String, u64> {
        &self.context.session_analytics
    }

    pub fn mentioned_teams(&self) -> &BTreeSet<u32> {
        &self.context.mentioned_teams
    }

    pub fn current_teams(&self) -> &[u32] {
        &self.context.current_teams
    }

    pub fn current_topic(&self) -> Option<Intent> {
        self.context.current_topic
    }

    pub fn last_query(&self) -> Option<&str> {
        self.context.last_query.as_deref()
    }

    pub fn conversation_depth(&self) -> u64 {
        self.context.conversation_depth
    }

    /// Gives the rule table access to the same randomness source.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    fn pick(&mut self, options: &[&'static str]) -> &'static str {
        options.choose(&mut self.rng).copied().unwrap_or("")
    }

    /// Answers one query. `team_data` are teams the front end has in focus;
    /// `standings` lets answers quote real ranks.
    pub fn respond(&mut self, query: &str, team_data: &[u32], standings: Option<&Standings>) -> String {
        if !team_data.is_empty() {
            self.context.current_teams = team_data.to_vec();
            self.context.mentioned_teams.extend(team_data.iter().copied());
        }

        let intent = detect_intent(query);
        *self
            .context
            .session_analytics
            .entry(intent.as_str().to_string())
            .or_default() += 1;

        let teams = extract_team_numbers(query);
        self.context.mentioned_teams.extend(teams.iter().copied());
        self.context.last_query = Some(query.to_string());
        self.context.current_topic = Some(intent);
        if !teams.is_empty() {
            self.context.current_teams = teams.clone();
        }
        debug!(target: "assistant", query = %anon_hash(query), intent = intent.as_str(), "classified query");

        let standings = standings.filter(|s| !s.is_empty());
        let response = match intent {
            Intent::Greeting => self.pick(GREETINGS).to_string(),
            Intent::TeamInfo | Intent::TeamInfoFallback => self.team_info(&teams, standings),
            Intent::MultipleTeamInfo => {
                let list = join_teams(&teams);
                let mut r = self.pick(TEAM_INFO).replace("{}", &list);
                r.push_str(&format!(
                    "\n\nI'll show you data for teams {list}. What specific metrics are you interested in?"
                ));
                if let Some(s) = standings {
                    r.push_str(&rank_lines(&teams, s));
                }
                r
            }
            Intent::CompareTeams => self.compare(&teams, standings),
            Intent::Rankings => rankings(standings),
            Intent::MatchInfo => match extract_match_number(query) {
                Some(m) => {
                    let mut r = format!("Here's the information for match {m}:");
                    r.push_str(&format!(
                        "\n\nMatch {m} data is in the Match Data view for each team."
                    ));
                    if let Some(team) = teams.iter().find(|t| **t != m) {
                        r.push_str(&format!(
                            "\n\nI can show you specifically how team {team} performed in this match if you'd like."
                        ));
                    }
                    r
                }
                None => "Which match number are you interested in?".to_string(),
            },
            Intent::Strategy => strategy(&teams),
            Intent::Joke => {
                let joke = self.pick(JOKES).to_string();
                self.remember(query, &joke);
                return joke;
            }
            Intent::Capabilities => capabilities(),
            Intent::Thanks => "You're welcome! I'm happy to help with your scouting needs. Is there anything else you'd like to know?".to_string(),
            Intent::AboutAssistant => format!(
                "I'm {ASSISTANT_NAME}, an AI scouting assistant designed to help you analyze team performance data and make strategic decisions for your robotics competitions. I can provide information about teams, compare performance metrics, suggest strategies, and more!"
            ),
            Intent::Unknown => self.pick(UNKNOWN).to_string(),
        };

        let response = self.add_personality(response, intent);
        self.remember(query, &response);
        response
    }

    fn team_info(&mut self, teams: &[u32], standings: Option<&Standings>) -> String {
        let Some(&team) = teams.first() else {
            return "I didn't catch which team you're asking about. Could you specify the team number?".to_string();
        };
        let mut r = self.pick(TEAM_INFO).replace("{}", &team.to_string());
        match standings.and_then(|s| s.rank_of(team).map(|(rank, score)| (rank, score, s.ranking.len()))) {
            Some((rank, score, of)) => r.push_str(&format!(
                "\n\nTeam {team} is currently ranked #{rank} of {of} with a total score of {score:.1}. You can ask me specific questions about their performance metrics."
            )),
            None => r.push_str(&format!(
                "\n\nI don't have scouting data for team {team} yet. Once they are scouted you can ask me specific questions about their performance metrics."
            )),
        }
        r
    }

    fn compare(&mut self, teams: &[u32], standings: Option<&Standings>) -> String {
        let list = join_teams(teams);
        let mut r = self.pick(COMPARE_INTRO).replace("{}", &list);
        match standings {
            Some(s) => r.push_str(&rank_lines(teams, s)),
            None => r.push_str(&format!(
                "\n\nComparison data for teams {list} will be available once they have been scouted."
            )),
        }
        r.push_str("\n\nWhen comparing teams, I look at several key metrics:");
        r.push_str("\n- Scoring capability in auto and teleop phases");
        r.push_str("\n- Consistency across matches");
        r.push_str("\n- Defense capabilities");
        r.push_str("\n- Specialized features like endgame actions");

        let ranked: Vec<(u32, usize)> = standings
            .map(|s| {
                teams
                    .iter()
                    .filter_map(|t| s.rank_of(*t).map(|(rank, _)| (*t, rank)))
                    .collect()
            })
            .unwrap_or_default();
        if let Some((best, _)) = ranked.iter().min_by_key(|(_, rank)| *rank) {
            r.push_str(&format!(
                "\n\nOn total score, Team {best} currently has the edge."
            ));
        } else if teams.len() >= 2 {
            r.push_str(&format!(
                "\n\nFor example, Team {} might excel at autonomous scoring, while Team {} might be stronger in teleop.",
                teams[0], teams[1]
            ));
        }
        r
    }

    fn add_personality(&mut self, response: String, intent: Intent) -> String {
        if response.len() < 20
            || matches!(intent, Intent::Greeting | Intent::Thanks | Intent::Unknown)
        {
            return response;
        }
        for t in TRAITS {
            if self.rng.random::<f64>() < t.frequency {
                let phrase = t.phrases.choose(&mut self.rng).copied().unwrap_or("");
                let mut sentences = split_sentences(&response);
                if sentences.len() > 1 {
                    sentences[1] = format!("{phrase} {}", sentences[1]);
                    return sentences.join(" ");
                }
                return format!("{phrase} {response}");
            }
        }
        response
    }

    fn remember(&mut self, query: &str, response: &str) {
        if self.memory.len() == MEMORY_SIZE {
            self.memory.pop_front();
        }
        self.memory.push_back(MemoryEntry {
            query: query.to_string(),
            response: response.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        });
        self.context.conversation_depth += 1;
        if self.context.conversation_depth % SAVE_EVERY == 0 {
            self.save_due = true;
        }
    }
}

fn join_teams(teams: &[u32]) -> String {
    teams
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn rank_lines(teams: &[u32], standings: &Standings) -> String {
    let mut out = String::new();
    for team in teams {
        match standings.rank_of(*team) {
            Some((rank, score)) => {
                out.push_str(&format!("\n- Team {team}: rank #{rank}, {score:.1} points"))
            }
            None => out.push_str(&format!("\n- Team {team}: no scouting data yet")),
        }
    }
    if !out.is_empty() {
        out.insert_str(0, "\n");
    }
    out
}

fn rankings(standings: Option<&Standings>) -> String {
    let mut r = "Here's the current team ranking based on overall performance:".to_string();
    match standings {
        Some(s) => {
            r.push('\n');
            for (i, (team, score)) in s.top(5).iter().enumerate() {
                r.push_str(&format!("\n{}) Team {team}: {score:.1} points", i + 1));
            }
        }
        None => r.push_str("\n\nNo match data has been loaded yet, so there is nothing to rank."),
    }
    r.push_str("\n\nThese rankings take into account autonomous performance, teleop scoring, and endgame points.");
    r
}

fn strategy(teams: &[u32]) -> String {
    if teams.is_empty() {
        return "I can help you develop strategies based on team data. Which teams are you interested in?".to_string();
    }
    let mut r = format!("Let's talk strategy for team(s) {}.", join_teams(teams));
    r.push_str("\n\nWhen developing a strategy, I consider:");
    r.push_str("\n- Team specializations and strengths");
    r.push_str("\n- Complementary alliance members");
    r.push_str("\n- Opponent capabilities");
    r.push_str("\n- Match objectives and scoring opportunities");
    r
}

fn capabilities() -> String {
    let mut r = format!("I'm {ASSISTANT_NAME}, your AI scouting assistant. Here's what I can help you with:");
    for line in [
        "Provide information about specific teams",
        "Compare multiple teams' performance",
        "Show team rankings",
        "Analyze match data",
        "Suggest alliance selections and strategies",
        "Answer questions about scouting metrics",
    ] {
        r.push_str("\n- ");
        r.push_str(line);
    }
    r.push_str("\n\nJust ask me about any team by their number, or ask to compare teams!");
    r
}

/// Splits after `.`, `!` or `?` followed by whitespace; the whitespace is dropped.
fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_some_and(|n| n.is_whitespace()) {
            while chars.peek().is_some_and(|n| n.is_whitespace()) {
                chars.next();
            }
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() || out.is_empty() {
        out.push(current);
    }
    out
}
