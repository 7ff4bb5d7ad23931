//! Quick keyword table behind the chat widget's reply envelope.

use once_cell::sync::Lazy;
use rand::{seq::IndexedRandom, Rng};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::responder::{GREETINGS, JOKES};

/// What `/ai_query` sends back to the chat widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub response: String,
    pub source: &'static str,
    pub chart_type: Option<String>,
    pub chart_data: Option<Value>,
    pub suggested_queries: Vec<String>,
}

impl Reply {
    fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            source: "rule_based",
            chart_type: None,
            chart_data: None,
            suggested_queries: Vec::new(),
        }
    }

    fn suggest(mut self, queries: &[&str]) -> Self {
        self.suggested_queries = queries.iter().map(|q| q.to_string()).collect();
        self
    }
}

fn any_of(terms: &[&str]) -> Regex {
    let alternation = terms.iter().map(|t| regex::escape(t)).collect::<Vec<_>>().join("|");
    Regex::new(&format!(r"\b(?:{alternation})\b")).expect("keyword regex")
}

static KW_TEAM: Lazy<Regex> =
    Lazy::new(|| any_of(&["team", "data for", "info on", "tell me about"]));
static KW_HELP: Lazy<Regex> =
    Lazy::new(|| any_of(&["help", "what can you do", "how do i", "how to"]));
static KW_PREDICT: Lazy<Regex> =
    Lazy::new(|| any_of(&["predict", "match", "alliance", "who will win"]));
static KW_SCOUT: Lazy<Regex> = Lazy::new(|| any_of(&["scout", "scouting", "observe", "watch for"]));
static KW_CHART: Lazy<Regex> =
    Lazy::new(|| any_of(&["chart", "graph", "plot", "visual", "compare"]));
static KW_GREETING: Lazy<Regex> =
    Lazy::new(|| any_of(&["hi", "hello", "hey", "greetings", "howdy"]));
static KW_JOKE: Lazy<Regex> = Lazy::new(|| any_of(&["joke", "funny", "humorous", "laugh"]));
static KW_ABOUT: Lazy<Regex> = Lazy::new(|| any_of(&["who are you", "your name", "about you"]));
static KW_THANKS: Lazy<Regex> =
    Lazy::new(|| any_of(&["thanks", "thank you", "appreciate", "helpful"]));

/// First matching keyword group decides the reply.
pub fn keyword_reply<R: Rng + ?Sized>(query: &str, team_mentions: &[u32], rng: &mut R) -> Reply {
    let q = query.to_lowercase();

    if let (true, Some(team)) = (KW_TEAM.is_match(&q), team_mentions.first()) {
        let mut reply = Reply::new(format!(
            "Team {team} data is available in the Team Analysis section. Please check there for detailed information."
        ));
        reply.suggested_queries = vec![
            format!("What are Team {team}'s strengths?"),
            format!("How many matches has Team {team} played?"),
            "Compare two teams".to_string(),
        ];
        return reply;
    }

    if KW_HELP.is_match(&q) {
        return Reply::new(
            "I can help with team data analysis, match predictions, and scouting information. \
             You can ask me about specific teams, compare teams, or get advice on scouting.",
        )
        .suggest(&[
            "Show me top scoring teams",
            "How to use the team comparison feature",
            "Explain the ranking system",
        ]);
    }

    if KW_PREDICT.is_match(&q) {
        return Reply::new(
            "Match predictions are available in the Match Predictor tab. I can help you analyze team strengths to form optimal alliances.",
        );
    }

    if KW_SCOUT.is_match(&q) {
        return Reply::new(
            "When scouting, focus on robot capabilities, reliability, and strategy. Remember to note any special features or issues observed.",
        )
        .suggest(&[
            "What to look for when scouting defense",
            "How to record robot breakdowns",
            "Important match metrics",
        ]);
    }

    if KW_CHART.is_match(&q) {
        let mut reply = Reply::new(
            "Charts and visualizations are available in the Team Analysis section. You can generate various charts to visualize team performance.",
        );
        reply.chart_type = Some("none".to_string());
        return reply;
    }

    if KW_GREETING.is_match(&q) {
        return Reply::new(*GREETINGS.choose(rng).unwrap_or(&GREETINGS[0]));
    }

    if KW_JOKE.is_match(&q) {
        return Reply::new(*JOKES.choose(rng).unwrap_or(&JOKES[0]));
    }

    if KW_ABOUT.is_match(&q) {
        return Reply::new(
            "I'm Bob, the AI scouting assistant for your team! I can help analyze performance data, compare teams, and provide insights for your scouting needs.",
        );
    }

    if KW_THANKS.is_match(&q) {
        return Reply::new(
            "You're welcome! I'm happy to help with your scouting needs. Is there anything else you'd like to know?",
        );
    }

    Reply::new(
        "I can help with team performance analysis, match strategies, and scouting insights. \
         Could you tell me which team you're interested in, or what specific information you need?",
    )
    .suggest(&["Show me top teams", "How to use this app", "Explain scoring rules"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn reply(q: &str, teams: &[u32]) -> Reply {
        keyword_reply(q, teams, &mut StdRng::seed_from_u64(7))
    }

    #[test]
    fn team_question_needs_a_mention() {
        let r = reply("tell me about this team", &[5454]);
        assert!(r.response.starts_with("Team 5454 data"));
        assert_eq!(r.suggested_queries.len(), 3);
        assert_eq!(r.source, "rule_based");

        let r = reply("tell me about this team", &[]);
        assert!(!r.response.starts_with("Team"));
    }

    #[test]
    fn help_and_chart_groups() {
        assert!(reply("how do I use this", &[]).response.starts_with("I can help with team data"));
        let chart = reply("show me a graph", &[]);
        assert_eq!(chart.chart_type.as_deref(), Some("none"));
    }

    #[test]
    fn greeting_and_joke_come_from_tables() {
        assert!(GREETINGS.contains(&reply("hey there", &[]).response.as_str()));
        assert!(JOKES.contains(&reply("tell me a joke", &[]).response.as_str()));
    }

    #[test]
    fn short_terms_match_whole_words_only() {
        // "this" must not count as "hi"
        let r = reply("is this working", &[]);
        assert_eq!(r.suggested_queries[0], "Show me top teams");
    }

    #[test]
    fn phrase_terms_match_as_one_pattern() {
        assert!(reply("what can you do?", &[]).response.starts_with("I can help with team data"));
        assert!(reply("who will win", &[]).response.starts_with("Match predictions"));
        assert!(reply("what to watch for", &[]).response.starts_with("When scouting"));
        // "matchup" is not the word "match"
        assert_eq!(reply("matchup", &[]).suggested_queries[0], "Show me top teams");
    }

    #[test]
    fn envelope_serializes_all_fields() {
        let v = serde_json::to_value(reply("thanks", &[])).unwrap();
        for key in ["response", "source", "chart_type", "chart_data", "suggested_queries"] {
            assert!(v.get(key).is_some(), "{key}");
        }
        assert!(v["chart_data"].is_null());
    }
}
