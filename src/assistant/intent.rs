//! Regex intent classification for free-text questions.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static RE_TEAM_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:team\s*#?\s*)?(\d{1,4})\b").expect("team number regex"));
static RE_MATCH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:match|game)\s*#?\s*(\d{1,3})\b").expect("match regex"));
static RE_COMPARISON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:compare|vs|versus|against|better than|compared to|comparison)")
        .expect("comparison regex")
});

fn word_regex(words: &str) -> Regex {
    Regex::new(&format!(r"\b(?:{words})\b")).expect("intent regex")
}

static RE_GREETING: Lazy<Regex> = Lazy::new(|| word_regex("hi|hello|hey|greetings|howdy"));
static RE_TEAM_INFO: Lazy<Regex> = Lazy::new(|| {
    word_regex("info|information|about|tell me|stats|statistics|performance|how is|how are")
});
static RE_RANKINGS: Lazy<Regex> =
    Lazy::new(|| word_regex("rank|ranking|rankings|best|top|strongest|highest"));
static RE_STRATEGY: Lazy<Regex> = Lazy::new(|| {
    word_regex("strategy|strategies|approach|tactic|tactical|plan|alliance|pick|selection")
});
static RE_JOKE: Lazy<Regex> = Lazy::new(|| word_regex("joke|funny|humor|laugh"));
static RE_CAPABILITIES: Lazy<Regex> =
    Lazy::new(|| word_regex("help|what can you do|capabilities|functions|assist|how to use"));
static RE_THANKS: Lazy<Regex> =
    Lazy::new(|| word_regex("thanks|thank you|appreciate|helpful|great job"));
static RE_ABOUT: Lazy<Regex> = Lazy::new(|| word_regex("who are you|your name|about you"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    TeamInfo,
    MultipleTeamInfo,
    CompareTeams,
    Rankings,
    MatchInfo,
    Strategy,
    Joke,
    Capabilities,
    Thanks,
    AboutAssistant,
    TeamInfoFallback,
    Unknown,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Greeting => "greeting",
            Intent::TeamInfo => "team_info",
            Intent::MultipleTeamInfo => "multiple_team_info",
            Intent::CompareTeams => "compare_teams",
            Intent::Rankings => "rankings",
            Intent::MatchInfo => "match_info",
            Intent::Strategy => "strategy",
            Intent::Joke => "joke",
            Intent::Capabilities => "capabilities",
            Intent::Thanks => "thanks",
            Intent::AboutAssistant => "about_assistant",
            Intent::TeamInfoFallback => "team_info_fallback",
            Intent::Unknown => "unknown",
        }
    }
}

/// Numbers in 1..=9999, optionally written as `team #NNNN`.
pub fn extract_team_numbers(text: &str) -> Vec<u32> {
    RE_TEAM_NUMBER
        .captures_iter(&text.to_lowercase())
        .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
        .filter(|n| (1..=9999).contains(n))
        .collect()
}

pub fn extract_match_number(text: &str) -> Option<u32> {
    RE_MATCH
        .captures(&text.to_lowercase())
        .and_then(|c| c.get(1)?.as_str().parse().ok())
}

/// First matching rule wins; the order matters.
pub fn detect_intent(text: &str) -> Intent {
    let q = text.to_lowercase();
    let teams = extract_team_numbers(&q);

    if RE_GREETING.is_match(&q) {
        return Intent::Greeting;
    }
    if !teams.is_empty() && RE_TEAM_INFO.is_match(&q) {
        return if teams.len() == 1 {
            Intent::TeamInfo
        } else {
            Intent::MultipleTeamInfo
        };
    }
    if teams.len() > 1 && RE_COMPARISON.is_match(&q) {
        return Intent::CompareTeams;
    }
    if RE_RANKINGS.is_match(&q) {
        return Intent::Rankings;
    }
    if RE_MATCH.is_match(&q) {
        return Intent::MatchInfo;
    }
    if RE_STRATEGY.is_match(&q) {
        return Intent::Strategy;
    }
    if RE_JOKE.is_match(&q) {
        return Intent::Joke;
    }
    if RE_CAPABILITIES.is_match(&q) {
        return Intent::Capabilities;
    }
    if RE_THANKS.is_match(&q) {
        return Intent::Thanks;
    }
    if RE_ABOUT.is_match(&q) {
        return Intent::AboutAssistant;
    }
    if !teams.is_empty() {
        return Intent::TeamInfoFallback;
    }
    Intent::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_team_numbers_in_range() {
        assert_eq!(extract_team_numbers("Team #5454 vs 254"), vec![5454, 254]);
        assert_eq!(extract_team_numbers("team 0 and 12345"), Vec::<u32>::new());
        assert_eq!(extract_team_numbers("no numbers here"), Vec::<u32>::new());
    }

    #[test]
    fn extracts_match_numbers() {
        assert_eq!(extract_match_number("what happened in Match #12"), Some(12));
        assert_eq!(extract_match_number("game 3 recap"), Some(3));
        assert_eq!(extract_match_number("team 5454"), None);
    }

    #[test]
    fn intents_follow_rule_order() {
        let cases = [
            ("hello bob", Intent::Greeting),
            ("tell me about team 5454", Intent::TeamInfo),
            ("stats for 5454 and 254", Intent::MultipleTeamInfo),
            ("compare 5454 vs 254", Intent::CompareTeams),
            ("who is the best climber", Intent::Rankings),
            ("recap match 7", Intent::MatchInfo),
            ("what alliance should we form", Intent::Strategy),
            ("say something funny", Intent::Joke),
            ("what can you do", Intent::Capabilities),
            ("thanks a lot", Intent::Thanks),
            ("who are you", Intent::AboutAssistant),
            ("5454?", Intent::TeamInfoFallback),
            ("purple elephants", Intent::Unknown),
        ];
        for (text, expected) in cases {
            assert_eq!(detect_intent(text), expected, "{text}");
        }
    }

    #[test]
    fn greeting_needs_a_whole_word() {
        assert_ne!(detect_intent("which one"), Intent::Greeting);
        assert_eq!(detect_intent("Hi!"), Intent::Greeting);
    }
}
