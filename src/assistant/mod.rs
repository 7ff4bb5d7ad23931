//! "Bob", the scouting assistant behind `/ai_query`.

pub mod generator;
pub mod intent;
pub mod responder;
pub mod rules;

pub use generator::{ChatMessage, HttpBackend, LocalModel, ModelState, TextBackend};
pub use intent::{detect_intent, extract_match_number, extract_team_numbers, Intent};
pub use responder::Assistant;
pub use rules::{keyword_reply, Reply};

use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Short stable id for a user query so logs never carry the raw text.
pub(crate) fn anon_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in &digest[..6] {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Current ranking, best first, as `(team, total score)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Standings {
    pub ranking: Vec<(u32, f64)>,
}

impl Standings {
    pub fn new(ranking: Vec<(u32, f64)>) -> Self {
        Self { ranking }
    }

    /// 1-based rank and score.
    pub fn rank_of(&self, team: u32) -> Option<(usize, f64)> {
        self.ranking
            .iter()
            .position(|(t, _)| *t == team)
            .map(|i| (i + 1, self.ranking[i].1))
    }

    pub fn top(&self, n: usize) -> &[(u32, f64)] {
        &self.ranking[..n.min(self.ranking.len())]
    }

    pub fn is_empty(&self) -> bool {
        self.ranking.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anon_hash_is_short_and_stable() {
        let a = anon_hash("tell me about 5454");
        assert_eq!(a.len(), 12);
        assert_eq!(a, anon_hash("tell me about 5454"));
        assert_ne!(a, anon_hash("tell me about 254"));
    }

    #[test]
    fn standings_lookup() {
        let s = Standings::new(vec![(5454, 62.0), (254, 7.0)]);
        assert_eq!(s.rank_of(254), Some((2, 7.0)));
        assert_eq!(s.rank_of(118), None);
        assert_eq!(s.top(5).len(), 2);
        assert_eq!(s.top(1), &[(5454, 62.0)]);
    }
}
