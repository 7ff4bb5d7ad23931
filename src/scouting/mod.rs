//! Match-data analysis: reading the scouting workbook, scoring rows and
//! aggregating per team.

pub mod aggregate;
pub mod scoring;
pub mod sheet;

pub use aggregate::{
    all_notes, all_team_averages, all_teams, compare_teams, defense_scores, match_data,
    predict_match, team_averages, team_match_counts, team_rankings, write_snapshot, Ordered,
};
pub use scoring::{score_row, RowScorer};
pub use sheet::{read_workbook, Cell, MatchSheet, MATCH_SHEET};

/// Failure while turning workbook rows into answers.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("The Excel file was not found.")]
    MissingWorkbook,
    /// The request was fine but nothing matched (unknown team, ...).
    #[error("{0}")]
    NotFound(String),
    /// The request or the workbook layout cannot be used.
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Parse a team number typed by a user; `0` and non-digits are rejected.
pub fn parse_team_number(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    raw.parse::<u32>().ok().filter(|t| *t != 0)
}
