//! Per-row point formula.
//!
//! Every rule in `scoring_rules` contributes independently:
//! * lookup tables score the rounded cell value,
//! * weights on `(T/F)` columns score once when the cell is truthy,
//! * other weights multiply the numeric cell value.
//!
//! Blank and non-numeric cells contribute nothing.

use crate::config::{ScoringRule, ScoringRules};

use super::sheet::{Cell, MatchSheet};

pub fn is_boolean_column(name: &str) -> bool {
    name.trim_end().ends_with("(T/F)")
}

/// Points one cell earns under one rule.
pub fn cell_points(column: &str, rule: &ScoringRule, cell: &Cell) -> f64 {
    match rule {
        ScoringRule::Lookup(_) => cell
            .as_f64()
            .and_then(|v| rule.lookup(v.round() as i64))
            .unwrap_or(0.0),
        ScoringRule::Weight(w) if is_boolean_column(column) => {
            if cell.as_bool() {
                *w
            } else {
                0.0
            }
        }
        ScoringRule::Weight(w) => cell.as_f64().map(|v| v * w).unwrap_or(0.0),
    }
}

/// Scoring rules resolved against a sheet's headers once, then applied per row.
pub struct RowScorer<'a> {
    columns: Vec<(usize, &'a str, &'a ScoringRule)>,
}

impl<'a> RowScorer<'a> {
    pub fn new(sheet: &MatchSheet, rules: &'a ScoringRules) -> Self {
        let columns = rules
            .iter()
            .filter_map(|(name, rule)| {
                sheet
                    .column_index(name)
                    .map(|idx| (idx, name.as_str(), rule))
            })
            .collect();
        Self { columns }
    }

    pub fn score(&self, row: &[Cell]) -> f64 {
        self.columns
            .iter()
            .map(|(idx, name, rule)| {
                let cell = row.get(*idx).unwrap_or(&Cell::Empty);
                cell_points(name, rule, cell)
            })
            .sum()
    }
}

pub fn score_row(sheet: &MatchSheet, row: &[Cell], rules: &ScoringRules) -> f64 {
    RowScorer::new(sheet, rules).score(row)
}
