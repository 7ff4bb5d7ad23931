//! Per-team aggregates served by the dashboard.
//!
//! Every function works on an in-memory [`MatchSheet`] and recomputes from
//! scratch; rows whose team cell is blank, zero or non-numeric are ignored.

use anyhow::Context;
use serde::{ser::SerializeMap, Serialize, Serializer};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, fs, path::Path};
use tracing::debug;

use crate::config::{GameConfig, ScoringRule, ScoringRules};

use super::{
    parse_team_number,
    scoring::{is_boolean_column, RowScorer},
    sheet::{max, mean, Cell, MatchSheet},
    DataError,
};

const TEAM_NUMBER: &str = "Team Number";
const MATCH_NUMBER: &str = "Match Number";
const SCOUTER_NAME: &str = "Scouter Name";
const OBSERVATIONS: &str = "Additional Observations";

/// Key/value pairs that serialize as a JSON object in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct Ordered<K, V>(pub Vec<(K, V)>);

impl<K, V> Default for Ordered<K, V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<K: PartialEq, V> Ordered<K, V> {
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: PartialEq<Q>,
        Q: ?Sized,
    {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.0.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Serialize, V: Serialize> Serialize for Ordered<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Column → averaged value (`None` when the team never filled it in).
pub type ColumnAverages = Ordered<String, Option<f64>>;

fn team_index(sheet: &MatchSheet, cfg: &GameConfig) -> Result<usize, DataError> {
    sheet
        .resolve_column(&cfg.team_column, cfg.alternates_for(&cfg.team_column))
        .or_else(|| sheet.column_index(TEAM_NUMBER))
        .or_else(|| sheet.column_index("Team"))
        .ok_or_else(|| {
            DataError::Other(anyhow::anyhow!(
                "{} column not found in Excel file",
                cfg.team_column
            ))
        })
}

fn is_lookup(cfg: &GameConfig, column: &str) -> bool {
    cfg.scoring_rules
        .get(column)
        .is_some_and(ScoringRule::is_lookup)
}

/// Lookup-scored columns report the best value, everything else the mean.
fn summarize(cfg: &GameConfig, column: &str, values: impl IntoIterator<Item = f64>) -> Option<f64> {
    if is_lookup(cfg, column) {
        max(values)
    } else {
        mean(values)
    }
}

/// Averages for one team over the include columns and their alternate spellings.
pub fn team_averages(
    sheet: &MatchSheet,
    cfg: &GameConfig,
    team: u32,
) -> Result<ColumnAverages, DataError> {
    let team_col = team_index(sheet, cfg)?;

    // (sheet column, name reported back)
    let mut columns: Vec<(usize, &str)> = cfg
        .include_columns
        .iter()
        .filter_map(|c| sheet.column_index(c).map(|idx| (idx, c.as_str())))
        .collect();
    let mut folded: Vec<(usize, &str)> = Vec::new();
    for standard in &cfg.include_columns {
        for alt in cfg.alternates_for(standard) {
            if let Some(idx) = sheet.column_index(alt) {
                if !columns.iter().any(|(i, _)| *i == idx) {
                    folded.push((idx, standard.as_str()));
                }
            }
        }
    }
    columns.extend(folded);

    if columns.is_empty() {
        return Err(DataError::Invalid(
            "No valid data columns found in the Excel file".into(),
        ));
    }

    let rows: Vec<&Vec<Cell>> = sheet.rows_for_team(team_col, team).collect();
    if rows.is_empty() {
        return Err(DataError::NotFound(format!("No data found for team {team}")));
    }

    let mut out = ColumnAverages::default();
    for (idx, name) in columns {
        let value = summarize(cfg, name, sheet.numbers(rows.iter().copied(), idx));
        match out.0.iter_mut().find(|(k, _)| k == name) {
            Some((_, existing)) => {
                *existing = match (*existing, value) {
                    (Some(a), Some(b)) => Some((a + b) / 2.0),
                    (a, b) => a.or(b),
                };
            }
            None => out.0.push((name.to_string(), value)),
        }
    }
    Ok(out)
}

/// Averages for every team. Falls back to all numeric columns when none of
/// the include columns are present.
pub fn all_team_averages(
    sheet: &MatchSheet,
    cfg: &GameConfig,
) -> Result<BTreeMap<u32, ColumnAverages>, DataError> {
    let team_col = team_index(sheet, cfg)?;

    let mut columns: Vec<usize> = cfg
        .include_columns
        .iter()
        .filter_map(|c| sheet.column_index(c))
        .collect();
    if columns.is_empty() {
        columns = sheet
            .numeric_columns()
            .into_iter()
            .filter(|&i| i != team_col && sheet.headers[i] != MATCH_NUMBER)
            .collect();
        debug!(target: "api", count = columns.len(), "no include columns present, using numeric columns");
        if columns.is_empty() {
            return Err(DataError::Invalid(
                "No valid numeric data columns found in the Excel file".into(),
            ));
        }
    }

    let mut out = BTreeMap::new();
    for team in all_teams(sheet, cfg)? {
        let rows: Vec<&Vec<Cell>> = sheet.rows_for_team(team_col, team).collect();
        let averages = columns
            .iter()
            .map(|&idx| {
                let name = &sheet.headers[idx];
                (
                    name.clone(),
                    summarize(cfg, name, sheet.numbers(rows.iter().copied(), idx)),
                )
            })
            .collect();
        out.insert(team, Ordered(averages));
    }
    Ok(out)
}

/// Debug snapshot of the last all-team computation.
pub fn write_snapshot(path: &Path, averages: &BTreeMap<u32, ColumnAverages>) -> anyhow::Result<()> {
    let body = serde_json::to_vec_pretty(averages)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

/// Sorted unique team numbers.
pub fn all_teams(sheet: &MatchSheet, cfg: &GameConfig) -> Result<Vec<u32>, DataError> {
    let team_col = team_index(sheet, cfg)?;
    let mut teams: Vec<u32> = sheet
        .rows
        .iter()
        .filter_map(|row| sheet.team_of(row, team_col))
        .collect();
    teams.sort_unstable();
    teams.dedup();
    Ok(teams)
}

/// Number of scouted rows per team.
pub fn team_match_counts(
    sheet: &MatchSheet,
    cfg: &GameConfig,
) -> Result<BTreeMap<u32, usize>, DataError> {
    let team_col = team_index(sheet, cfg)?;
    let mut counts = BTreeMap::new();
    for row in &sheet.rows {
        if let Some(team) = sheet.team_of(row, team_col) {
            *counts.entry(team).or_insert(0) += 1;
        }
    }
    Ok(counts)
}

/// Total score per team, best first; ties go to the lower team number.
pub fn team_rankings(
    sheet: &MatchSheet,
    cfg: &GameConfig,
    rules: &ScoringRules,
) -> Result<Ordered<u32, f64>, DataError> {
    let team_col = team_index(sheet, cfg)?;
    let scorer = RowScorer::new(sheet, rules);
    let mut totals: BTreeMap<u32, f64> = BTreeMap::new();
    for row in &sheet.rows {
        if let Some(team) = sheet.team_of(row, team_col) {
            *totals.entry(team).or_insert(0.0) += scorer.score(row);
        }
    }

    let mut ranked: Vec<(u32, f64)> = totals.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    Ok(Ordered(ranked))
}

/// Match-by-match rows for one team with a computed `Score`.
pub fn match_data(
    sheet: &MatchSheet,
    cfg: &GameConfig,
    team: u32,
) -> Result<Vec<Map<String, Value>>, DataError> {
    let team_col = team_index(sheet, cfg)?;
    let rows: Vec<&Vec<Cell>> = sheet.rows_for_team(team_col, team).collect();
    if rows.is_empty() {
        return Err(DataError::NotFound(format!(
            "No match data found for Team {team}."
        )));
    }

    let wanted = [SCOUTER_NAME, MATCH_NUMBER, cfg.team_column.as_str()]
        .into_iter()
        .chain(cfg.include_columns.iter().map(String::as_str));
    let mut columns: Vec<usize> = Vec::new();
    for name in wanted {
        if let Some(idx) = sheet.resolve_column(name, cfg.alternates_for(name)) {
            if !columns.contains(&idx) {
                columns.push(idx);
            }
        }
    }

    let scorer = RowScorer::new(sheet, &cfg.scoring_rules);
    Ok(rows
        .into_iter()
        .map(|row| {
            let mut record = Map::new();
            for &idx in &columns {
                let value = serde_json::to_value(sheet.cell(row, idx)).unwrap_or(Value::Null);
                record.insert(sheet.headers[idx].clone(), value);
            }
            record.insert("Score".into(), Value::from(scorer.score(row)));
            record
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    pub team_number: Option<i64>,
    pub match_number: Option<i64>,
    pub observation: String,
    pub scouter_name: String,
}

/// Free-text observations, one per non-blank row.
pub fn all_notes(sheet: &MatchSheet) -> Result<Vec<Note>, DataError> {
    let alternates: [(&str, &[&str]); 4] = [
        (TEAM_NUMBER, &["Team"]),
        (MATCH_NUMBER, &["Match"]),
        (OBSERVATIONS, &["Notes", "Comments", "Observations"]),
        (SCOUTER_NAME, &["Scouter", "Name"]),
    ];

    let mut resolved = [0usize; 4];
    let mut missing = Vec::new();
    for (slot, (name, alts)) in alternates.iter().enumerate() {
        let found = sheet
            .column_index(name)
            .or_else(|| alts.iter().find_map(|a| sheet.column_index(a)));
        match found {
            Some(idx) => resolved[slot] = idx,
            None => missing.push(*name),
        }
    }
    if !missing.is_empty() {
        return Err(DataError::Invalid(format!(
            "Required columns missing: {}",
            missing.join(", ")
        )));
    }
    let [team_col, match_col, note_col, scouter_col] = resolved;

    let whole = |cell: &Cell| cell.as_f64().map(|v| v.trunc() as i64);
    Ok(sheet
        .rows
        .iter()
        .filter(|row| !sheet.cell(row, note_col).is_empty())
        .map(|row| Note {
            team_number: whole(sheet.cell(row, team_col)),
            match_number: whole(sheet.cell(row, match_col)),
            observation: sheet.cell(row, note_col).text().unwrap_or_default(),
            scouter_name: sheet
                .cell(row, scouter_col)
                .text()
                .unwrap_or_else(|| "Unknown".to_string()),
        })
        .collect())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TeamPoints {
    pub total: f64,
    pub breakdown: ColumnAverages,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchPrediction {
    pub red_alliance_points: f64,
    pub blue_alliance_points: f64,
    pub team_points: BTreeMap<u32, TeamPoints>,
}

/// Expected alliance totals from each team's per-column means.
pub fn predict_match(
    sheet: &MatchSheet,
    cfg: &GameConfig,
    red: &[String],
    blue: &[String],
    rules: &ScoringRules,
) -> Result<MatchPrediction, DataError> {
    let team_col = team_index(sheet, cfg)?;
    let columns: Vec<(usize, &str)> = cfg
        .include_columns
        .iter()
        .filter_map(|c| sheet.column_index(c).map(|i| (i, c.as_str())))
        .collect();
    if columns.is_empty() {
        return Err(DataError::Invalid(
            "No valid data columns found in the Excel file".into(),
        ));
    }

    let points_for = |team: u32| -> TeamPoints {
        let rows: Vec<&Vec<Cell>> = sheet.rows_for_team(team_col, team).collect();
        if rows.is_empty() {
            return TeamPoints::default();
        }
        let breakdown: ColumnAverages = Ordered(
            columns
                .iter()
                .map(|(idx, name)| {
                    (name.to_string(), mean(sheet.numbers(rows.iter().copied(), *idx)))
                })
                .collect(),
        );
        let total = breakdown
            .0
            .iter()
            .filter_map(|(name, value)| {
                let rule = rules.get(name)?;
                let v = (*value)?;
                match rule {
                    ScoringRule::Lookup(_) => rule.lookup(v.trunc() as i64),
                    ScoringRule::Weight(w) if v > 0.0 => Some(v * w),
                    ScoringRule::Weight(_) => None,
                }
            })
            .sum();
        TeamPoints { total, breakdown }
    };

    let mut team_points = BTreeMap::new();
    let mut alliance = |teams: &[String]| -> f64 {
        teams
            .iter()
            .filter_map(|raw| parse_team_number(raw))
            .map(|team| {
                let points = points_for(team);
                let total = points.total;
                team_points.insert(team, points);
                total
            })
            .sum()
    };
    let red_alliance_points = alliance(red);
    let blue_alliance_points = alliance(blue);

    Ok(MatchPrediction {
        red_alliance_points,
        blue_alliance_points,
        team_points,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamSummary {
    pub team_number: u32,
    pub rank: Option<usize>,
    pub auto_score: f64,
    pub teleop_score: f64,
    pub total_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defense_rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minor_fouls: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub major_fouls: Option<f64>,
    #[serde(flatten)]
    pub columns: Ordered<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Comparison {
    Team(Box<TeamSummary>),
    Error { error: String },
}

/// Side-by-side summary of the requested teams, keyed by the raw input.
pub fn compare_teams(
    sheet: &MatchSheet,
    cfg: &GameConfig,
    teams: &[String],
) -> Result<Ordered<String, Comparison>, DataError> {
    if teams.is_empty() {
        return Err(DataError::Invalid(
            "Please provide at least one team number".into(),
        ));
    }
    let team_col = team_index(sheet, cfg)?;
    let ranks: BTreeMap<u32, usize> = team_rankings(sheet, cfg, &cfg.scoring_rules)?
        .0
        .into_iter()
        .enumerate()
        .map(|(i, (team, _))| (team, i + 1))
        .collect();

    let mut out = Ordered::default();
    for raw in teams {
        let team = match raw.trim().parse::<u32>() {
            Ok(0) => continue,
            Ok(t) => t,
            Err(_) => {
                out.0.push((
                    raw.clone(),
                    Comparison::Error {
                        error: "Invalid team number".into(),
                    },
                ));
                continue;
            }
        };
        let rows: Vec<&Vec<Cell>> = sheet.rows_for_team(team_col, team).collect();
        if rows.is_empty() {
            out.0.push((
                raw.clone(),
                Comparison::Error {
                    error: "No data found for this team".into(),
                },
            ));
            continue;
        }

        let col_mean = |name: &str| -> Option<f64> {
            let idx = sheet.column_index(name)?;
            Some(mean(sheet.numbers(rows.iter().copied(), idx)).unwrap_or(0.0))
        };

        let mut auto_score = 0.0;
        let mut teleop_score = 0.0;
        for (name, rule) in &cfg.scoring_rules {
            let Some(avg) = col_mean(name) else { continue };
            match rule {
                ScoringRule::Weight(w) if is_boolean_column(name) => {
                    if avg > 0.5 {
                        auto_score += w;
                    }
                }
                ScoringRule::Weight(w) if name.starts_with("Auto ") => auto_score += avg * w,
                ScoringRule::Weight(w) if *w > 0.0 => teleop_score += avg * w,
                ScoringRule::Weight(_) => {}
                ScoringRule::Lookup(_) => {
                    teleop_score += rule.lookup(avg.round() as i64).unwrap_or(0.0)
                }
            }
        }

        let columns = cfg
            .include_columns
            .iter()
            .filter_map(|c| col_mean(c).map(|v| (c.clone(), v)))
            .collect();

        out.0.push((
            raw.clone(),
            Comparison::Team(Box::new(TeamSummary {
                team_number: team,
                rank: ranks.get(&team).copied(),
                auto_score,
                teleop_score,
                total_score: auto_score + teleop_score,
                defense_rating: col_mean("Defense Performed"),
                minor_fouls: col_mean("Minor Fouls"),
                major_fouls: col_mean("Major Fouls"),
                columns: Ordered(columns),
            })),
        ));
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefenseEntry {
    pub score: f64,
    pub metrics: Ordered<String, f64>,
}

const DEFENSE_COLUMNS: [(&str, f64); 3] = [
    ("Defense Performed", 0.4),
    ("Defense Quality", 0.4),
    ("Defense Time", 0.2),
];
const DERIVED_RATING: &str = "Defense Rating";

/// Defensive value per team, best first.
///
/// Explicit defense columns are preferred. Without them a rating is derived
/// per row from reliability (`Broke (T/F)`) and normalised foul counts.
pub fn defense_scores(
    sheet: &MatchSheet,
    cfg: &GameConfig,
) -> Result<Ordered<u32, DefenseEntry>, DataError> {
    let team_col = team_index(sheet, cfg)?;

    // metric name, weight, per-row value
    let mut metrics: Vec<(String, f64, Vec<Option<f64>>)> = DEFENSE_COLUMNS
        .iter()
        .filter_map(|(name, weight)| {
            let idx = sheet.column_index(name)?;
            let values = sheet.rows.iter().map(|r| sheet.cell(r, idx).as_f64()).collect();
            Some((name.to_string(), *weight, values))
        })
        .collect();

    if metrics.is_empty() {
        metrics.push((DERIVED_RATING.to_string(), 1.0, derived_rating(sheet)));
    }

    // Per-team mean of each metric.
    let teams = all_teams(sheet, cfg)?;
    let mut table: Vec<(u32, Vec<f64>)> = teams
        .into_iter()
        .map(|team| {
            let per_metric = metrics
                .iter()
                .map(|(_, _, values)| {
                    mean(
                        sheet
                            .rows
                            .iter()
                            .zip(values)
                            .filter(|(row, _)| sheet.team_of(row, team_col) == Some(team))
                            .filter_map(|(_, v)| *v),
                    )
                    .unwrap_or(0.0)
                })
                .collect();
            (team, per_metric)
        })
        .collect();

    for (m, (name, _, _)) in metrics.iter().enumerate() {
        let col_max = table.iter().map(|(_, v)| v[m]).fold(f64::MIN, f64::max);
        match name.as_str() {
            "Defense Performed" => {
                for (_, v) in table.iter_mut() {
                    if col_max > 1.0 {
                        v[m] /= 100.0;
                    }
                    v[m] = v[m].clamp(0.0, 1.0);
                }
            }
            "Defense Quality" if col_max > 5.0 => {
                for (_, v) in table.iter_mut() {
                    v[m] = v[m] / col_max * 5.0;
                }
            }
            _ => {}
        }
    }

    let mut scored: Vec<(u32, DefenseEntry)> = table
        .into_iter()
        .map(|(team, values)| {
            let score = if metrics.len() > 1 {
                metrics
                    .iter()
                    .zip(&values)
                    .map(|((_, w, _), v)| v * w)
                    .sum::<f64>()
            } else {
                values[0]
            };
            let breakdown = metrics
                .iter()
                .zip(values)
                .map(|((name, _, _), v)| (name.clone(), v))
                .collect();
            (
                team,
                DefenseEntry {
                    score,
                    metrics: Ordered(breakdown),
                },
            )
        })
        .collect();
    scored.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then(a.0.cmp(&b.0)));
    Ok(Ordered(scored))
}

fn derived_rating(sheet: &MatchSheet) -> Vec<Option<f64>> {
    let flag = |cell: &Cell| match cell {
        Cell::Empty => 0.0,
        Cell::Text(_) => {
            if cell.as_bool() {
                1.0
            } else {
                cell.as_f64().unwrap_or(0.0)
            }
        }
        other => other.as_f64().unwrap_or(0.0),
    };
    let column_max = |idx: usize| {
        let m = max(sheet.numbers(sheet.rows.iter(), idx)).unwrap_or(0.0);
        if m > 0.0 {
            m
        } else {
            1.0
        }
    };

    let broke = sheet.column_index("Broke (T/F)");
    let major = sheet.column_index("Major Fouls").map(|i| (i, column_max(i)));
    let minor = sheet.column_index("Minor Fouls").map(|i| (i, column_max(i)));

    sheet
        .rows
        .iter()
        .map(|row| {
            let mut rating = 0.0;
            if let Some(idx) = broke {
                rating += (1.0 - flag(sheet.cell(row, idx))) * 2.0;
            }
            if let Some((idx, m)) = major {
                rating += sheet.cell(row, idx).as_f64().unwrap_or(0.0) / m;
            }
            if let Some((idx, m)) = minor {
                rating += sheet.cell(row, idx).as_f64().unwrap_or(0.0) / m * 0.5;
            }
            Some(rating)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scouting::sheet::fixtures::*;
    use serde_json::json;

    fn config() -> GameConfig {
        serde_json::from_value(json!({
            "team_column": "Team Number",
            "include_columns": ["Leave Bonus (T/F)", "Auto Coral L4 (#)", "Coral L4 (#)",
                                "Coral L2/L3 (#)", "Endgame Barge", "Minor Fouls"],
            "column_mappings": {"Coral L2/L3 (#)": ["Coral L2", "Coral L3"]},
            "scoring_rules": {
                "Leave Bonus (T/F)": 3,
                "Auto Coral L4 (#)": 7,
                "Coral L4 (#)": 5,
                "Coral L2/L3 (#)": 3.5,
                "Endgame Barge": {"0": 0, "1": 2, "2": 6, "3": 12},
                "Minor Fouls": -2
            }
        }))
        .unwrap()
    }

    fn data() -> MatchSheet {
        sheet(
            &["Scouter Name", "Match Number", "Team Number", "Leave Bonus (T/F)",
              "Auto Coral L4 (#)", "Coral L4 (#)", "Coral L2", "Endgame Barge",
              "Minor Fouls", "Additional Observations"],
            vec![
                vec![t("Ana"), n(1.0), n(5454.0), Cell::Bool(true), n(1.0), n(4.0), n(2.0), n(3.0), n(0.0), t("fast cycles")],
                vec![t("Bo"), n(2.0), n(5454.0), Cell::Bool(true), n(1.0), n(2.0), n(4.0), n(1.0), n(1.0), Cell::Empty],
                vec![t("Cy"), n(1.0), n(254.0), Cell::Bool(false), n(0.0), n(1.0), n(0.0), n(2.0), n(2.0), t("  ")],
                vec![Cell::Empty, n(3.0), n(0.0), Cell::Bool(true), n(9.0), n(9.0), n(9.0), n(3.0), n(0.0), t("ghost")],
            ],
        )
    }

    #[test]
    fn team_averages_uses_max_for_lookup_and_folds_alternates() {
        let avg = team_averages(&data(), &config(), 5454).unwrap();
        assert_eq!(avg.get("Coral L4 (#)"), Some(&Some(3.0)));
        assert_eq!(avg.get("Endgame Barge"), Some(&Some(3.0)));
        assert_eq!(avg.get("Coral L2/L3 (#)"), Some(&Some(3.0)));
        assert_eq!(avg.get("Leave Bonus (T/F)"), Some(&Some(1.0)));
        assert!(avg.get("Coral L2").is_none());
    }

    #[test]
    fn team_averages_errors() {
        let cfg = config();
        assert!(matches!(
            team_averages(&data(), &cfg, 9999),
            Err(DataError::NotFound(_))
        ));
        let bare = sheet(&["Team Number", "Other"], vec![vec![n(1.0), n(1.0)]]);
        assert!(matches!(
            team_averages(&bare, &cfg, 1),
            Err(DataError::Invalid(_))
        ));
    }

    #[test]
    fn team_zero_is_never_reported() {
        let (s, cfg) = (data(), config());
        assert_eq!(all_teams(&s, &cfg).unwrap(), vec![254, 5454]);
        assert!(!team_match_counts(&s, &cfg).unwrap().contains_key(&0));
        assert!(!all_team_averages(&s, &cfg).unwrap().contains_key(&0));
        assert!(team_rankings(&s, &cfg, &cfg.scoring_rules)
            .unwrap()
            .keys()
            .all(|t| *t != 0));
    }

    #[test]
    fn match_counts_per_team() {
        let counts = team_match_counts(&data(), &config()).unwrap();
        assert_eq!(counts.get(&5454), Some(&2));
        assert_eq!(counts.get(&254), Some(&1));
    }

    #[test]
    fn rankings_sorted_by_total_descending() {
        let cfg = config();
        let ranked = team_rankings(&data(), &cfg, &cfg.scoring_rules).unwrap();
        // 5454: (3+7+20+12+0) + (3+7+10+2-2) = 62; 254: 5+6-4 = 7
        assert_eq!(ranked.0, vec![(5454, 62.0), (254, 7.0)]);
    }

    #[test]
    fn all_team_averages_falls_back_to_numeric_columns() {
        let cfg = GameConfig::default();
        let s = sheet(
            &["Team Number", "Match Number", "Pieces", "Scouter Name"],
            vec![
                vec![n(1.0), n(1.0), n(2.0), t("A")],
                vec![n(1.0), n(2.0), n(4.0), t("B")],
            ],
        );
        let all = all_team_averages(&s, &cfg).unwrap();
        let team = &all[&1];
        assert_eq!(team.keys().collect::<Vec<_>>(), vec!["Pieces"]);
        assert_eq!(team.get("Pieces"), Some(&Some(3.0)));
    }

    #[test]
    fn match_data_includes_score_and_alternates() {
        let rows = match_data(&data(), &config(), 5454).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Scouter Name"], "Ana");
        assert_eq!(rows[0]["Coral L2"], 2.0);
        assert_eq!(rows[0]["Score"], 42.0);
        assert!(!rows[0].contains_key("Additional Observations"));
        assert!(matches!(
            match_data(&data(), &config(), 1),
            Err(DataError::NotFound(_))
        ));
    }

    #[test]
    fn notes_skip_blank_observations() {
        let notes = all_notes(&data()).unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].team_number, Some(5454));
        assert_eq!(notes[0].observation, "fast cycles");
        assert_eq!(notes[1].scouter_name, "Unknown");
    }

    #[test]
    fn notes_accept_alternate_headers() {
        let s = sheet(
            &["Team", "Match", "Comments", "Name"],
            vec![vec![n(118.0), n(4.0), t("tipped"), t("Dee")]],
        );
        let notes = all_notes(&s).unwrap();
        assert_eq!(notes[0].team_number, Some(118));
        assert_eq!(notes[0].scouter_name, "Dee");

        let s = sheet(&["Team"], vec![]);
        match all_notes(&s) {
            Err(DataError::Invalid(msg)) => assert!(msg.contains("Match Number")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn predicts_alliance_totals() {
        let cfg = config();
        let red = vec!["5454".to_string(), "0".to_string(), "abc".to_string()];
        let blue = vec!["254".to_string(), "777".to_string()];
        let p = predict_match(&data(), &cfg, &red, &blue, &cfg.scoring_rules).unwrap();
        // 5454 means: leave 1, auto 1, coral 3, barge 2, fouls 0.5
        // 3 + 7 + 15 + lookup(2)=6 + (0.5 * -2) = 30
        assert_eq!(p.red_alliance_points, 30.0);
        // 254: coral 1 → 5, barge 2 → 6, fouls 2 → -4
        assert_eq!(p.blue_alliance_points, 7.0);
        assert_eq!(p.team_points[&777].total, 0.0);
        assert!(p.team_points[&777].breakdown.is_empty());
        assert!(!p.team_points.contains_key(&0));
    }

    #[test]
    fn compare_reports_rank_and_phase_scores() {
        let cfg = config();
        let teams = vec!["5454".into(), "oops".into(), "42".into()];
        let cmp = compare_teams(&data(), &cfg, &teams).unwrap();
        let Some(Comparison::Team(summary)) = cmp.get("5454") else {
            panic!("missing summary");
        };
        assert_eq!(summary.rank, Some(1));
        // leave mean 1 > 0.5 → 3, auto coral 1 * 7
        assert_eq!(summary.auto_score, 10.0);
        // coral 3 * 5, barge round(2) → 6; fouls excluded
        assert_eq!(summary.teleop_score, 21.0);
        assert_eq!(summary.total_score, 31.0);
        assert_eq!(summary.minor_fouls, Some(0.5));
        assert!(matches!(cmp.get("oops"), Some(Comparison::Error { .. })));
        assert!(matches!(cmp.get("42"), Some(Comparison::Error { .. })));

        let json = serde_json::to_value(&cmp).unwrap();
        assert_eq!(json["5454"]["Coral L4 (#)"], 3.0);
        assert_eq!(json["oops"]["error"], "Invalid team number");
    }

    #[test]
    fn compare_requires_teams() {
        assert!(matches!(
            compare_teams(&data(), &config(), &[]),
            Err(DataError::Invalid(_))
        ));
    }

    #[test]
    fn explicit_defense_columns_are_normalised() {
        let s = sheet(
            &["Team Number", "Defense Performed", "Defense Quality"],
            vec![
                vec![n(1.0), n(80.0), n(10.0)],
                vec![n(2.0), n(20.0), n(5.0)],
            ],
        );
        let d = defense_scores(&s, &GameConfig::default()).unwrap();
        assert_eq!(d.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        let first = d.get(&1u32).unwrap();
        assert_eq!(first.metrics.get("Defense Performed"), Some(&0.8));
        assert_eq!(first.metrics.get("Defense Quality"), Some(&5.0));
        assert!((first.score - (0.8 * 0.4 + 5.0 * 0.4)).abs() < 1e-9);
    }

    #[test]
    fn derived_defense_rating_without_columns() {
        let s = sheet(
            &["Team Number", "Broke (T/F)", "Major Fouls"],
            vec![
                vec![n(1.0), Cell::Bool(true), n(2.0)],
                vec![n(2.0), Cell::Bool(false), n(0.0)],
            ],
        );
        let d = defense_scores(&s, &GameConfig::default()).unwrap();
        // team 2: (1-0)*2 + 0 = 2; team 1: 0 + 2/2 = 1
        assert_eq!(d.0[0].0, 2);
        assert_eq!(d.0[0].1.score, 2.0);
        assert_eq!(d.0[1].1.metrics.get("Defense Rating"), Some(&1.0));
    }
}
