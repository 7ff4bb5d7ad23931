use anyhow::{anyhow, Context};
use calamine::{open_workbook_auto, DataType, Reader};
use serde::Serialize;
use std::path::Path;

use super::DataError;

/// Worksheet holding one row per team per match.
pub const MATCH_SHEET: &str = "Match Data";

static EMPTY: Cell = Cell::Empty;

/// One spreadsheet cell, reduced to what the scoring code cares about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Cell {
    /// Numbers as-is, booleans as 0/1, numeric text parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) if n.is_finite() => Some(*n),
            Cell::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Cell::Bool(b) => *b,
            Cell::Number(n) => *n >= 0.5,
            Cell::Text(s) => matches!(
                s.trim().to_ascii_uppercase().as_str(),
                "TRUE" | "T" | "YES" | "Y" | "1"
            ),
            Cell::Empty => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Display text for notes and names.
    pub fn text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
            Cell::Number(n) => Some(n.to_string()),
            Cell::Bool(b) => Some(b.to_string()),
        }
    }
}

impl From<&DataType> for Cell {
    fn from(value: &DataType) -> Self {
        match value {
            DataType::Int(i) => Cell::Number(*i as f64),
            DataType::Float(f) | DataType::DateTime(f) => Cell::Number(*f),
            DataType::Bool(b) => Cell::Bool(*b),
            DataType::String(s) if s.trim().is_empty() => Cell::Empty,
            DataType::String(s) => Cell::Text(s.trim().to_string()),
            _ => Cell::Empty,
        }
    }
}

/// Header row plus data rows; every row is padded to the header width.
#[derive(Debug, Clone, Default)]
pub struct MatchSheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl MatchSheet {
    pub fn new(headers: Vec<String>, mut rows: Vec<Vec<Cell>>) -> Self {
        let width = headers.len();
        for row in rows.iter_mut() {
            row.resize(width, Cell::Empty);
        }
        Self { headers, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Exact header first, then the alternate spellings in order.
    pub fn resolve_column(&self, name: &str, alternates: &[String]) -> Option<usize> {
        self.column_index(name)
            .or_else(|| alternates.iter().find_map(|alt| self.column_index(alt)))
    }

    pub fn cell<'a>(&self, row: &'a [Cell], col: usize) -> &'a Cell {
        row.get(col).unwrap_or(&EMPTY)
    }

    /// Team number of a row; zero, blanks and non-numeric values yield `None`.
    pub fn team_of(&self, row: &[Cell], team_col: usize) -> Option<u32> {
        let n = self.cell(row, team_col).as_f64()?;
        if n >= 1.0 && n.fract() == 0.0 && n <= u32::MAX as f64 {
            Some(n as u32)
        } else {
            None
        }
    }

    pub fn rows_for_team(&self, team_col: usize, team: u32) -> impl Iterator<Item = &Vec<Cell>> {
        self.rows
            .iter()
            .filter(move |row| self.team_of(row, team_col) == Some(team))
    }

    /// Columns whose non-empty cells are all numbers.
    pub fn numeric_columns(&self) -> Vec<usize> {
        (0..self.headers.len())
            .filter(|&col| {
                let mut seen = false;
                for row in &self.rows {
                    match self.cell(row, col) {
                        Cell::Empty => {}
                        Cell::Number(_) => seen = true,
                        _ => return false,
                    }
                }
                seen
            })
            .collect()
    }

    /// Values of one column over `rows`, skipping anything non-numeric.
    pub fn numbers<'a, I>(&'a self, rows: I, col: usize) -> impl Iterator<Item = f64> + 'a
    where
        I: IntoIterator<Item = &'a Vec<Cell>>,
        I::IntoIter: 'a,
    {
        rows.into_iter()
            .filter_map(move |row| self.cell(row, col).as_f64())
    }
}

pub fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

pub fn max(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    values.into_iter().fold(None, |acc, v| match acc {
        Some(m) if m >= v => Some(m),
        _ => Some(v),
    })
}

/// Read one worksheet. The first row is the header row.
pub fn read_workbook(path: &Path, sheet: &str) -> Result<MatchSheet, DataError> {
    if !path.exists() {
        return Err(DataError::MissingWorkbook);
    }

    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("opening workbook {}", path.display()))?;
    let range = workbook
        .worksheet_range(sheet)
        .ok_or_else(|| anyhow!("worksheet '{sheet}' not found in {}", path.display()))?
        .with_context(|| format!("reading worksheet '{sheet}'"))?;

    let mut rows_iter = range.rows();
    let headers: Vec<String> = match rows_iter.next() {
        Some(header_row) => header_row
            .iter()
            .map(|c| match c {
                DataType::Empty => String::new(),
                other => other.to_string().trim().to_string(),
            })
            .collect(),
        None => return Ok(MatchSheet::default()),
    };

    let rows = rows_iter
        .map(|row| row.iter().map(Cell::from).collect::<Vec<_>>())
        .filter(|cells| cells.iter().any(|c| !c.is_empty()))
        .collect();

    Ok(MatchSheet::new(headers, rows))
}
