//! Game configuration shared with the front end.
//!
//! The configuration lives in `static/js/config.js` as a JavaScript object
//! literal (`const GAME_CONFIG = { ... };`). The browser reads it directly;
//! the server parses it with [`loader::parse_config_literal`] and keeps the
//! typed view behind a [`loader::ConfigHandle`].

pub mod ai;
pub mod loader;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub use ai::AiSettings;
pub use loader::{
    extract_config_literal, parse_config_literal, start_hot_reload_thread, ConfigHandle,
    ParseMethod, UpdateError, DEFAULT_CONFIG_PATH, ENV_CONFIG_PATH,
};

fn default_team_column() -> String {
    "Team Number".to_string()
}

/// One entry of `scoring_rules`: either a per-unit weight or a lookup table
/// keyed by the (rounded) cell value, e.g. `"Endgame Barge": {"0": 0, "3": 12}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoringRule {
    Weight(f64),
    Lookup(BTreeMap<String, f64>),
}

impl ScoringRule {
    pub fn is_lookup(&self) -> bool {
        matches!(self, ScoringRule::Lookup(_))
    }

    pub fn weight(&self) -> Option<f64> {
        match self {
            ScoringRule::Weight(w) => Some(*w),
            ScoringRule::Lookup(_) => None,
        }
    }

    /// Points for an integer key of a lookup table.
    pub fn lookup(&self, key: i64) -> Option<f64> {
        match self {
            ScoringRule::Lookup(table) => table.get(&key.to_string()).copied(),
            ScoringRule::Weight(_) => None,
        }
    }
}

pub type ScoringRules = BTreeMap<String, ScoringRule>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEntry {
    pub password: String,
    #[serde(default)]
    pub name: String,
}

fn default_port() -> u16 {
    5454
}
fn default_true() -> bool {
    true
}
fn default_refresh() -> u64 {
    150
}
fn default_local_file() -> String {
    "qr_codes.xlsx".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Scanner installs never download the workbook themselves.
    #[serde(default = "default_true")]
    pub scanner_device: bool,
    /// Seconds between workbook downloads.
    #[serde(default = "default_refresh")]
    pub data_refresh_interval: u64,
    #[serde(default)]
    pub excel_url: String,
    #[serde(default = "default_true")]
    pub require_login: bool,
    #[serde(default = "default_local_file")]
    pub local_file_path: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            scanner_device: true,
            data_refresh_interval: default_refresh(),
            excel_url: String::new(),
            require_login: true,
            local_file_path: default_local_file(),
            extra: Map::new(),
        }
    }
}

/// Typed view of `GAME_CONFIG`. Keys the server does not care about
/// (chart colours, alliance styling, ...) survive in `extra` so that
/// persisting never drops front-end data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    #[serde(default)]
    pub game_name: String,
    #[serde(default = "default_team_column")]
    pub team_column: String,
    #[serde(default)]
    pub include_columns: Vec<String>,
    #[serde(default)]
    pub exclude_columns: Vec<String>,
    #[serde(default)]
    pub column_mappings: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub scoring_rules: ScoringRules,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub ai: AiSettings,
    #[serde(default)]
    pub users: BTreeMap<String, UserEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            game_name: String::new(),
            team_column: default_team_column(),
            include_columns: Vec::new(),
            exclude_columns: Vec::new(),
            column_mappings: BTreeMap::new(),
            scoring_rules: ScoringRules::new(),
            server: ServerSettings::default(),
            ai: AiSettings::default(),
            users: BTreeMap::new(),
            extra: Map::new(),
        }
    }
}

impl GameConfig {
    /// Alternate header spellings for `column`, in preference order.
    pub fn alternates_for(&self, column: &str) -> &[String] {
        self.column_mappings
            .get(column)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
