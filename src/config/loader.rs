//! Loader for the `GAME_CONFIG` literal embedded in the front-end script.
//!
//! Parse chain (first success wins):
//! 1. `json5` — accepts comments, unquoted keys, single quotes, trailing commas.
//! 2. Normalised JSON — comments stripped, control characters dropped,
//!    single-quoted strings converted, keys quoted, trailing commas removed,
//!    then `serde_json`.
//!
//! The file is polled every few seconds by [`start_hot_reload_thread`]; a
//! failed parse keeps the previous configuration.

use anyhow::{anyhow, Context, Result};
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    thread,
    time::{Duration, SystemTime},
};
use tracing::{error, info, warn};

use super::{GameConfig, ScoringRules};
use crate::metrics::CONFIG_RELOADS;

pub const DEFAULT_CONFIG_PATH: &str = "static/js/config.js";
pub const ENV_CONFIG_PATH: &str = "SCOUT_CONFIG_PATH";

static RE_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"const\s+GAME_CONFIG\s*=\s*(\{[\s\S]*?\});").expect("config literal regex")
});
static RE_BARE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([{,]\s*)([A-Za-z0-9_$]+)\s*:").expect("bare key regex"));
static RE_TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",(\s*[}\]])").expect("trailing comma regex"));

/// The object literal inside the script, with its byte span.
#[derive(Debug, Clone, Copy)]
pub struct ConfigLiteral<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

/// Which stage of the parse chain produced the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMethod {
    Json5,
    Normalized,
}

pub fn extract_config_literal(js: &str) -> Result<ConfigLiteral<'_>> {
    let caps = RE_LITERAL
        .captures(js)
        .ok_or_else(|| anyhow!("could not find `const GAME_CONFIG = {{...}};` in script"))?;
    let m = caps
        .get(1)
        .ok_or_else(|| anyhow!("GAME_CONFIG literal has no body"))?;
    Ok(ConfigLiteral {
        text: m.as_str(),
        start: m.start(),
        end: m.end(),
    })
}

pub fn parse_config_literal(text: &str) -> Result<(GameConfig, ParseMethod)> {
    let (value, method) = match json5::from_str::<Value>(text) {
        Ok(v) => (integralize(v), ParseMethod::Json5),
        Err(e) => {
            warn!(target: "config", error = %e, "json5 parse failed, trying normalised JSON");
            let cleaned = normalize_js_object(text);
            let v = serde_json::from_str::<Value>(&cleaned)
                .context("config literal is not valid JSON after normalisation")?;
            (v, ParseMethod::Normalized)
        }
    };

    let mut cfg: GameConfig =
        serde_json::from_value(value).context("config literal has an unexpected shape")?;
    cfg.ai = cfg.ai.sanitized();
    Ok((cfg, method))
}

/// Turn a JavaScript object literal into strict JSON.
pub fn normalize_js_object(src: &str) -> String {
    let scanned = scan_strings_and_comments(src);
    let keyed = RE_BARE_KEY.replace_all(&scanned, "${1}\"${2}\":");
    RE_TRAILING_COMMA.replace_all(&keyed, "${1}").into_owned()
}

/// Single pass over the source: drops `//` and `/* */` comments outside
/// strings, rewrites single-quoted strings as double-quoted ones and drops
/// control characters other than whitespace.
fn scan_strings_and_comments(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if (c as u32) < 32 && !matches!(c, '\n' | '\r' | '\t') {
            continue;
        }

        if let Some(q) = quote {
            match c {
                '\\' => {
                    out.push('\\');
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                }
                '"' if q == '\'' => out.push_str("\\\""),
                c if c == q => {
                    out.push('"');
                    quote = None;
                }
                '\n' | '\r' | '\t' => out.push(' '),
                c => out.push(c),
            }
            continue;
        }

        match c {
            '"' | '\'' => {
                quote = Some(c);
                out.push('"');
            }
            '/' if chars.peek() == Some(&'/') => {
                while let Some(&n) = chars.peek() {
                    if n == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
            }
            c => out.push(c),
        }
    }
    out
}

/// json5 may hand back whole numbers as floats; typed fields like `port`
/// need integers.
fn integralize(v: Value) -> Value {
    match v {
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                Value::from(f as i64)
            }
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(integralize).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, integralize(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Why an update posted by the front end was rejected.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("Missing required configuration keys: {}", .0.join(", "))]
    MissingKeys(Vec<String>),
    #[error("Configuration must be a JSON object")]
    NotAnObject,
    #[error("Invalid configuration structure: {0}")]
    Invalid(String),
}

const REQUIRED_UPDATE_KEYS: [&str; 4] = [
    "team_column",
    "include_columns",
    "exclude_columns",
    "scoring_rules",
];

#[derive(Debug)]
struct State {
    config: GameConfig,
    last_modified: Option<SystemTime>,
}

/// Shared, lock-guarded configuration bound to its source file.
#[derive(Clone, Debug)]
pub struct ConfigHandle {
    path: PathBuf,
    inner: Arc<RwLock<State>>,
}

impl ConfigHandle {
    /// Uses `SCOUT_CONFIG_PATH` or `static/js/config.js`.
    pub fn from_env() -> Self {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load(path)
    }

    /// Load from `path`; on failure the built-in defaults stay active.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let handle = Self::with_config(path, GameConfig::default());
        if let Err(e) = handle.reload() {
            error!(target: "config", path = %handle.path.display(), error = %e, "config load failed, using defaults");
        }
        handle
    }

    /// In-memory config bound to `path` (nothing is read).
    pub fn with_config(path: impl Into<PathBuf>, config: GameConfig) -> Self {
        Self {
            path: path.into(),
            inner: Arc::new(RwLock::new(State {
                config,
                last_modified: None,
            })),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reload(&self) -> Result<ParseMethod> {
        let js = fs::read_to_string(&self.path)
            .with_context(|| format!("reading config script {}", self.path.display()))?;
        let mtime = fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        let literal = extract_config_literal(&js)?;
        let (config, method) = parse_config_literal(literal.text)?;

        {
            let mut guard = self.write();
            guard.config = config;
            guard.last_modified = mtime;
        }
        counter!(CONFIG_RELOADS).increment(1);
        info!(target: "config", path = %self.path.display(), ?method, "configuration loaded");
        Ok(method)
    }

    /// Reload when the file's mtime moved forward. Returns true on a successful reload.
    pub fn reload_if_changed(&self) -> bool {
        let Ok(mtime) = fs::metadata(&self.path).and_then(|m| m.modified()) else {
            return false;
        };
        let changed = self.read().last_modified.map_or(true, |prev| mtime > prev);
        if !changed {
            return false;
        }

        info!(target: "config", "configuration file changed, reloading");
        match self.reload() {
            Ok(_) => true,
            Err(e) => {
                error!(target: "config", error = %e, "reload failed, keeping previous configuration");
                // Do not retry the same broken revision on every tick.
                self.write().last_modified = Some(mtime);
                false
            }
        }
    }

    pub fn snapshot(&self) -> GameConfig {
        self.read().config.clone()
    }

    /// Look up a raw value, optionally inside a section (`server`, `ai`, ...).
    pub fn get_value(&self, section: Option<&str>, key: &str) -> Option<Value> {
        let root = serde_json::to_value(&self.read().config).ok()?;
        let scope = match section {
            Some(s) => root.get(s)?,
            None => &root,
        };
        scope.get(key).cloned()
    }

    /// Apply an update posted by the front end (`/update_config`).
    pub fn apply_update(&self, update: &Value) -> Result<(), UpdateError> {
        let obj = update.as_object().ok_or(UpdateError::NotAnObject)?;
        let missing: Vec<String> = REQUIRED_UPDATE_KEYS
            .iter()
            .filter(|k| !obj.contains_key(**k))
            .map(|k| k.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(UpdateError::MissingKeys(missing));
        }

        let team_column: String = field(obj, "team_column")?;
        let include_columns: Vec<String> = field(obj, "include_columns")?;
        let exclude_columns: Vec<String> = field(obj, "exclude_columns")?;
        let scoring_rules: ScoringRules = field(obj, "scoring_rules")?;
        let column_mappings = match obj.get("column_mappings") {
            Some(_) => Some(field(obj, "column_mappings")?),
            None => None,
        };
        let server = obj.get("server").and_then(Value::as_object);
        let excel_url = match server.and_then(|s| s.get("excel_url")) {
            Some(v) => Some(typed::<String>("server.excel_url", v)?),
            None => None,
        };
        let refresh = match server.and_then(|s| s.get("data_refresh_interval")) {
            Some(v) => Some(typed::<u64>("server.data_refresh_interval", v)?),
            None => None,
        };

        let mut guard = self.write();
        let cfg = &mut guard.config;
        cfg.team_column = team_column;
        cfg.include_columns = include_columns;
        cfg.exclude_columns = exclude_columns;
        cfg.scoring_rules = scoring_rules;
        if let Some(m) = column_mappings {
            cfg.column_mappings = m;
        }
        if let Some(url) = excel_url {
            cfg.server.excel_url = url;
        }
        if let Some(secs) = refresh {
            cfg.server.data_refresh_interval = secs;
        }
        info!(
            target: "config",
            include = cfg.include_columns.len(),
            rules = cfg.scoring_rules.len(),
            "configuration updated from front end"
        );
        Ok(())
    }

    pub fn set_battery_saving(&self, on: bool) {
        self.write().config.ai.battery_saving = on;
    }

    /// Write the current configuration back into the script, replacing only
    /// the object literal.
    pub fn persist(&self) -> Result<()> {
        let rendered = serde_json::to_string_pretty(&self.read().config)?;
        let js = match fs::read_to_string(&self.path) {
            Ok(existing) => match extract_config_literal(&existing) {
                Ok(lit) => format!(
                    "{}{}{}",
                    &existing[..lit.start],
                    rendered,
                    &existing[lit.end..]
                ),
                Err(_) => format!("const GAME_CONFIG = {rendered};\n{existing}"),
            },
            Err(_) => format!("const GAME_CONFIG = {rendered};\n"),
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("js.tmp");
        fs::write(&tmp, js)?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;

        let mtime = fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        self.write().last_modified = mtime;
        info!(target: "config", path = %self.path.display(), "configuration persisted");
        Ok(())
    }
}

fn field<T: DeserializeOwned>(
    obj: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<T, UpdateError> {
    let v = obj
        .get(key)
        .ok_or_else(|| UpdateError::MissingKeys(vec![key.to_string()]))?;
    typed(key, v)
}

fn typed<T: DeserializeOwned>(key: &str, v: &Value) -> Result<T, UpdateError> {
    serde_json::from_value(v.clone()).map_err(|e| UpdateError::Invalid(format!("{key}: {e}")))
}

/// Poll the config file and reload it when it changes.
pub fn start_hot_reload_thread(handle: ConfigHandle, poll: Duration) {
    thread::spawn(move || loop {
        thread::sleep(poll);
        handle.reload_if_changed();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringRule;
    use serde_json::json;
    use std::io::Write;

    const SCRIPT: &str = r#"// Global configuration
const GAME_CONFIG = {
    // Game information
    game_name: 'Reefscape 2025',
    "team_column": "Team Number",
    "include_columns": ["Coral L4 (#)", "Endgame Barge",],
    /* scoring */
    "scoring_rules": {
        "Coral L4 (#)": 5,
        "Endgame Barge": {"0": 0, "3": 12},
    },
    "server": {
        "port": 5454,
        "scanner_device": false,
        "excel_url": "https://example.com/share?e=1",
    },
};

const CHART_COLORS = GAME_CONFIG.chart_colors;
"#;

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("config.js");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f.sync_all().unwrap();
        path
    }

    #[test]
    fn extracts_literal_span() {
        let lit = extract_config_literal(SCRIPT).unwrap();
        assert!(lit.text.starts_with('{'));
        assert!(lit.text.ends_with('}'));
        assert_eq!(&SCRIPT[lit.start..lit.end], lit.text);
        assert!(extract_config_literal("var x = 1;").is_err());
    }

    #[test]
    fn normalizer_handles_js_syntax_and_keeps_urls() {
        let src = r#"{
            // comment with "quotes"
            name: 'Bob',
            url: "https://example.com/a//b", /* block */
            list: [1, 2, 3,],
            nested: {a: 1,},
        }"#;
        let json = normalize_js_object(src);
        let v: Value = serde_json::from_str(&json).expect("normalised output is JSON");
        assert_eq!(v["url"], "https://example.com/a//b");
        assert_eq!(v["list"], json!([1, 2, 3]));
        assert_eq!(v["nested"]["a"], 1);
    }

    #[test]
    fn single_quoted_strings_escape_inner_double_quotes() {
        let json = normalize_js_object(r#"{label: 'say "hi"'}"#);
        let v: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["label"], "say \"hi\"");
    }

    #[test]
    fn parses_script_into_typed_config() {
        let lit = extract_config_literal(SCRIPT).unwrap();
        let (cfg, _) = parse_config_literal(lit.text).unwrap();
        assert_eq!(cfg.game_name, "Reefscape 2025");
        assert_eq!(cfg.server.port, 5454);
        assert!(!cfg.server.scanner_device);
        assert_eq!(cfg.server.excel_url, "https://example.com/share?e=1");
        assert_eq!(
            cfg.scoring_rules.get("Coral L4 (#)"),
            Some(&ScoringRule::Weight(5.0))
        );
    }

    #[test]
    fn open_missing_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let h = ConfigHandle::load(dir.path().join("nope.js"));
        let cfg = h.snapshot();
        assert_eq!(cfg.team_column, "Team Number");
        assert_eq!(cfg.server.port, 5454);
    }

    #[test]
    fn get_value_with_and_without_section() {
        let dir = tempfile::tempdir().unwrap();
        let h = ConfigHandle::load(write_script(dir.path(), SCRIPT));
        assert_eq!(h.get_value(Some("server"), "port"), Some(json!(5454)));
        assert_eq!(h.get_value(None, "game_name"), Some(json!("Reefscape 2025")));
        assert_eq!(h.get_value(Some("server"), "missing"), None);
    }

    #[test]
    fn reloads_after_file_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), SCRIPT);
        let h = ConfigHandle::load(&path);
        assert!(!h.reload_if_changed());

        // Coarse mtime granularity on some filesystems.
        thread::sleep(Duration::from_millis(1100));
        write_script(dir.path(), &SCRIPT.replace("Reefscape 2025", "Crescendo"));

        assert!(h.reload_if_changed());
        assert_eq!(h.snapshot().game_name, "Crescendo");
    }

    #[test]
    fn broken_reload_keeps_previous_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), SCRIPT);
        let h = ConfigHandle::load(&path);

        thread::sleep(Duration::from_millis(1100));
        write_script(dir.path(), "const NOTHING = 1;");

        assert!(!h.reload_if_changed());
        assert_eq!(h.snapshot().game_name, "Reefscape 2025");
    }

    #[test]
    fn update_requires_core_keys() {
        let h = ConfigHandle::with_config("unused.js", GameConfig::default());
        let err = h
            .apply_update(&json!({"team_column": "Team Number"}))
            .unwrap_err();
        match err {
            UpdateError::MissingKeys(keys) => {
                assert_eq!(keys, vec!["include_columns", "exclude_columns", "scoring_rules"])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn update_applies_server_fields() {
        let h = ConfigHandle::with_config("unused.js", GameConfig::default());
        h.apply_update(&json!({
            "team_column": "Team",
            "include_columns": ["A"],
            "exclude_columns": [],
            "scoring_rules": {"A": 2},
            "server": {"excel_url": "https://x", "data_refresh_interval": 30}
        }))
        .unwrap();
        let cfg = h.snapshot();
        assert_eq!(cfg.team_column, "Team");
        assert_eq!(cfg.server.excel_url, "https://x");
        assert_eq!(cfg.server.data_refresh_interval, 30);
    }

    #[test]
    fn persist_rewrites_only_the_literal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), SCRIPT);
        let h = ConfigHandle::load(&path);
        h.set_battery_saving(false);
        h.persist().unwrap();

        let js = fs::read_to_string(&path).unwrap();
        assert!(js.starts_with("// Global configuration"));
        assert!(js.contains("const CHART_COLORS = GAME_CONFIG.chart_colors;"));

        let reopened = ConfigHandle::load(&path);
        let cfg = reopened.snapshot();
        assert!(!cfg.ai.battery_saving);
        assert_eq!(cfg.game_name, "Reefscape 2025");
    }
}
