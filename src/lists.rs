//! Pick-list persistence: flat JSON documents overwritten wholesale.

use anyhow::Context;
use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("Invalid JSON format")]
    InvalidJson,
    #[error("Invalid format: not an array")]
    NotAnArray,
    #[error("Invalid format: not an object")]
    NotAnObject,
    #[error("Invalid JSON in {0}")]
    Corrupt(String),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// Plain team-number lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamListKind {
    DoNotPick,
    Avoid,
}

impl TeamListKind {
    pub fn file_name(self) -> &'static str {
        match self {
            TeamListKind::DoNotPick => "do_not_pick.json",
            TeamListKind::Avoid => "avoid_list.json",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TeamListKind::DoNotPick => "Do Not Pick",
            TeamListKind::Avoid => "Avoid",
        }
    }
}

const DEFENSE_FILE: &str = "defense_list.json";
const ALLIANCE_FILE: &str = "alliance_selections.json";

#[derive(Debug, Clone)]
pub struct ListStore {
    dir: PathBuf,
}

impl ListStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Keeps only entries that parse as integers; returns what was stored.
    pub fn save_team_list(&self, kind: TeamListKind, raw: &[String]) -> Result<Vec<i64>, ListError> {
        let teams: Vec<i64> = raw
            .iter()
            .filter_map(|t| t.trim().parse::<i64>().ok())
            .collect();
        let body = serde_json::to_string(&teams).context("encoding team list")?;
        write_atomic(&self.path(kind.file_name()), body.as_bytes())?;
        info!(target: "api", list = kind.label(), count = teams.len(), "team list saved");
        Ok(teams)
    }

    pub fn load_team_list(&self, kind: TeamListKind) -> Result<Value, ListError> {
        Ok(self
            .read_json(kind.file_name())?
            .unwrap_or_else(|| Value::Array(Vec::new())))
    }

    /// Ranked defense list as posted by the front end; must be a JSON array.
    pub fn save_defense_list(&self, raw: &str) -> Result<usize, ListError> {
        let parsed: Value = serde_json::from_str(raw).map_err(|_| ListError::InvalidJson)?;
        let len = parsed.as_array().ok_or(ListError::NotAnArray)?.len();
        write_atomic(&self.path(DEFENSE_FILE), raw.as_bytes())?;
        Ok(len)
    }

    pub fn load_defense_list(&self) -> Result<Value, ListError> {
        Ok(self
            .read_json(DEFENSE_FILE)?
            .unwrap_or_else(|| Value::Array(Vec::new())))
    }

    /// Stores the selections object. Returns `(was_reset, saved_at)` with
    /// `saved_at` in fractional Unix seconds.
    pub fn save_alliance_selections(&self, raw: &str) -> Result<(bool, f64), ListError> {
        let parsed: Value = serde_json::from_str(raw).map_err(|_| ListError::InvalidJson)?;
        let obj = parsed.as_object().ok_or(ListError::NotAnObject)?;
        let saved_at = unix_seconds(SystemTime::now());
        write_atomic(&self.path(ALLIANCE_FILE), raw.as_bytes())?;
        Ok((obj.is_empty(), saved_at))
    }

    /// Selections plus the file's modification time (`{}` and `0` when absent).
    pub fn load_alliance_selections(&self) -> Result<(Value, f64), ListError> {
        let path = self.path(ALLIANCE_FILE);
        let Some(selections) = self.read_json(ALLIANCE_FILE)? else {
            return Ok((Value::Object(Default::default()), 0.0));
        };
        let mtime = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map(unix_seconds)
            .unwrap_or(0.0);
        Ok((selections, mtime))
    }

    fn read_json(&self, file: &str) -> Result<Option<Value>, ListError> {
        let path = self.path(file);
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ListError::Io(
                    anyhow::Error::new(e).context(format!("reading {}", path.display())),
                ))
            }
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|_| ListError::Corrupt(file.to_string()))
    }
}

fn unix_seconds(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Whole-file overwrite through a sibling temp file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, ListStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ListStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn team_lists_drop_invalid_entries() {
        let (_dir, s) = store();
        let raw: Vec<String> = ["5454", "abc", " 254 ", "", "1.5", "118"]
            .iter()
            .map(|x| x.to_string())
            .collect();
        let saved = s.save_team_list(TeamListKind::DoNotPick, &raw).unwrap();
        assert_eq!(saved, vec![5454, 254, 118]);
        assert_eq!(
            s.load_team_list(TeamListKind::DoNotPick).unwrap(),
            json!([5454, 254, 118])
        );
        assert_eq!(s.load_team_list(TeamListKind::Avoid).unwrap(), json!([]));
    }

    #[test]
    fn defense_list_must_be_array() {
        let (_dir, s) = store();
        assert!(matches!(s.save_defense_list("{\"a\":1}"), Err(ListError::NotAnArray)));
        assert!(matches!(s.save_defense_list("not json"), Err(ListError::InvalidJson)));
        assert_eq!(s.load_defense_list().unwrap(), json!([]));

        let n = s
            .save_defense_list(r#"[{"team": 254, "rank": 1}, {"team": 118, "rank": 2}]"#)
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(s.load_defense_list().unwrap()[1]["team"], 118);
    }

    #[test]
    fn alliance_selections_round_trip_with_timestamp() {
        let (_dir, s) = store();
        let (empty, ts) = s.load_alliance_selections().unwrap();
        assert_eq!(empty, json!({}));
        assert_eq!(ts, 0.0);

        assert!(matches!(
            s.save_alliance_selections("[1,2]"),
            Err(ListError::NotAnObject)
        ));
        let (reset, saved_at) = s
            .save_alliance_selections(r#"{"1": [5454, 254, 118]}"#)
            .unwrap();
        assert!(!reset);
        assert!(saved_at > 0.0);

        let (sel, mtime) = s.load_alliance_selections().unwrap();
        assert_eq!(sel["1"][0], 5454);
        assert!(mtime > 0.0);

        let (reset, _) = s.save_alliance_selections("{}").unwrap();
        assert!(reset);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let (dir, s) = store();
        fs::write(dir.path().join("avoid_list.json"), "[1,").unwrap();
        assert!(matches!(
            s.load_team_list(TeamListKind::Avoid),
            Err(ListError::Corrupt(_))
        ));
    }
}
