//! Environment tier.
//!
//! The environment is captured once into an [`EnvSnapshot`] so resolution is
//! a pure function of its inputs and tests never touch process state.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::{SourceType, Transport};

pub const SOURCE_TYPE: &str = "GRIMOIRE_SOURCE_TYPE";
pub const LOCAL_PATH: &str = "GRIMOIRE_LOCAL_PATH";
pub const REMOTE_URL: &str = "GRIMOIRE_REMOTE_URL";
pub const REMOTE_BRANCH: &str = "GRIMOIRE_REMOTE_BRANCH";
pub const CACHE_TTL_MINUTES: &str = "GRIMOIRE_CACHE_TTL_MINUTES";
pub const DB_PATH: &str = "GRIMOIRE_DB_PATH";
pub const AUTO_SYNC: &str = "GRIMOIRE_AUTO_SYNC";
pub const SYNC_INTERVAL_MINUTES: &str = "GRIMOIRE_SYNC_INTERVAL_MINUTES";
pub const TRANSPORT: &str = "GRIMOIRE_TRANSPORT";
/// Location of the user preference file.
pub const CONFIG_PATH: &str = "GRIMOIRE_CONFIG_PATH";
/// Bearer token for the remote source.
pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";

/// An immutable copy of the variables grimoire reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Captures the `GRIMOIRE_*` variables and `GITHUB_TOKEN` from the process.
    pub fn from_process() -> Self {
        let vars = std::env::vars()
            .filter(|(k, _)| k.starts_with("GRIMOIRE_") || k == GITHUB_TOKEN)
            .collect();
        Self { vars }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Non-empty token for authenticating remote requests.
    pub fn github_token(&self) -> Option<String> {
        self.get(GITHUB_TOKEN)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        let parsed = raw.trim().parse().ok();
        if parsed.is_none() {
            tracing::warn!(target: "grimoire::config", key, value = %raw, "invalid env var, ignoring");
        }
        parsed
    }

    fn bool(&self, key: &str) -> Option<bool> {
        let raw = self.get(key)?;
        let parsed = parse_bool(raw);
        if parsed.is_none() {
            tracing::warn!(target: "grimoire::config", key, value = %raw, "invalid boolean env var, ignoring");
        }
        parsed
    }

    /// Renders the recognized variables as a partial configuration document.
    ///
    /// A set variable overrides lower tiers even when empty; a value that
    /// does not parse is logged and left out.
    pub fn to_layer(&self) -> Value {
        let mut root = Map::new();
        if let Some(kind) = self.parsed::<SourceType>(SOURCE_TYPE) {
            set(&mut root, &["source", "type"], Value::from(kind.to_string()));
        }
        if let Some(path) = self.get(LOCAL_PATH) {
            set(&mut root, &["source", "local", "path"], Value::from(path));
        }
        if let Some(url) = self.get(REMOTE_URL) {
            set(&mut root, &["source", "remote", "url"], Value::from(url));
        }
        if let Some(branch) = self.get(REMOTE_BRANCH) {
            set(&mut root, &["source", "remote", "branch"], Value::from(branch));
        }
        if let Some(ttl) = self.parsed::<u64>(CACHE_TTL_MINUTES) {
            set(&mut root, &["source", "remote", "cacheTTLMinutes"], Value::from(ttl));
        }
        if let Some(db) = self.get(DB_PATH) {
            set(&mut root, &["databasePath"], Value::from(db));
        }
        if let Some(enabled) = self.bool(AUTO_SYNC) {
            set(&mut root, &["sync", "enabled"], Value::from(enabled));
        }
        if let Some(minutes) = self.parsed::<u64>(SYNC_INTERVAL_MINUTES) {
            set(&mut root, &["sync", "intervalMinutes"], Value::from(minutes));
        }
        if let Some(transport) = self.parsed::<Transport>(TRANSPORT) {
            set(&mut root, &["transport"], serde_json::to_value(transport).unwrap_or(Value::Null));
        }
        Value::Object(root)
    }

    /// User preference file path: `GRIMOIRE_CONFIG_PATH`, else the platform
    /// config directory.
    pub fn user_config_path(&self) -> Option<PathBuf> {
        match self.get(CONFIG_PATH).filter(|p| !p.trim().is_empty()) {
            Some(path) => Some(PathBuf::from(path)),
            None => dirs::config_dir().map(|d| d.join("grimoire").join("config.json")),
        }
    }
}

/// Parses the boolean spellings accepted in the environment.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Inserts `value` at a nested object path, creating objects as needed.
pub(crate) fn set(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut cursor = root;
    for key in parents {
        let slot = cursor
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        cursor = next;
    }
    cursor.insert(last.to_string(), value);
}

/// Returns the user's home directory.
pub fn home_dir() -> Option<PathBuf> {
    #[cfg(unix)]
    if let Ok(home) = std::env::var("HOME") {
        if !home.is_empty() {
            return Some(PathBuf::from(home));
        }
    }
    dirs::home_dir()
}

/// `~/.grimoire`, or a relative `.grimoire` when no home is known.
pub(crate) fn default_data_dir() -> PathBuf {
    home_dir()
        .map(|h| h.join(".grimoire"))
        .unwrap_or_else(|| PathBuf::from(".grimoire"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bool_spellings() {
        for raw in ["true", "1", "YES", "On"] {
            assert_eq!(parse_bool(raw), Some(true), "{raw}");
        }
        for raw in ["false", "0", "no", "OFF"] {
            assert_eq!(parse_bool(raw), Some(false), "{raw}");
        }
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn layer_maps_variables_to_paths() {
        let env = EnvSnapshot::from_pairs([
            (SOURCE_TYPE, "Remote"),
            (REMOTE_URL, "https://github.com/acme/prompts"),
            (CACHE_TTL_MINUTES, "10"),
            (AUTO_SYNC, "yes"),
            (TRANSPORT, "http"),
        ]);
        assert_eq!(
            env.to_layer(),
            json!({
                "source": {
                    "type": "remote",
                    "remote": {"url": "https://github.com/acme/prompts", "cacheTTLMinutes": 10}
                },
                "sync": {"enabled": true},
                "transport": "http"
            })
        );
    }

    #[test]
    fn invalid_values_are_left_out() {
        let env = EnvSnapshot::from_pairs([
            (SOURCE_TYPE, "ftp"),
            (CACHE_TTL_MINUTES, "soon"),
            (AUTO_SYNC, "perhaps"),
        ]);
        assert_eq!(env.to_layer(), json!({}));
    }

    #[test]
    fn empty_string_still_overrides() {
        let env = EnvSnapshot::from_pairs([(REMOTE_BRANCH, "")]);
        assert_eq!(env.to_layer(), json!({"source": {"remote": {"branch": ""}}}));
    }

    #[test]
    fn blank_token_is_absent() {
        assert_eq!(EnvSnapshot::from_pairs([(GITHUB_TOKEN, "  ")]).github_token(), None);
        assert_eq!(
            EnvSnapshot::from_pairs([(GITHUB_TOKEN, "abc")]).github_token(),
            Some("abc".to_string())
        );
    }

    #[test]
    fn explicit_config_path_wins() {
        let env = EnvSnapshot::from_pairs([(CONFIG_PATH, "/tmp/g.json")]);
        assert_eq!(env.user_config_path(), Some(PathBuf::from("/tmp/g.json")));
    }
}
