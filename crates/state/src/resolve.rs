//! Four-tier resolution.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::config::{Config, SourceType, Transport};
use crate::env::{set, EnvSnapshot};
use crate::persistence::{load_user_layer, save_user_config};
use crate::{ConfigError, Result};

/// Lays `layer` over `base` and returns the result.
///
/// Mappings combine key by key. Scalars and arrays in `layer` replace what
/// `base` holds. `null` means "not supplied" at any depth and leaves `base`
/// alone, whereas `false`, `0` and `""` are real values and win.
pub fn deep_merge(mut base: Value, layer: Value) -> Value {
    overlay(&mut base, layer);
    base
}

fn overlay(slot: &mut Value, layer: Value) {
    match (slot, layer) {
        (_, Value::Null) => {}
        (Value::Object(fields), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match fields.get_mut(&key) {
                    Some(existing) => overlay(existing, value),
                    None if value.is_null() => {}
                    None => {
                        fields.insert(key, value);
                    }
                }
            }
        }
        (slot, layer) => *slot = layer,
    }
}

/// Explicit caller parameters; the highest-precedence tier.
///
/// `None` means "not supplied".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveParams {
    pub source_type: Option<SourceType>,
    pub local_path: Option<PathBuf>,
    pub remote_url: Option<String>,
    pub remote_branch: Option<String>,
    pub cache_ttl_minutes: Option<u64>,
    pub database_path: Option<PathBuf>,
    pub sync_enabled: Option<bool>,
    pub sync_interval_minutes: Option<u64>,
    pub sync_on_startup: Option<bool>,
    pub persistence_enabled: Option<bool>,
    pub auto_save: Option<bool>,
    pub transport: Option<Transport>,
}

impl ResolveParams {
    fn to_layer(&self) -> Value {
        let mut root = Map::new();
        let mut put = |path: &[&str], value: Option<Value>| {
            if let Some(value) = value {
                set(&mut root, path, value);
            }
        };
        put(&["source", "type"], self.source_type.map(|k| Value::from(k.to_string())));
        put(&["source", "local", "path"], self.local_path.as_deref().map(path_value));
        put(&["source", "remote", "url"], self.remote_url.clone().map(Value::from));
        put(&["source", "remote", "branch"], self.remote_branch.clone().map(Value::from));
        put(&["source", "remote", "cacheTTLMinutes"], self.cache_ttl_minutes.map(Value::from));
        put(&["databasePath"], self.database_path.as_deref().map(path_value));
        put(&["sync", "enabled"], self.sync_enabled.map(Value::from));
        put(&["sync", "intervalMinutes"], self.sync_interval_minutes.map(Value::from));
        put(&["sync", "onStartup"], self.sync_on_startup.map(Value::from));
        put(&["persistence", "enabled"], self.persistence_enabled.map(Value::from));
        put(&["persistence", "autoSave"], self.auto_save.map(Value::from));
        put(
            &["transport"],
            self.transport.and_then(|t| serde_json::to_value(t).ok()),
        );
        Value::Object(root)
    }
}

fn path_value(path: &Path) -> Value {
    Value::from(path.to_string_lossy().into_owned())
}

/// Resolves configuration from a captured environment and an optional
/// preference file.
#[derive(Debug, Clone)]
pub struct Resolver {
    env: EnvSnapshot,
    user_config_path: Option<PathBuf>,
}

impl Resolver {
    pub fn new(env: EnvSnapshot, user_config_path: Option<PathBuf>) -> Self {
        Self {
            env,
            user_config_path,
        }
    }

    /// Snapshot of the process environment, with the preference file at
    /// `GRIMOIRE_CONFIG_PATH` or the platform default.
    pub fn from_process_env() -> Self {
        let env = EnvSnapshot::from_process();
        let path = env.user_config_path();
        Self::new(env, path)
    }

    pub fn env(&self) -> &EnvSnapshot {
        &self.env
    }

    pub fn user_config_path(&self) -> Option<&PathBuf> {
        self.user_config_path.as_ref()
    }

    /// Merges defaults, preference file, environment, and `params`, then
    /// validates the result.
    ///
    /// When persistence and auto-save are both enabled in the merged result,
    /// it is written back to the preference file. A failed write is logged,
    /// not returned.
    pub fn resolve(&self, params: &ResolveParams) -> Result<Config> {
        let defaults = serde_json::to_value(Config::default())?;
        let user = self
            .user_config_path
            .as_deref()
            .map(load_user_layer)
            .unwrap_or(Value::Null);
        let merged = [user, self.env.to_layer(), params.to_layer()]
            .into_iter()
            .fold(defaults, deep_merge);

        let config: Config = serde_json::from_value(merged)?;
        config.validate()?;
        tracing::debug!(
            target: "grimoire::config",
            source = %config.source.kind,
            database = %config.database_path.display(),
            sync_enabled = config.sync.enabled,
            "resolved configuration"
        );

        if config.persistence.enabled && config.persistence.auto_save {
            if let Err(err) = self.save(&config) {
                tracing::warn!(target: "grimoire::config", error = %err, "auto-save failed");
            }
        }
        Ok(config)
    }

    /// Applies a partial document on top of `current`.
    ///
    /// The patch follows the same merge rules as the tiers. With `persist`,
    /// the result is written to the preference file and a write failure is
    /// returned. Persisting requires `persistence.enabled` in the patched
    /// result; otherwise nothing is written and
    /// [`ConfigError::PersistenceDisabled`] is returned.
    pub fn update(&self, current: &Config, patch: Value, persist: bool) -> Result<Config> {
        let merged = deep_merge(serde_json::to_value(current)?, patch);
        let config: Config = serde_json::from_value(merged)?;
        config.validate()?;
        if persist {
            if !config.persistence.enabled {
                return Err(ConfigError::PersistenceDisabled);
            }
            self.save(&config)?;
        }
        Ok(config)
    }

    fn save(&self, config: &Config) -> Result<()> {
        let path = self
            .user_config_path
            .as_deref()
            .ok_or(ConfigError::NoUserPath)?;
        save_user_config(path, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{AUTO_SYNC, DB_PATH, REMOTE_BRANCH};
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn merge_skips_null_but_keeps_falsy() {
        let merged = deep_merge(
            json!({"a": {"b": 1, "c": true, "d": "x"}}),
            json!({"a": {"b": null, "c": false, "d": ""}}),
        );
        assert_eq!(merged, json!({"a": {"b": 1, "c": false, "d": ""}}));
        let absent = deep_merge(json!({"a": {}}), json!({"a": {"new": null}, "top": null}));
        assert_eq!(absent, json!({"a": {}}));
    }

    #[test]
    fn merge_replaces_arrays_and_scalars() {
        let merged = deep_merge(json!({"list": [1, 2], "n": 1}), json!({"list": [3], "n": {"x": 1}}));
        assert_eq!(merged, json!({"list": [3], "n": {"x": 1}}));
    }

    #[test]
    fn defaults_only() {
        let config = Resolver::new(EnvSnapshot::default(), None)
            .resolve(&ResolveParams::default())
            .unwrap();
        let defaults = Config::default();
        assert_eq!(config, defaults);
    }

    #[test]
    fn each_tier_overrides_the_one_below() {
        let tmp = tempdir().unwrap();
        let user = tmp.path().join("config.json");
        std::fs::write(
            &user,
            json!({
                "databasePath": "/from/user.json",
                "source": {"remote": {"branch": "user-branch"}},
                "sync": {"intervalMinutes": 30}
            })
            .to_string(),
        )
        .unwrap();
        let env = EnvSnapshot::from_pairs([(REMOTE_BRANCH, "env-branch"), (DB_PATH, "/from/env.json")]);
        let params = ResolveParams {
            database_path: Some("/from/params.json".into()),
            ..Default::default()
        };

        let config = Resolver::new(env, Some(user)).resolve(&params).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/from/params.json"));
        assert_eq!(config.source.remote.branch, "env-branch");
        assert_eq!(config.sync.interval_minutes, 30);
        assert_eq!(config.source.remote.cache_ttl_minutes, 5);
    }

    #[test]
    fn explicit_false_beats_env_true() {
        let env = EnvSnapshot::from_pairs([(AUTO_SYNC, "true")]);
        let params = ResolveParams {
            sync_enabled: Some(false),
            ..Default::default()
        };
        let config = Resolver::new(env, None).resolve(&params).unwrap();
        assert!(!config.sync.enabled);
    }

    #[test]
    fn remote_source_requires_url() {
        let params = ResolveParams {
            source_type: Some(SourceType::Remote),
            ..Default::default()
        };
        let err = Resolver::new(EnvSnapshot::default(), None)
            .resolve(&params)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn wrong_shape_in_user_file_is_fatal() {
        let tmp = tempdir().unwrap();
        let user = tmp.path().join("config.json");
        std::fs::write(&user, r#"{"sync": {"intervalMinutes": "hourly"}}"#).unwrap();
        let err = Resolver::new(EnvSnapshot::default(), Some(user))
            .resolve(&ResolveParams::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Shape(_)));
    }

    #[test]
    fn auto_save_writes_resolved_config() {
        let tmp = tempdir().unwrap();
        let user = tmp.path().join("config.json");
        let params = ResolveParams {
            persistence_enabled: Some(true),
            auto_save: Some(true),
            sync_interval_minutes: Some(7),
            ..Default::default()
        };
        Resolver::new(EnvSnapshot::default(), Some(user.clone()))
            .resolve(&params)
            .unwrap();
        let saved: Value = serde_json::from_str(&std::fs::read_to_string(&user).unwrap()).unwrap();
        assert_eq!(saved["sync"]["intervalMinutes"], 7);
    }

    #[test]
    fn no_save_without_auto_save() {
        let tmp = tempdir().unwrap();
        let user = tmp.path().join("config.json");
        let params = ResolveParams {
            persistence_enabled: Some(true),
            ..Default::default()
        };
        Resolver::new(EnvSnapshot::default(), Some(user.clone()))
            .resolve(&params)
            .unwrap();
        assert!(!user.exists());
    }

    #[test]
    fn update_patches_and_persists() {
        let tmp = tempdir().unwrap();
        let user = tmp.path().join("config.json");
        let resolver = Resolver::new(EnvSnapshot::default(), Some(user.clone()));
        let current = resolver.resolve(&ResolveParams::default()).unwrap();

        let updated = resolver
            .update(
                &current,
                json!({"sync": {"enabled": true, "intervalMinutes": 5}, "persistence": {"enabled": true}}),
                true,
            )
            .unwrap();
        assert!(updated.sync.enabled);
        assert_eq!(updated.sync.interval_minutes, 5);
        assert!(updated.sync.on_startup);
        assert!(user.exists());

        let invalid = resolver.update(&updated, json!({"sync": {"intervalMinutes": 0}}), false);
        assert!(invalid.is_err());
    }

    #[test]
    fn update_refuses_to_persist_when_persistence_is_off() {
        let tmp = tempdir().unwrap();
        let user = tmp.path().join("config.json");
        let resolver = Resolver::new(EnvSnapshot::default(), Some(user.clone()));
        let current = resolver.resolve(&ResolveParams::default()).unwrap();
        assert!(!current.persistence.enabled);

        let err = resolver
            .update(&current, json!({"sync": {"intervalMinutes": 5}}), true)
            .unwrap_err();
        assert!(matches!(err, ConfigError::PersistenceDisabled));
        assert!(!user.exists());

        // Without persisting, the patch still applies in memory.
        let updated = resolver
            .update(&current, json!({"sync": {"intervalMinutes": 5}}), false)
            .unwrap();
        assert_eq!(updated.sync.interval_minutes, 5);
        assert!(!user.exists());
    }

    #[test]
    fn update_without_path_cannot_persist() {
        let resolver = Resolver::new(EnvSnapshot::default(), None);
        let current = Config::default();
        let err = resolver
            .update(&current, json!({"persistence": {"enabled": true}}), true)
            .unwrap_err();
        assert!(matches!(err, ConfigError::NoUserPath));
    }
}
