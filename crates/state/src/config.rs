//! Configuration types and their invariants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::env::default_data_dir;
use crate::repository::RepositoryRef;
use crate::ConfigError;

/// Where artifacts are loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[default]
    Local,
    Remote,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceType::Local => "local",
            SourceType::Remote => "remote",
        })
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(SourceType::Local),
            "remote" => Ok(SourceType::Remote),
            other => Err(format!("unknown source type `{other}`")),
        }
    }
}

/// How the process is reached by its client. Only recorded here; the
/// transport itself lives outside this workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Stdio,
    Http,
}

impl std::str::FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Transport::Stdio),
            "http" => Ok(Transport::Http),
            other => Err(format!("unknown transport `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalSourceConfig {
    pub path: PathBuf,
}

impl Default for LocalSourceConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir().join("library"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteSourceConfig {
    pub url: String,
    pub branch: String,
    /// Minutes a fetched remote file stays cached. Zero disables caching.
    #[serde(rename = "cacheTTLMinutes")]
    pub cache_ttl_minutes: u64,
}

impl Default for RemoteSourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            branch: "main".to_string(),
            cache_ttl_minutes: 5,
        }
    }
}

/// Source selection. Only the branch named by `kind` is validated or used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub kind: SourceType,
    pub local: LocalSourceConfig,
    pub remote: RemoteSourceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    pub enabled: bool,
    pub interval_minutes: u64,
    pub on_startup: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: 60,
            on_startup: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub auto_save: bool,
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub source: SourceConfig,
    pub database_path: PathBuf,
    pub sync: SyncConfig,
    pub persistence: PersistenceConfig,
    pub transport: Transport,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            database_path: default_data_dir().join("snapshot.json"),
            sync: SyncConfig::default(),
            persistence: PersistenceConfig::default(),
            transport: Transport::default(),
        }
    }
}

impl Config {
    /// Checks the invariants a usable configuration must hold.
    ///
    /// Every violation is collected so a single error names all of them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        if self.database_path.as_os_str().is_empty() {
            problems.push("databasePath must not be empty".to_string());
        }
        match self.source.kind {
            SourceType::Local => {
                if self.source.local.path.as_os_str().is_empty() {
                    problems.push("source.local.path is required for a local source".to_string());
                }
            }
            SourceType::Remote => {
                let remote = &self.source.remote;
                if remote.url.trim().is_empty() {
                    problems.push("source.remote.url is required for a remote source".to_string());
                } else if let Err(err) = RepositoryRef::parse(&remote.url) {
                    problems.push(err.to_string());
                }
                if remote.branch.trim().is_empty() {
                    problems.push("source.remote.branch must not be empty".to_string());
                }
            }
        }
        if self.sync.enabled && self.sync.interval_minutes == 0 {
            problems.push("sync.intervalMinutes must be positive when sync is enabled".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(problems))
        }
    }

    /// Parsed remote repository, when the source is remote.
    pub fn repository(&self) -> Option<RepositoryRef> {
        match self.source.kind {
            SourceType::Remote => RepositoryRef::parse(&self.source.remote.url).ok(),
            SourceType::Local => None,
        }
    }
}
