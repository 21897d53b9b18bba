//! Artifact sources for grimoire.
//!
//! A [`SourceLoader`] produces commands, personas, and rules from one medium.
//! Two implementations exist, [`FilesystemLoader`] and [`RemoteLoader`], and
//! [`build_loader`] picks exactly one of them from the resolved
//! configuration. Both hand every file they read to the shared parsing
//! engine, so they differ only in how bytes are enumerated and fetched.
//!
//! Layout expected under a source root:
//!
//! ```text
//! commands/    markdown or structural command files, any depth
//! personas/    structural persona files, any depth
//! rules.yml    optional rules document (or rules.yaml)
//! ```

#![deny(unsafe_code)]

use async_trait::async_trait;
use grimoire_parser::{parse_file, Command, FileArtifacts, Loaded, Location, Persona, Rule};
use grimoire_state::{Config, ConfigError, SourceType};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod fs;
pub mod remote;

pub use fs::FilesystemLoader;
pub use remote::{ContentEntry, RemoteLoader};

pub const COMMANDS_DIR: &str = "commands";
pub const PERSONAS_DIR: &str = "personas";
/// Candidate rules files, in lookup order.
pub const RULES_FILES: [&str; 2] = ["rules.yml", "rules.yaml"];

/// Errors raised while reading a source.
///
/// Every variant is a transport failure; per-file parse problems are reported
/// through [`Loaded::unparsed`] instead.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk source tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The remote answered with a status other than success or 404.
    #[error("{url} returned HTTP {status}{}", hint.map(|h| format!(" ({h})")).unwrap_or_default())]
    Status {
        url: String,
        status: u16,
        hint: Option<&'static str>,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("loader task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, LoaderError>;

/// The capability every source provides.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait SourceLoader: Send + Sync {
    async fn load_commands(&self) -> Result<Loaded<Command>>;

    async fn load_personas(&self) -> Result<Loaded<Persona>>;

    /// Loads the rules document. A missing rules file is an empty result.
    async fn load_rules(&self) -> Result<Loaded<Rule>>;

    /// Drops cached fetches so the next load goes back to the source.
    fn clear_cache(&self);

    /// Human-readable origin, for logs and status output.
    fn describe(&self) -> String;
}

/// Builds the loader selected by `config.source.type`.
///
/// `github_token` is only used by the remote loader.
pub fn build_loader(config: &Config, github_token: Option<String>) -> Result<Arc<dyn SourceLoader>> {
    match config.source.kind {
        SourceType::Local => Ok(Arc::new(FilesystemLoader::new(&config.source.local.path))),
        SourceType::Remote => {
            let remote = &config.source.remote;
            let repo = grimoire_state::RepositoryRef::parse(&remote.url)?;
            let ttl = Duration::from_secs(remote.cache_ttl_minutes.saturating_mul(60));
            let loader = RemoteLoader::new(repo, &remote.branch, ttl, github_token)?;
            Ok(Arc::new(loader))
        }
    }
}

/// One fetched file: source-relative path and body.
#[derive(Debug, Clone)]
pub(crate) struct SourceFile {
    pub path: String,
    pub text: String,
}

/// Runs every file through the parsing engine and keeps what `select`
/// extracts. Files no tier could parse are collected into `unparsed`.
pub(crate) fn assemble<T>(
    files: Vec<SourceFile>,
    location: Location,
    select: impl Fn(&mut FileArtifacts) -> Vec<T>,
) -> Loaded<T> {
    let mut loaded = Loaded::default();
    for file in files {
        let mut artifacts = parse_file(location, &file.path, &file.text);
        loaded.items.extend(select(&mut artifacts));
        if let Some(unparsed) = artifacts.unparsed {
            tracing::warn!(target: "grimoire::loader", path = %unparsed.path, reason = %unparsed.reason, "unparsed file");
            loaded.unparsed.push(unparsed);
        }
    }
    loaded
}

pub(crate) fn take_commands(a: &mut FileArtifacts) -> Vec<Command> {
    std::mem::take(&mut a.commands)
}

pub(crate) fn take_personas(a: &mut FileArtifacts) -> Vec<Persona> {
    std::mem::take(&mut a.personas)
}

pub(crate) fn take_rules(a: &mut FileArtifacts) -> Vec<Rule> {
    std::mem::take(&mut a.rules)
}
