//! Layered configuration for grimoire.
//!
//! Configuration is resolved from four tiers, lowest precedence first:
//! compiled defaults, the user preference file, `GRIMOIRE_*` environment
//! variables, and explicit parameters supplied by the caller. Tiers are
//! deep-merged field by field; an absent (or `null`) value in a higher tier
//! never erases a lower one.
//!
//! ```
//! use grimoire_state::{EnvSnapshot, ResolveParams, Resolver, SourceType};
//!
//! let env = EnvSnapshot::from_pairs([("GRIMOIRE_SOURCE_TYPE", "remote"),
//!     ("GRIMOIRE_REMOTE_URL", "https://github.com/acme/prompts")]);
//! let config = Resolver::new(env, None)
//!     .resolve(&ResolveParams::default())
//!     .unwrap();
//! assert_eq!(config.source.kind, SourceType::Remote);
//! assert_eq!(config.source.remote.branch, "main");
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod env;
pub mod persistence;
pub mod repository;
pub mod resolve;

pub use config::{
    Config, LocalSourceConfig, PersistenceConfig, RemoteSourceConfig, SourceConfig, SourceType,
    SyncConfig, Transport,
};
pub use env::{home_dir, EnvSnapshot};
pub use repository::RepositoryRef;
pub use resolve::{deep_merge, ResolveParams, Resolver};

use std::path::PathBuf;

/// Errors raised while resolving or persisting configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The merged configuration violates one or more constraints.
    #[error("invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// The merged tiers do not deserialize into a configuration.
    #[error("configuration has the wrong shape: {0}")]
    Shape(#[from] serde_json::Error),

    #[error("failed to write user configuration {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A write was requested while `persistence.enabled` is off.
    #[error("persistence is disabled; set persistence.enabled to save the user configuration")]
    PersistenceDisabled,

    /// No user preference file location is known.
    #[error("no user configuration path available")]
    NoUserPath,

    #[error("unrecognized repository url `{0}`")]
    RepositoryUrl(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
