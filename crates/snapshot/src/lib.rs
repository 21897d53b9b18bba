//! Local snapshot of the last synchronized artifacts.
//!
//! The snapshot is one JSON document holding every command, persona, and
//! rule record plus a singleton [`SyncMetadata`]. Reads are served from an
//! in-memory copy and never wait on a write; writes are serialized and land
//! on disk atomically before the in-memory copy is swapped.

#![deny(unsafe_code)]

mod models;
mod store;

pub use models::{
    fingerprint, CommandModel, PersonaModel, Record, RuleModel, Snapshot, SyncMetadata, SyncStatus,
};
pub use store::{SnapshotStore, SnapshotWriter};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to access snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot {path} is not a valid document: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("snapshot write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, SnapshotError>;
