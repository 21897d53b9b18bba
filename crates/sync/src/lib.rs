//! Synchronization of a source into the local snapshot.
//!
//! [`SyncService`] runs one pass as fetch, reconcile, persist. All three
//! artifact types are fetched before anything is written; if any fetch
//! fails, only the failure is recorded and the previous snapshot stays
//! exactly as it was. Records whose fingerprint did not change keep their
//! `lastUpdated`.
//!
//! [`Catalog`] is the read side handed to the protocol layer. It serves the
//! last committed snapshot and never waits on a sync in progress.

#![deny(unsafe_code)]

pub mod catalog;
pub mod events;
pub mod reconcile;
pub mod report;
pub mod service;

pub use catalog::Catalog;
pub use events::{MemorySink, SyncEvent, SyncEventSink, TracingSink};
pub use report::{KindReport, SyncResult};
pub use service::{is_stale, StartupOutcome, SyncService, SyncState};

use grimoire_parser::{ArtifactKind, ParseError};
use grimoire_snapshot::SnapshotError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The snapshot store could not be written or read.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("{kind} `{name}` not found")]
    NotFound { kind: ArtifactKind, name: String },

    /// Rendering a command failed (missing arguments).
    #[error(transparent)]
    Render(#[from] ParseError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
