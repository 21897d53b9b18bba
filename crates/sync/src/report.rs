//! What a sync pass did.

use grimoire_parser::UnparsedFile;
use grimoire_snapshot::SyncStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Per-artifact-type reconciliation counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindReport {
    /// New identity keys.
    pub created: usize,
    /// Existing keys whose fingerprint changed.
    pub updated: usize,
    /// Existing keys left untouched.
    pub unchanged: usize,
    /// Keys absent from this pass.
    pub removed: usize,
}

impl KindReport {
    pub fn changed(&self) -> bool {
        self.created + self.updated + self.removed > 0
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.unchanged
    }
}

impl fmt::Display for KindReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} total ({} new, {} updated, {} removed)",
            self.total(),
            self.created,
            self.updated,
            self.removed
        )
    }
}

/// Outcome of one `sync_from_source` pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub status: SyncStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    pub commands: KindReport,
    pub personas: KindReport,
    pub rules: KindReport,
    /// Files every parse tier rejected, across all three types.
    pub unparsed: Vec<UnparsedFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResult {
    pub fn succeeded(&self) -> bool {
        self.status == SyncStatus::Success
    }

    pub(crate) fn failed(started_at: OffsetDateTime, finished_at: OffsetDateTime, error: String) -> Self {
        Self {
            status: SyncStatus::Failed,
            started_at,
            finished_at,
            commands: KindReport::default(),
            personas: KindReport::default(),
            rules: KindReport::default(),
            unparsed: Vec::new(),
            error: Some(error),
        }
    }
}

impl fmt::Display for SyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.status, &self.error) {
            (SyncStatus::Failed, Some(err)) => write!(f, "sync failed: {err}"),
            (SyncStatus::Failed, None) => write!(f, "sync failed"),
            (SyncStatus::Success, _) => {
                writeln!(f, "sync succeeded")?;
                writeln!(f, "  commands: {}", self.commands)?;
                writeln!(f, "  personas: {}", self.personas)?;
                write!(f, "  rules:    {}", self.rules)?;
                if !self.unparsed.is_empty() {
                    write!(f, "\n  unparsed files: {}", self.unparsed.len())?;
                    for file in &self.unparsed {
                        write!(f, "\n    {}: {}", file.path, file.reason)?;
                    }
                }
                Ok(())
            }
        }
    }
}
