use parking_lot::RwLock;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::models::{CommandModel, PersonaModel, RuleModel, Snapshot, SyncMetadata};
use crate::{Result, SnapshotError};

/// File-backed snapshot store.
///
/// Readers get an `Arc` of the last committed [`Snapshot`] and are never
/// blocked. Writers go through [`SnapshotStore::writer`], which serializes
/// them; each write is persisted to disk before the in-memory copy changes.
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    current: RwLock<Arc<Snapshot>>,
    write_lock: Mutex<()>,
}

impl SnapshotStore {
    /// Opens the store at `path`. A missing file is an empty snapshot.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Snapshot>(&bytes).map_err(|source| {
                SnapshotError::Corrupt {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(source) => return Err(SnapshotError::Io { path, source }),
        };
        tracing::debug!(
            target: "grimoire::snapshot",
            path = %path.display(),
            commands = snapshot.commands.len(),
            personas = snapshot.personas.len(),
            rules = snapshot.rules.len(),
            "snapshot opened"
        );
        Ok(Self {
            path,
            current: RwLock::new(Arc::new(snapshot)),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The last committed snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    pub fn metadata(&self) -> Option<SyncMetadata> {
        self.current.read().sync_metadata.clone()
    }

    /// Takes the write side. Held across read-modify-write so passes from
    /// different callers do not interleave.
    pub async fn writer(&self) -> SnapshotWriter<'_> {
        SnapshotWriter {
            store: self,
            _guard: self.write_lock.lock().await,
        }
    }

    async fn replace(&self, next: Snapshot) -> Result<()> {
        let path = self.path.clone();
        let bytes = serde_json::to_vec_pretty(&next)?;
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes)).await??;
        *self.current.write() = Arc::new(next);
        Ok(())
    }
}

/// Exclusive write access to a [`SnapshotStore`].
pub struct SnapshotWriter<'a> {
    store: &'a SnapshotStore,
    _guard: MutexGuard<'a, ()>,
}

impl SnapshotWriter<'_> {
    /// The snapshot as of this writer's last commit.
    pub fn current(&self) -> Arc<Snapshot> {
        self.store.snapshot()
    }

    /// Replaces all artifact records, keeping the existing metadata.
    pub async fn commit(
        &self,
        commands: Vec<CommandModel>,
        personas: Vec<PersonaModel>,
        rules: Vec<RuleModel>,
    ) -> Result<()> {
        let next = Snapshot {
            commands,
            personas,
            rules,
            sync_metadata: self.store.metadata(),
        };
        self.store.replace(next).await?;
        tracing::debug!(target: "grimoire::snapshot", "records committed");
        Ok(())
    }

    /// Overwrites the sync metadata, leaving every record untouched.
    pub async fn write_metadata(&self, metadata: SyncMetadata) -> Result<()> {
        let mut next = Snapshot::clone(&self.store.snapshot());
        next.sync_metadata = Some(metadata);
        self.store.replace(next).await
    }
}

/// Writes `bytes` to a sibling temp file and renames it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let io_err = |source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(io_err)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|err| io_err(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Record, SyncStatus};
    use grimoire_parser::Rule;
    use time::OffsetDateTime;

    fn rule(name: &str, content: &str) -> RuleModel {
        Record::new(
            format!("{name}#0"),
            Rule {
                name: name.into(),
                content: content.into(),
            },
            OffsetDateTime::UNIX_EPOCH,
        )
    }

    #[tokio::test]
    async fn missing_file_opens_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(tmp.path().join("snapshot.json")).await.unwrap();
        assert!(store.is_empty());
        assert!(store.metadata().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("snapshot.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(
            SnapshotStore::open(&path).await,
            Err(SnapshotError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn commit_then_metadata_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/snapshot.json");
        let store = SnapshotStore::open(&path).await.unwrap();
        {
            let writer = store.writer().await;
            writer
                .commit(Vec::new(), Vec::new(), vec![rule("style", "small commits")])
                .await
                .unwrap();
            writer
                .write_metadata(SyncMetadata::success(OffsetDateTime::UNIX_EPOCH))
                .await
                .unwrap();
        }

        let reopened = SnapshotStore::open(&path).await.unwrap();
        let snapshot = reopened.snapshot();
        assert_eq!(snapshot.rules.len(), 1);
        assert_eq!(
            snapshot.sync_metadata.as_ref().map(|m| m.status),
            Some(SyncStatus::Success)
        );
    }

    #[tokio::test]
    async fn metadata_write_leaves_records_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("snapshot.json");
        let store = SnapshotStore::open(&path).await.unwrap();
        let writer = store.writer().await;
        writer
            .commit(Vec::new(), Vec::new(), vec![rule("a", "one")])
            .await
            .unwrap();
        let before = std::fs::read_to_string(&path).unwrap();
        let records_before: serde_json::Value = serde_json::from_str(&before).unwrap();

        writer
            .write_metadata(SyncMetadata::failed(OffsetDateTime::UNIX_EPOCH, "offline", None))
            .await
            .unwrap();
        let after: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(records_before["rules"], after["rules"]);
        assert_eq!(after["syncMetadata"]["status"], "failed");
    }

    #[tokio::test]
    async fn readers_keep_their_copy_across_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(tmp.path().join("s.json")).await.unwrap();
        let before = store.snapshot();
        store
            .writer()
            .await
            .commit(Vec::new(), Vec::new(), vec![rule("a", "one")])
            .await
            .unwrap();
        assert!(before.is_empty());
        assert!(!store.is_empty());
    }
}
