//! The synchronization service.

use grimoire_loader::{LoaderError, SourceLoader};
use grimoire_parser::Loaded;
use grimoire_snapshot::{Record, SnapshotStore, SyncMetadata, SyncStatus};
use grimoire_state::SyncConfig;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

use crate::events::{SyncEvent, SyncEventSink, TracingSink};
use crate::reconcile::{keyed_commands, keyed_personas, keyed_rules, reconcile};
use crate::report::SyncResult;
use crate::Result;

/// Where the service is within a pass.
///
/// `Idle -> Fetching -> Reconciling -> Persisting -> Idle`, with `Failed`
/// entered when a pass fails and left again for `Idle` once the failure is
/// recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Fetching,
    Reconciling,
    Persisting,
    Failed,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncState::Idle => "idle",
            SyncState::Fetching => "fetching",
            SyncState::Reconciling => "reconciling",
            SyncState::Persisting => "persisting",
            SyncState::Failed => "failed",
        })
    }
}

/// What startup did before the process became ready.
#[derive(Debug)]
pub enum StartupOutcome {
    /// The store was empty; a blocking first sync ran.
    InitialSync(SyncResult),
    /// The stored snapshot was stale; a sync runs in the background.
    BackgroundSync(JoinHandle<()>),
    /// The stored snapshot is served as is.
    Ready,
}

pub struct SyncService {
    loader: Arc<dyn SourceLoader>,
    store: Arc<SnapshotStore>,
    sink: Arc<dyn SyncEventSink>,
    state: Mutex<SyncState>,
}

impl fmt::Debug for SyncService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncService")
            .field("source", &self.loader.describe())
            .field("store", &self.store.path())
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl SyncService {
    pub fn new(loader: Arc<dyn SourceLoader>, store: Arc<SnapshotStore>) -> Self {
        Self {
            loader,
            store,
            sink: Arc::new(TracingSink),
            state: Mutex::new(SyncState::Idle),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn SyncEventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn state(&self) -> SyncState {
        *self.state.lock()
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn loader(&self) -> &Arc<dyn SourceLoader> {
        &self.loader
    }

    fn set_state(&self, next: SyncState) {
        let mut state = self.state.lock();
        tracing::trace!(target: "grimoire::sync", from = %*state, to = %next, "state");
        *state = next;
    }

    /// Runs one pass: fetch all three types, reconcile, persist records,
    /// then persist metadata.
    ///
    /// A loader failure is not an `Err`: it is recorded as failed metadata,
    /// the previous records are left as they were, and the returned result
    /// has `status: failed`. `Err` means the snapshot itself could not be
    /// written.
    pub async fn sync_from_source(&self) -> Result<SyncResult> {
        let started_at = OffsetDateTime::now_utc();
        self.sink.record(&SyncEvent::Started {
            at: started_at,
            source: self.loader.describe(),
        });
        self.set_state(SyncState::Fetching);

        let (commands, personas, rules) = tokio::join!(
            self.loader.load_commands(),
            self.loader.load_personas(),
            self.loader.load_rules(),
        );
        let (commands, personas, rules) = match (commands, personas, rules) {
            (Ok(c), Ok(p), Ok(r)) => (c, p, r),
            (c, p, r) => {
                let message = fetch_failures([
                    ("commands", c.err()),
                    ("personas", p.err()),
                    ("rules", r.err()),
                ]);
                return self.record_failure(started_at, message).await;
            }
        };

        self.set_state(SyncState::Reconciling);
        let writer = self.store.writer().await;
        let current = writer.current();
        let now = OffsetDateTime::now_utc();
        let mut unparsed = Vec::new();

        let (command_records, command_report) =
            reconcile(&current.commands, keyed_commands(take(commands, &mut unparsed)), now);
        let (persona_records, persona_report) =
            reconcile(&current.personas, keyed_personas(take(personas, &mut unparsed)), now);
        let (rule_records, rule_report) =
            reconcile(&current.rules, keyed_rules(take(rules, &mut unparsed)), now);

        self.set_state(SyncState::Persisting);
        let changed = command_report.changed()
            || persona_report.changed()
            || rule_report.changed()
            || !same_ids(&command_records, &current.commands)
            || !same_ids(&persona_records, &current.personas)
            || !same_ids(&rule_records, &current.rules);
        if changed {
            if let Err(err) = writer.commit(command_records, persona_records, rule_records).await {
                drop(writer);
                let message = format!("failed to write snapshot: {err}");
                self.record_failure(started_at, message).await?;
                return Err(err.into());
            }
        }
        let finished_at = OffsetDateTime::now_utc();
        if let Err(err) = writer.write_metadata(SyncMetadata::success(finished_at)).await {
            self.set_state(SyncState::Failed);
            self.set_state(SyncState::Idle);
            return Err(err.into());
        }
        drop(writer);

        let result = SyncResult {
            status: SyncStatus::Success,
            started_at,
            finished_at,
            commands: command_report,
            personas: persona_report,
            rules: rule_report,
            unparsed,
            error: None,
        };
        self.set_state(SyncState::Idle);
        self.sink.record(&SyncEvent::Completed(result.clone()));
        Ok(result)
    }

    /// Writes failed metadata and nothing else.
    async fn record_failure(&self, started_at: OffsetDateTime, message: String) -> Result<SyncResult> {
        self.set_state(SyncState::Failed);
        let finished_at = OffsetDateTime::now_utc();
        let writer = self.store.writer().await;
        let previous = writer.current().sync_metadata.clone();
        let outcome = writer
            .write_metadata(SyncMetadata::failed(finished_at, message.clone(), previous.as_ref()))
            .await;
        drop(writer);

        let result = SyncResult::failed(started_at, finished_at, message);
        self.sink.record(&SyncEvent::Failed(result.clone()));
        self.set_state(SyncState::Idle);
        outcome?;
        Ok(result)
    }

    /// Brings the snapshot up at process start.
    ///
    /// An empty store is filled by a blocking sync; if that sync fails the
    /// failure is recorded and startup continues with an empty catalog. A
    /// populated store is served immediately, and a background sync starts
    /// only when `sync.enabled` and `sync.onStartup` are set and the
    /// snapshot is stale.
    pub async fn start(self: &Arc<Self>, sync: &SyncConfig) -> Result<StartupOutcome> {
        if self.store.is_empty() {
            tracing::info!(target: "grimoire::sync", source = %self.loader.describe(), "snapshot empty; running initial sync");
            let result = self.sync_from_source().await?;
            return Ok(StartupOutcome::InitialSync(result));
        }
        let interval = Duration::from_secs(sync.interval_minutes.saturating_mul(60));
        let stale = is_stale(self.store.metadata().as_ref(), interval, OffsetDateTime::now_utc());
        if sync.enabled && sync.on_startup && stale {
            tracing::info!(target: "grimoire::sync", "snapshot stale; syncing in background");
            let service = Arc::clone(self);
            let handle = tokio::spawn(async move {
                if let Err(err) = service.sync_from_source().await {
                    tracing::warn!(target: "grimoire::sync", error = %err, "background sync could not be recorded");
                }
            });
            return Ok(StartupOutcome::BackgroundSync(handle));
        }
        Ok(StartupOutcome::Ready)
    }

    /// Syncs every `interval` until the handle is aborted. The first pass
    /// runs one interval after spawning.
    pub fn spawn_periodic(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match service.sync_from_source().await {
                    Ok(result) if !result.succeeded() => {
                        tracing::debug!(target: "grimoire::sync", "periodic sync failed; will retry next interval");
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(target: "grimoire::sync", error = %err, "periodic sync could not be recorded");
                    }
                }
            }
        })
    }
}

/// True when there has never been a successful sync, the last attempt
/// failed, or the last success is older than `threshold`.
pub fn is_stale(metadata: Option<&SyncMetadata>, threshold: Duration, now: OffsetDateTime) -> bool {
    let Some(meta) = metadata else {
        return true;
    };
    if meta.status == SyncStatus::Failed {
        return true;
    }
    match meta.last_success_timestamp {
        Some(at) => (now - at) > threshold,
        None => true,
    }
}

/// Same ids in the same order.
fn same_ids<T>(a: &[Record<T>], b: &[Record<T>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.id == y.id)
}

fn take<T>(loaded: Loaded<T>, unparsed: &mut Vec<grimoire_parser::UnparsedFile>) -> Vec<T> {
    unparsed.extend(loaded.unparsed);
    loaded.items
}

fn fetch_failures<const N: usize>(outcomes: [(&str, Option<LoaderError>); N]) -> String {
    outcomes
        .into_iter()
        .filter_map(|(kind, err)| err.map(|e| format!("{kind}: {e}")))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration as TimeDuration;

    #[test]
    fn staleness_rules() {
        let now = OffsetDateTime::UNIX_EPOCH + TimeDuration::days(1);
        let hour = Duration::from_secs(3600);
        assert!(is_stale(None, hour, now));

        let fresh = SyncMetadata::success(now - TimeDuration::minutes(10));
        assert!(!is_stale(Some(&fresh), hour, now));

        let old = SyncMetadata::success(now - TimeDuration::hours(2));
        assert!(is_stale(Some(&old), hour, now));

        let failed = SyncMetadata::failed(now, "offline", Some(&fresh));
        assert!(is_stale(Some(&failed), hour, now));
    }

    #[test]
    fn failure_message_names_each_type() {
        let message = fetch_failures([
            ("commands", None),
            (
                "rules",
                Some(LoaderError::Status {
                    url: "http://x/rules.yml".into(),
                    status: 500,
                    hint: None,
                }),
            ),
        ]);
        assert_eq!(message, "rules: http://x/rules.yml returned HTTP 500");
    }
}
