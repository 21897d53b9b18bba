//! Sync lifecycle events.
//!
//! The service reports each pass to an injected [`SyncEventSink`] instead of
//! keeping history itself. Anything that wants to learn from sync activity
//! (metrics, audit logs) implements the sink.

use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::report::SyncResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Started { at: OffsetDateTime, source: String },
    Completed(SyncResult),
    Failed(SyncResult),
}

pub trait SyncEventSink: Send + Sync {
    fn record(&self, event: &SyncEvent);
}

/// Logs every event through `tracing`. The default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl SyncEventSink for TracingSink {
    fn record(&self, event: &SyncEvent) {
        match event {
            SyncEvent::Started { source, .. } => {
                tracing::debug!(target: "grimoire::sync", %source, "sync started");
            }
            SyncEvent::Completed(result) => {
                tracing::info!(
                    target: "grimoire::sync",
                    commands = result.commands.total(),
                    personas = result.personas.total(),
                    rules = result.rules.total(),
                    unparsed = result.unparsed.len(),
                    "sync completed"
                );
            }
            SyncEvent::Failed(result) => {
                tracing::warn!(
                    target: "grimoire::sync",
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "sync failed; keeping previous snapshot"
                );
            }
        }
    }
}

/// Keeps events in memory, for tests and embedding callers.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SyncEvent>>,
}

impl MemorySink {
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().clone()
    }
}

impl SyncEventSink for MemorySink {
    fn record(&self, event: &SyncEvent) {
        self.events.lock().push(event.clone());
    }
}
