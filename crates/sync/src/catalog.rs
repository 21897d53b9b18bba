//! Read-side boundary for the protocol layer.

use grimoire_parser::{ArtifactKind, Command, Persona, Rule};
use std::collections::HashMap;
use std::sync::Arc;

use crate::report::SyncResult;
use crate::service::SyncService;
use crate::{Result, SyncError};

/// Serves artifacts from the last committed snapshot.
///
/// Every read takes the current snapshot `Arc` and never waits on a sync.
#[derive(Debug, Clone)]
pub struct Catalog {
    service: Arc<SyncService>,
}

impl Catalog {
    pub fn new(service: Arc<SyncService>) -> Self {
        Self { service }
    }

    pub fn list_commands(&self) -> Vec<Command> {
        let snapshot = self.service.store().snapshot();
        snapshot.commands.iter().map(|r| r.entity.clone()).collect()
    }

    /// Renders the named command with `args` substituted for its
    /// placeholders.
    pub fn get_command(&self, name: &str, args: &HashMap<String, String>) -> Result<String> {
        let snapshot = self.service.store().snapshot();
        let record = snapshot.command(name).ok_or_else(|| SyncError::NotFound {
            kind: ArtifactKind::Command,
            name: name.to_string(),
        })?;
        Ok(record.entity.render(args)?)
    }

    /// The unrendered command, for describing its arguments.
    pub fn describe_command(&self, name: &str) -> Option<Command> {
        self.service
            .store()
            .snapshot()
            .command(name)
            .map(|r| r.entity.clone())
    }

    pub fn list_personas(&self) -> Vec<Persona> {
        let snapshot = self.service.store().snapshot();
        snapshot.personas.iter().map(|r| r.entity.clone()).collect()
    }

    /// Looks a persona up by id or name.
    pub fn get_persona(&self, id: &str) -> Result<Persona> {
        self.service
            .store()
            .snapshot()
            .persona(id)
            .map(|r| r.entity.clone())
            .ok_or_else(|| SyncError::NotFound {
                kind: ArtifactKind::Persona,
                name: id.to_string(),
            })
    }

    pub fn list_rules(&self) -> Vec<Rule> {
        let snapshot = self.service.store().snapshot();
        snapshot.rules.iter().map(|r| r.entity.clone()).collect()
    }

    /// Looks a rule up by its `name#ordinal` id, else by name.
    ///
    /// Several rules can share a name; by name the first one is returned.
    pub fn get_rule(&self, name: &str) -> Result<Rule> {
        let snapshot = self.service.store().snapshot();
        snapshot
            .rules
            .iter()
            .find(|r| r.id == name)
            .or_else(|| snapshot.rules_named(name).next())
            .map(|r| r.entity.clone())
            .ok_or_else(|| SyncError::NotFound {
                kind: ArtifactKind::Rule,
                name: name.to_string(),
            })
    }

    /// Drops the loader's cache and runs a fresh pass.
    pub async fn trigger_sync(&self) -> Result<SyncResult> {
        self.service.loader().clear_cache();
        self.service.sync_from_source().await
    }
}
