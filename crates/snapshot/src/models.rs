use grimoire_parser::{Command, Persona, Rule};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

/// A stored artifact plus its change-tracking fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record<T> {
    pub id: String,
    #[serde(flatten)]
    pub entity: T,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    pub content_hash: String,
}

pub type CommandModel = Record<Command>;
pub type PersonaModel = Record<Persona>;
pub type RuleModel = Record<Rule>;

impl<T: Serialize> Record<T> {
    /// Wraps `entity`, fingerprinting it and stamping `now`.
    pub fn new(id: String, entity: T, now: OffsetDateTime) -> Self {
        let content_hash = fingerprint(&entity);
        Self {
            id,
            entity,
            last_updated: now,
            content_hash,
        }
    }
}

/// SHA-256 hex digest of the entity's JSON encoding.
///
/// Struct fields serialize in declaration order, so equal entities always
/// hash equal.
pub fn fingerprint<T: Serialize>(entity: &T) -> String {
    let mut hasher = Sha256::new();
    match serde_json::to_vec(entity) {
        Ok(bytes) => hasher.update(bytes),
        Err(err) => {
            tracing::warn!(target: "grimoire::snapshot", error = %err, "entity not serializable");
            hasher.update(b"unserializable");
        }
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Failed,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SyncStatus::Success => "success",
            SyncStatus::Failed => "failed",
        })
    }
}

/// Outcome of the most recent synchronization attempt. Overwritten, never
/// appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    #[serde(with = "time::serde::rfc3339")]
    pub last_sync_timestamp: OffsetDateTime,
    pub status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Carried across failed attempts so staleness counts from real success.
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub last_success_timestamp: Option<OffsetDateTime>,
}

impl SyncMetadata {
    pub fn success(now: OffsetDateTime) -> Self {
        Self {
            last_sync_timestamp: now,
            status: SyncStatus::Success,
            error_message: None,
            last_success_timestamp: Some(now),
        }
    }

    /// A failed attempt, keeping the last success from `previous`.
    pub fn failed(now: OffsetDateTime, message: impl Into<String>, previous: Option<&SyncMetadata>) -> Self {
        Self {
            last_sync_timestamp: now,
            status: SyncStatus::Failed,
            error_message: Some(message.into()),
            last_success_timestamp: previous.and_then(|m| m.last_success_timestamp),
        }
    }
}

/// The whole persisted document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub commands: Vec<CommandModel>,
    #[serde(default)]
    pub personas: Vec<PersonaModel>,
    #[serde(default)]
    pub rules: Vec<RuleModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_metadata: Option<SyncMetadata>,
}

impl Snapshot {
    /// True when no artifact records are stored. Metadata alone does not
    /// count.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.personas.is_empty() && self.rules.is_empty()
    }

    pub fn command(&self, name: &str) -> Option<&CommandModel> {
        self.commands.iter().find(|c| c.entity.name == name)
    }

    /// Looks a persona up by record id or by name.
    pub fn persona(&self, id: &str) -> Option<&PersonaModel> {
        self.personas
            .iter()
            .find(|p| p.id == id)
            .or_else(|| self.personas.iter().find(|p| p.entity.name == id))
    }

    /// All rules sharing `name`, in stored order.
    pub fn rules_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a RuleModel> + 'a {
        self.rules.iter().filter(move |r| r.entity.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn rule(content: &str) -> Rule {
        Rule {
            name: "style".into(),
            content: content.into(),
        }
    }

    #[test]
    fn fingerprint_tracks_content() {
        assert_eq!(fingerprint(&rule("a")), fingerprint(&rule("a")));
        assert_ne!(fingerprint(&rule("a")), fingerprint(&rule("b")));
        assert_eq!(fingerprint(&rule("a")).len(), 64);
    }

    #[test]
    fn record_serializes_flat_with_rfc3339() {
        let record = Record::new("style#0".into(), rule("small commits"), datetime!(2024-05-01 12:00 UTC));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], "style#0");
        assert_eq!(value["name"], "style");
        assert_eq!(value["content"], "small commits");
        assert_eq!(value["lastUpdated"], "2024-05-01T12:00:00Z");
        assert_eq!(value["contentHash"].as_str().unwrap().len(), 64);

        let back: RuleModel = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn failure_keeps_last_success() {
        let ok = SyncMetadata::success(datetime!(2024-05-01 12:00 UTC));
        let failed = SyncMetadata::failed(datetime!(2024-05-02 12:00 UTC), "offline", Some(&ok));
        assert_eq!(failed.status, SyncStatus::Failed);
        assert_eq!(failed.last_success_timestamp, ok.last_success_timestamp);
        assert_eq!(failed.error_message.as_deref(), Some("offline"));

        let value = serde_json::to_value(&ok).unwrap();
        assert_eq!(value["status"], "success");
        assert!(value.get("errorMessage").is_none());
    }

    #[test]
    fn persona_lookup_by_id_or_name() {
        let snapshot = Snapshot {
            personas: vec![Record::new(
                "bot".into(),
                Persona {
                    name: "Bot".into(),
                    description: String::new(),
                    instructions: "Be helpful".into(),
                },
                datetime!(2024-05-01 12:00 UTC),
            )],
            ..Default::default()
        };
        assert!(snapshot.persona("bot").is_some());
        assert!(snapshot.persona("Bot").is_some());
        assert!(snapshot.persona("nobody").is_none());
    }
}
