//! Diffing a fetched batch against stored records.

use grimoire_parser::{Command, Persona, Rule};
use grimoire_snapshot::{fingerprint, Record};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use time::OffsetDateTime;

use crate::report::KindReport;

/// Keys commands by name. A repeated name keeps its first occurrence.
pub fn keyed_commands(commands: Vec<Command>) -> Vec<(String, Command)> {
    unique_by_name(commands, "command", |c| &c.name)
}

/// Keys personas by name. A repeated name keeps its first occurrence.
pub fn keyed_personas(personas: Vec<Persona>) -> Vec<(String, Persona)> {
    unique_by_name(personas, "persona", |p| &p.name)
}

/// Keys rules as `name#ordinal`, the ordinal counting earlier rules with the
/// same name. Flattening reuses leaf names, so names alone are not unique.
pub fn keyed_rules(rules: Vec<Rule>) -> Vec<(String, Rule)> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    rules
        .into_iter()
        .map(|rule| {
            let ordinal = seen.entry(rule.name.clone()).or_insert(0);
            let key = format!("{}#{}", rule.name, ordinal);
            *ordinal += 1;
            (key, rule)
        })
        .collect()
}

fn unique_by_name<T>(items: Vec<T>, kind: &str, name: impl Fn(&T) -> &String) -> Vec<(String, T)> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let key = name(&item).clone();
        if seen.insert(key.clone()) {
            out.push((key, item));
        } else {
            tracing::warn!(target: "grimoire::sync", kind, name = %key, "duplicate name; keeping first");
        }
    }
    out
}

/// Builds the next record set for one artifact type.
///
/// A key that exists with an equal fingerprint keeps its stored record
/// untouched. New keys and changed fingerprints get `now` as `lastUpdated`.
/// Stored keys missing from `incoming` are dropped.
pub fn reconcile<T>(
    existing: &[Record<T>],
    incoming: Vec<(String, T)>,
    now: OffsetDateTime,
) -> (Vec<Record<T>>, KindReport)
where
    T: Clone + Serialize,
{
    let stored: HashMap<&str, &Record<T>> = existing.iter().map(|r| (r.id.as_str(), r)).collect();
    let mut report = KindReport::default();
    let mut kept = HashSet::new();
    let mut next = Vec::with_capacity(incoming.len());

    for (id, entity) in incoming {
        let hash = fingerprint(&entity);
        match stored.get(id.as_str()) {
            Some(record) if record.content_hash == hash => {
                report.unchanged += 1;
                next.push(Record::clone(record));
            }
            Some(_) => {
                report.updated += 1;
                next.push(Record {
                    id: id.clone(),
                    entity,
                    last_updated: now,
                    content_hash: hash,
                });
            }
            None => {
                report.created += 1;
                next.push(Record {
                    id: id.clone(),
                    entity,
                    last_updated: now,
                    content_hash: hash,
                });
            }
        }
        kept.insert(id);
    }
    report.removed = existing.iter().filter(|r| !kept.contains(&r.id)).count();
    (next, report)
}
