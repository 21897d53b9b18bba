//! Structural content classification.
//!
//! There is no type tag in artifact files, so a document's role is inferred
//! from its shape. Predicates are checked in priority order and the first
//! match wins.

use serde_json::{Map, Value};

/// Persona sub-fields recognized by the classifier (besides `instructions`).
pub(crate) const PERSONA_MARKERS: [&str; 3] = ["instructions", "Identity", "Core_Belief"];

/// What a parsed document appears to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// `name` + `prompt`.
    Command,
    /// `name` + any persona marker.
    Persona,
    /// A mapping whose every value is persona-shaped.
    PersonaCollection,
    /// A `rules` sequence.
    Rules,
    /// None of the above; skipped without error.
    Unknown,
}

/// Classifies a parsed document.
pub fn classify(doc: &Value) -> Classification {
    let Some(map) = doc.as_object() else {
        return Classification::Unknown;
    };
    let has_name = field(map, "name").is_some_and(|v| !v.is_null());

    if has_name && field(map, "prompt").is_some() {
        Classification::Command
    } else if has_name && is_persona_shaped(map) {
        Classification::Persona
    } else if field(map, "rules").is_some_and(Value::is_array) {
        Classification::Rules
    } else if !map.is_empty()
        && map
            .values()
            .all(|v| v.as_object().is_some_and(is_persona_shaped))
    {
        Classification::PersonaCollection
    } else {
        Classification::Unknown
    }
}

/// True when the mapping carries at least one persona marker.
pub(crate) fn is_persona_shaped(map: &Map<String, Value>) -> bool {
    PERSONA_MARKERS.iter().any(|m| field(map, m).is_some())
}

/// Looks up a field tolerating case and `_`/`-`/space differences
/// (`Core_Belief`, `core-belief`, `core belief` are the same field).
/// An exact match is preferred.
pub(crate) fn field<'a>(map: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    if let Some(v) = map.get(name) {
        return Some(v);
    }
    let wanted = fold_key(name);
    map.iter()
        .find(|(k, _)| fold_key(k) == wanted)
        .map(|(_, v)| v)
}

/// Returns a trimmed, non-empty string field.
pub(crate) fn string_field(map: &Map<String, Value>, name: &str) -> Option<String> {
    match field(map, name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn fold_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}
