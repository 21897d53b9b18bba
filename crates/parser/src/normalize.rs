//! Turns classified documents into typed artifacts.

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::classify::{field, is_persona_shaped, string_field};
use crate::markdown::extract_arguments;
use crate::types::{Command, Persona, Rule};

/// Persona sub-fields folded into `instructions`, in output order, with the
/// label each section gets.
const INSTRUCTION_SECTIONS: [(&str, &str); 4] = [
    ("Identity", "Identity"),
    ("Core_Belief", "Core Belief"),
    ("Problem_Solving", "Problem Solving"),
    ("Focus", "Focus"),
];

/// Builds a command from a structural document.
///
/// Returns `None` when there is no usable `prompt`. The name is always the
/// caller-supplied file stem; a `name` field in the document is ignored.
pub fn command_from_document(file_stem: &str, doc: &Map<String, Value>) -> Option<Command> {
    let prompt_body = match field(doc, "prompt")? {
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    let declared = declared_arguments(doc);
    Some(Command {
        name: file_stem.to_string(),
        description: string_field(doc, "description").unwrap_or_default(),
        argument_specs: extract_arguments(&prompt_body, &declared),
        prompt_body,
    })
}

/// Reads an optional `arguments` declaration, either a list of
/// `{name, description}` or a `NAME: description` mapping.
fn declared_arguments(doc: &Map<String, Value>) -> HashMap<String, String> {
    let mut out = HashMap::new();
    match field(doc, "arguments") {
        Some(Value::Array(items)) => {
            for item in items.iter().filter_map(Value::as_object) {
                if let (Some(name), Some(desc)) =
                    (string_field(item, "name"), string_field(item, "description"))
                {
                    out.insert(name.trim_start_matches('$').to_string(), desc);
                }
            }
        }
        Some(Value::Object(map)) => {
            for (name, desc) in map {
                if let Some(desc) = desc.as_str() {
                    out.insert(name.trim_start_matches('$').to_string(), desc.trim().to_string());
                }
            }
        }
        _ => {}
    }
    out
}

/// Builds one persona from a persona-shaped mapping.
///
/// `fallback_name` is used when the mapping carries no `name`.
pub fn persona_from_document(fallback_name: &str, doc: &Map<String, Value>) -> Persona {
    let name = string_field(doc, "name").unwrap_or_else(|| fallback_name.to_string());
    let description = string_field(doc, "description")
        .or_else(|| string_field(doc, "Identity"))
        .unwrap_or_default();
    Persona {
        name,
        description,
        instructions: build_instructions(doc),
    }
}

/// Expands a persona collection (`key -> persona mapping`) in document order.
pub fn personas_from_collection(doc: &Map<String, Value>) -> Vec<Persona> {
    doc.iter()
        .filter_map(|(key, value)| {
            value
                .as_object()
                .filter(|m| is_persona_shaped(m))
                .map(|m| persona_from_document(key, m))
        })
        .collect()
}

/// Concatenates identity, core belief, problem solving, and focus (each only
/// when non-empty), then any literal `instructions` text.
fn build_instructions(doc: &Map<String, Value>) -> String {
    let mut sections: Vec<String> = INSTRUCTION_SECTIONS
        .iter()
        .filter_map(|(key, label)| string_field(doc, key).map(|text| format!("{label}: {text}")))
        .collect();
    if let Some(literal) = string_field(doc, "instructions") {
        sections.push(literal);
    }
    sections.join("\n\n")
}

/// Flattens an arbitrarily nested rules document into leaf rules.
///
/// Each leaf is named by the last segment of its path only, so two leaves
/// under different parents with the same key share a name. Both are kept as
/// separate entries. Sequence items inherit the path of their sequence.
pub fn flatten_rules(doc: &Value) -> Vec<Rule> {
    let mut rules = Vec::new();
    flatten_into(doc, None, &mut rules);
    rules
}

fn flatten_into(value: &Value, leaf_name: Option<&str>, out: &mut Vec<Rule>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            if let Some(rule) = explicit_rule(map) {
                out.push(rule);
                return;
            }
            for (key, child) in map {
                flatten_into(child, Some(key), out);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten_into(item, leaf_name, out);
            }
        }
        Value::String(s) => push_leaf(leaf_name, s.trim().to_string(), out),
        Value::Bool(b) => push_leaf(leaf_name, b.to_string(), out),
        Value::Number(n) => push_leaf(leaf_name, n.to_string(), out),
    }
}

fn push_leaf(name: Option<&str>, content: String, out: &mut Vec<Rule>) {
    if content.is_empty() {
        return;
    }
    out.push(Rule {
        name: name.unwrap_or("rule").to_string(),
        content,
    });
}

/// A mapping of exactly `{name, content}` strings is a rule on its own.
fn explicit_rule(map: &Map<String, Value>) -> Option<Rule> {
    if map.len() != 2 {
        return None;
    }
    let name = map.get("name")?.as_str()?.trim();
    let content = map.get("content")?.as_str()?.trim();
    if name.is_empty() || content.is_empty() {
        return None;
    }
    Some(Rule {
        name: name.to_string(),
        content: content.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn command_name_ignores_document_name() {
        let doc = obj(json!({"name": "other", "prompt": "Hello $NAME", "description": "Greets"}));
        let cmd = command_from_document("greet", &doc).unwrap();
        assert_eq!(cmd.name, "greet");
        assert_eq!(cmd.description, "Greets");
        assert_eq!(cmd.argument_specs.len(), 1);
        assert_eq!(cmd.argument_specs[0].name, "NAME");
        assert!(cmd.argument_specs[0].required);
    }

    #[test]
    fn command_without_string_prompt_is_rejected() {
        assert!(command_from_document("x", &obj(json!({"name": "x"}))).is_none());
        assert!(command_from_document("x", &obj(json!({"prompt": {"a": 1}}))).is_none());
    }

    #[test]
    fn declared_argument_descriptions_apply_to_placeholders_only() {
        let doc = obj(json!({
            "prompt": "Review $FILE",
            "arguments": [
                {"name": "FILE", "description": "path to review"},
                {"name": "UNUSED", "description": "never referenced"}
            ]
        }));
        let cmd = command_from_document("review", &doc).unwrap();
        assert_eq!(cmd.argument_specs.len(), 1);
        assert_eq!(cmd.argument_specs[0].description, "path to review");
    }

    #[test]
    fn instructions_follow_fixed_order() {
        let doc = obj(json!({
            "name": "architect",
            "Focus": "scalability",
            "Problem_Solving": "decompose",
            "Core_Belief": "systems outlive code",
            "Identity": "systems architect"
        }));
        let p = persona_from_document("ignored", &doc);
        assert_eq!(p.name, "architect");
        assert_eq!(
            p.instructions,
            "Identity: systems architect\n\nCore Belief: systems outlive code\n\n\
             Problem Solving: decompose\n\nFocus: scalability"
        );
        assert_eq!(p.description, "systems architect");
    }

    #[test]
    fn empty_sections_are_skipped() {
        let doc = obj(json!({"Identity": "", "Focus": "speed"}));
        let p = persona_from_document("fast", &doc);
        assert_eq!(p.name, "fast");
        assert_eq!(p.instructions, "Focus: speed");
    }

    #[test]
    fn literal_instructions_stand_alone() {
        let doc = obj(json!({"name": "Bot", "instructions": "Be helpful"}));
        let p = persona_from_document("bot", &doc);
        assert_eq!(p.instructions, "Be helpful");
        assert_eq!(p.description, "");
    }

    #[test]
    fn collection_uses_keys_as_names() {
        let doc = obj(json!({
            "qa": {"Identity": "tester"},
            "ops": {"name": "Operator", "Core_Belief": "uptime"}
        }));
        let personas = personas_from_collection(&doc);
        let names: Vec<_> = personas.iter().map(|p| p.name.as_str()).collect();
        assert!(names.contains(&"qa"));
        assert!(names.contains(&"Operator"));
    }

    #[test]
    fn rules_flatten_to_last_segment() {
        let doc = json!({
            "rules": ["always test"],
            "git": {"style": "conventional commits"},
            "docs": {"style": "active voice"}
        });
        let rules = flatten_rules(&doc);
        assert!(rules.contains(&Rule {
            name: "rules".into(),
            content: "always test".into()
        }));
        let styles: Vec<_> = rules.iter().filter(|r| r.name == "style").collect();
        assert_eq!(styles.len(), 2);
        assert_ne!(styles[0].content, styles[1].content);
    }

    #[test]
    fn explicit_rule_maps_are_leaves() {
        let doc = json!({"rules": [{"name": "tdd", "content": "write tests first"}]});
        assert_eq!(
            flatten_rules(&doc),
            vec![Rule {
                name: "tdd".into(),
                content: "write tests first".into()
            }]
        );
    }

    #[test]
    fn scalars_and_nulls_in_rules() {
        let doc = json!({"limits": {"max_files": 24, "strict": true, "unset": null}});
        let rules = flatten_rules(&doc);
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().any(|r| r.name == "max_files" && r.content == "24"));
    }
}
