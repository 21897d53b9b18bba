//! Ordered fallback chain for structural (YAML/JSON) artifact text.
//!
//! Hand-edited definition files routinely repeat top-level keys or drift in
//! indentation, both of which a conforming YAML parser rejects. Each tier
//! below is a pure function from text to a document; the first tier that
//! yields a mapping wins:
//!
//! 1. [`Tier::Lenient`]: earlier duplicates of a key are dropped (the last
//!    occurrence wins) before handing the text to `serde_yaml`.
//! 2. [`Tier::Strict`]: whitespace-normalized text through `serde_yaml`,
//!    restricted to plain string-keyed data. Anything outside that subset is
//!    coerced and reported as a warning.
//! 3. [`Tier::Manual`]: the indentation-stack descent parser in
//!    [`crate::manual`].

use regex::Regex;
use serde_json::{Map, Number, Value};
use std::fmt;
use std::sync::LazyLock;

use crate::manual;
use crate::ParseError;

/// A parsed structural document. The root is always a JSON object.
pub type Document = Value;

/// Which tier of the chain produced a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Lenient,
    Strict,
    Manual,
}

impl Tier {
    /// Tiers in the order they are attempted.
    pub const ORDER: [Tier; 3] = [Tier::Lenient, Tier::Strict, Tier::Manual];

    fn run(self, text: &str) -> Result<Document, String> {
        match self {
            Tier::Lenient => parse_lenient(text),
            Tier::Strict => parse_strict(text),
            Tier::Manual => manual::parse(text).map_err(|e| e.to_string()),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::Lenient => "lenient",
            Tier::Strict => "strict",
            Tier::Manual => "manual",
        })
    }
}

/// A successful parse and the tier that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub document: Document,
    pub tier: Tier,
}

/// Runs the fallback chain. Fails only when every tier fails.
pub fn parse_structural(text: &str) -> Result<Parsed, ParseError> {
    let mut reasons = Vec::with_capacity(Tier::ORDER.len());
    for tier in Tier::ORDER {
        match tier.run(text) {
            Ok(document) => {
                tracing::trace!(target: "grimoire::parser", %tier, "structural parse succeeded");
                return Ok(Parsed { document, tier });
            }
            Err(reason) => {
                tracing::trace!(target: "grimoire::parser", %tier, %reason, "parse tier failed");
                reasons.push(format!("{tier}: {reason}"));
            }
        }
    }
    Err(ParseError::Exhausted {
        reasons: reasons.join("; "),
    })
}

/// Tier 1: duplicate-key tolerant parse.
pub fn parse_lenient(text: &str) -> Result<Document, String> {
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    // serde_json already keeps the last value of a repeated key.
    if trimmed.starts_with('{') {
        let value: Value = serde_json::from_str(trimmed).map_err(|e| e.to_string())?;
        return require_mapping(value);
    }
    let deduped = dedupe_keys(text);
    let value: serde_yaml::Value = serde_yaml::from_str(&deduped).map_err(|e| e.to_string())?;
    let mut ignored = Vec::new();
    require_mapping(yaml_to_json(value, &mut ignored))
}

/// Tier 2: conservative parse of normalized text, warnings logged.
pub fn parse_strict(text: &str) -> Result<Document, String> {
    let mut warnings = Vec::new();
    let normalized = normalize_whitespace(text, &mut warnings);
    let value: serde_yaml::Value =
        serde_yaml::from_str(&normalized).map_err(|e| e.to_string())?;
    let doc = yaml_to_json(value, &mut warnings);
    for warning in &warnings {
        tracing::warn!(target: "grimoire::parser", %warning, "strict parse coerced input");
    }
    require_mapping(doc)
}

fn require_mapping(value: Value) -> Result<Document, String> {
    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Err("document is empty".into()),
        other => Err(format!("document root is {}, not a mapping", kind_of(&other))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

fn normalize_whitespace(text: &str, warnings: &mut Vec<String>) -> String {
    let mut out = text.to_string();
    if out.starts_with('\u{feff}') {
        out = out.trim_start_matches('\u{feff}').to_string();
        warnings.push("stripped byte-order mark".into());
    }
    if out.contains('\r') {
        out = out.replace("\r\n", "\n").replace('\r', "\n");
        warnings.push("normalized carriage returns".into());
    }
    let mut tabbed = false;
    let lines: Vec<String> = out
        .lines()
        .map(|line| {
            let indent_len = line.len() - line.trim_start_matches([' ', '\t']).len();
            let (indent, rest) = line.split_at(indent_len);
            if indent.contains('\t') {
                tabbed = true;
                format!("{}{}", indent.replace('\t', "  "), rest)
            } else {
                line.to_string()
            }
        })
        .collect();
    if tabbed {
        warnings.push("expanded tab indentation to two spaces".into());
    }
    lines.join("\n")
}

/// Converts a YAML value into JSON, stringifying non-string keys and
/// unwrapping tags. Each coercion is recorded in `warnings`.
pub(crate) fn yaml_to_json(value: serde_yaml::Value, warnings: &mut Vec<String>) -> Value {
    use serde_yaml::Value as Y;
    match value {
        Y::Null => Value::Null,
        Y::Bool(b) => Value::Bool(b),
        Y::Number(n) => yaml_number(&n),
        Y::String(s) => Value::String(s),
        Y::Sequence(seq) => Value::Array(seq.into_iter().map(|v| yaml_to_json(v, warnings)).collect()),
        Y::Mapping(mapping) => {
            let mut map = Map::with_capacity(mapping.len());
            for (k, v) in mapping {
                let key = match k {
                    Y::String(s) => s,
                    other => {
                        let key = yaml_key_string(&other);
                        warnings.push(format!("non-string key coerced to \"{key}\""));
                        key
                    }
                };
                map.insert(key, yaml_to_json(v, warnings));
            }
            Value::Object(map)
        }
        Y::Tagged(tagged) => {
            warnings.push(format!("dropped tag {}", tagged.tag));
            yaml_to_json(tagged.value, warnings)
        }
    }
}

fn yaml_number(n: &serde_yaml::Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::Number(i.into())
    } else if let Some(u) = n.as_u64() {
        Value::Number(u.into())
    } else {
        n.as_f64()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(n.to_string()))
    }
}

fn yaml_key_string(key: &serde_yaml::Value) -> String {
    use serde_yaml::Value as Y;
    match key {
        Y::Null => "null".into(),
        Y::Bool(b) => b.to_string(),
        Y::Number(n) => n.to_string(),
        Y::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

// Head of a block-mapping entry: `key:` or `key: value`, optionally quoted.
static KEY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:"([^"]*)"|'([^']*)'|([^\s#\-"'][^:#]*?))\s*:(?:\s|$)"#)
        .expect("valid key regex")
});

/// Extracts the mapping key from a trimmed line, if it is a key line.
pub(crate) fn line_key(trimmed: &str) -> Option<String> {
    let caps = KEY_LINE.captures(trimmed)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str().trim().to_string())
}

pub(crate) fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn is_filler(line: &str) -> bool {
    let t = line.trim();
    t.is_empty() || t.starts_with('#')
}

fn opens_block_scalar(trimmed: &str) -> bool {
    let value = trimmed.split_once(':').map(|(_, v)| v.trim()).unwrap_or("");
    matches!(value.chars().next(), Some('|') | Some('>'))
}

struct Entry<'a> {
    key: Option<String>,
    head: &'a str,
    body: Vec<&'a str>,
    block_scalar: bool,
}

/// Removes earlier occurrences of repeated sibling keys, recursively.
///
/// Works purely on indentation, so it never needs the text to be valid YAML.
pub fn dedupe_keys(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out = Vec::with_capacity(lines.len());
    dedupe_block(&lines, &mut out);
    out.join("\n")
}

fn dedupe_block<'a>(lines: &[&'a str], out: &mut Vec<&'a str>) {
    let Some(base) = lines.iter().find(|l| !is_filler(l)).map(|l| indent_of(l)) else {
        out.extend_from_slice(lines);
        return;
    };

    let mut prefix: Vec<&'a str> = Vec::new();
    let mut entries: Vec<Entry<'a>> = Vec::new();
    for &line in lines {
        let starts_entry = !is_filler(line) && indent_of(line) <= base;
        let trimmed = line.trim_start();
        // `key:` followed by `- item` at the same indent belongs to the key.
        let continues_sequence = starts_entry
            && trimmed.starts_with("- ")
            && entries
                .last()
                .is_some_and(|e| e.key.is_some() && !e.head.trim_start().starts_with("- "));
        if starts_entry && !continues_sequence {
            let key = if trimmed.starts_with('-') {
                None
            } else {
                line_key(trimmed)
            };
            entries.push(Entry {
                block_scalar: key.is_some() && opens_block_scalar(trimmed),
                key,
                head: line,
                body: Vec::new(),
            });
        } else if let Some(entry) = entries.last_mut() {
            entry.body.push(line);
        } else {
            prefix.push(line);
        }
    }

    out.extend(prefix);
    for (idx, entry) in entries.iter().enumerate() {
        if let Some(key) = &entry.key {
            let shadowed = entries[idx + 1..]
                .iter()
                .any(|later| later.key.as_deref() == Some(key.as_str()));
            if shadowed {
                tracing::debug!(target: "grimoire::parser", key = %key, "dropping shadowed duplicate key");
                continue;
            }
        }
        out.push(entry.head);
        if entry.block_scalar {
            out.extend_from_slice(&entry.body);
        } else {
            dedupe_block(&entry.body, out);
        }
    }
}
