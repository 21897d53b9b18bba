//! Line-oriented descent parser, the last tier of the fallback chain.
//!
//! Tracks indentation as a stack of open containers:
//!
//! - `key: value` assigns a scalar in the innermost open mapping,
//! - `key:` opens a child whose kind is decided by the next line
//!   (`- item` makes it a sequence, anything deeper makes it a mapping),
//! - `- value` appends to the nearest open sequence, and `- key: value`
//!   starts a mapping item inside it,
//! - `key: |` / `key: >` collect the more-indented lines as a block scalar.
//!
//! Repeated keys simply overwrite, so the last occurrence wins.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::chain::{indent_of, line_key};

/// Why the manual parser gave up.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManualError {
    #[error("line {line}: unrecognized syntax `{text}`")]
    Unrecognized { line: usize, text: String },
    #[error("line {line}: sequence item outside of a list")]
    StraySequenceItem { line: usize },
    #[error("line {line}: mapping entry inside a list")]
    MappingInSequence { line: usize },
    #[error("document has no entries")]
    Empty,
}

#[derive(Debug)]
enum Slot {
    Root,
    Key(String),
    Item,
}

#[derive(Debug)]
struct Frame {
    indent: usize,
    slot: Slot,
    value: Value,
}

impl Frame {
    fn map(indent: usize, slot: Slot) -> Self {
        Self {
            indent,
            slot,
            value: Value::Object(Map::new()),
        }
    }

    fn seq(indent: usize, slot: Slot) -> Self {
        Self {
            indent,
            slot,
            value: Value::Array(Vec::new()),
        }
    }
}

struct Parser {
    stack: Vec<Frame>,
    /// A `key:` line waiting for its first child: (key indent, key).
    pending: Option<(usize, String)>,
}

/// Parses `text` into a JSON object.
pub fn parse(text: &str) -> Result<Value, ManualError> {
    let lines: Vec<String> = text
        .trim_start_matches('\u{feff}')
        .lines()
        .map(expand_tabs)
        .collect();

    let mut parser = Parser {
        stack: vec![Frame::map(0, Slot::Root)],
        pending: None,
    };
    let mut saw_entry = false;

    let mut idx = 0;
    while idx < lines.len() {
        let line = &lines[idx];
        let lineno = idx + 1;
        idx += 1;

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed == "---" || trimmed == "..." {
            continue;
        }
        let indent = indent_of(line);
        let is_item = trimmed == "-" || trimmed.starts_with("- ");

        parser.resolve_pending(indent, is_item);
        parser.close_to(indent, is_item);

        if is_item {
            let rest = trimmed.strip_prefix('-').unwrap_or_default().trim_start();
            let item_indent = indent + (trimmed.len() - rest.len());
            if !parser.top_is_seq() {
                return Err(ManualError::StraySequenceItem { line: lineno });
            }
            if let Some(key) = line_key(rest) {
                // `- key: value` opens a mapping item; its siblings sit at item_indent.
                parser.stack.push(Frame::map(item_indent, Slot::Item));
                idx = parser.assign(key, after_key(rest), item_indent, &lines, idx);
            } else {
                parser.push_into_top(scalar(rest));
            }
            saw_entry = true;
            continue;
        }

        let Some(key) = line_key(trimmed) else {
            return Err(ManualError::Unrecognized {
                line: lineno,
                text: trimmed.to_string(),
            });
        };
        if parser.top_is_seq() {
            return Err(ManualError::MappingInSequence { line: lineno });
        }
        let value = after_key(trimmed);
        idx = parser.assign(key, value, indent, &lines, idx);
        saw_entry = true;
    }

    parser.resolve_pending(0, false);
    while parser.stack.len() > 1 {
        parser.pop();
    }
    if !saw_entry {
        return Err(ManualError::Empty);
    }
    Ok(parser
        .stack
        .pop()
        .map(|f| f.value)
        .unwrap_or(Value::Object(Map::new())))
}

impl Parser {
    fn top_is_seq(&self) -> bool {
        self.stack.last().is_some_and(|f| f.value.is_array())
    }

    /// Decides what a pending `key:` line opened, based on the next line.
    fn resolve_pending(&mut self, indent: usize, is_item: bool) {
        let Some((key_indent, key)) = self.pending.take() else {
            return;
        };
        if is_item && indent >= key_indent {
            self.stack.push(Frame::seq(indent, Slot::Key(key)));
        } else if indent > key_indent {
            self.stack.push(Frame::map(indent, Slot::Key(key)));
        } else {
            self.insert_into_top(key, Value::Null);
        }
    }

    /// Pops every frame the current line has dedented out of.
    fn close_to(&mut self, indent: usize, is_item: bool) {
        while self.stack.len() > 1 {
            let Some(top) = self.stack.last() else { break };
            let closes = indent < top.indent
                || (top.value.is_array() && indent == top.indent && !is_item)
                || (matches!(top.slot, Slot::Item) && indent == top.indent && is_item);
            if !closes {
                break;
            }
            self.pop();
        }
    }

    fn pop(&mut self) {
        let Some(frame) = self.stack.pop() else { return };
        match frame.slot {
            Slot::Root => self.stack.push(frame),
            Slot::Key(key) => self.insert_into_top(key, frame.value),
            Slot::Item => self.push_into_top(frame.value),
        }
    }

    fn insert_into_top(&mut self, key: String, value: Value) {
        if let Some(Value::Object(map)) = self.stack.last_mut().map(|f| &mut f.value) {
            map.insert(key, value);
        }
    }

    fn push_into_top(&mut self, value: Value) {
        if let Some(Value::Array(items)) = self.stack.last_mut().map(|f| &mut f.value) {
            items.push(value);
        }
    }

    /// Handles the value side of a `key:` line. Returns the next line index,
    /// which moves past any block scalar body.
    fn assign(
        &mut self,
        key: String,
        value: &str,
        key_indent: usize,
        lines: &[String],
        mut idx: usize,
    ) -> usize {
        if value.is_empty() {
            self.pending = Some((key_indent, key));
            return idx;
        }
        if let Some(style) = value.chars().next().filter(|c| *c == '|' || *c == '>') {
            let mut body = Vec::new();
            while idx < lines.len() {
                let line = &lines[idx];
                if !line.trim().is_empty() && indent_of(line) <= key_indent {
                    break;
                }
                body.push(line.as_str());
                idx += 1;
            }
            self.insert_into_top(key, Value::String(block_scalar(&body, style)));
            return idx;
        }
        self.insert_into_top(key, scalar(value));
        idx
    }
}

fn after_key(trimmed: &str) -> &str {
    // The key regex guarantees a `:` followed by whitespace or end of line.
    let mut in_quote: Option<char> = None;
    for (i, c) in trimmed.char_indices() {
        match (in_quote, c) {
            (None, '"') | (None, '\'') if i == 0 => in_quote = Some(c),
            (Some(q), c) if c == q => in_quote = None,
            (None, ':') => return trimmed[i + 1..].trim(),
            _ => {}
        }
    }
    ""
}

fn expand_tabs(line: &str) -> String {
    let indent_len = line.len() - line.trim_start_matches([' ', '\t']).len();
    let (indent, rest) = line.split_at(indent_len);
    format!("{}{}", indent.replace('\t', "  "), rest.trim_end())
}

fn block_scalar(body: &[&str], style: char) -> String {
    let strip = body
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| indent_of(l))
        .min()
        .unwrap_or(0);
    let lines: Vec<&str> = body
        .iter()
        .map(|l| if l.len() >= strip { &l[strip..] } else { "" })
        .collect();
    let mut text = if style == '>' {
        lines
            .split(|l| l.is_empty())
            .map(|para| para.join(" "))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        lines.join("\n")
    };
    let trimmed_len = text.trim_end().len();
    text.truncate(trimmed_len);
    text.push('\n');
    text
}

/// Interprets an inline scalar: quotes, booleans, numbers, null, flow lists.
fn scalar(raw: &str) -> Value {
    let raw = strip_comment(raw).trim();
    if raw.is_empty() || raw == "~" || raw == "null" {
        return Value::Null;
    }
    if let Some(inner) = unquote(raw) {
        return Value::String(inner);
    }
    if let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        return Value::Array(
            inner
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(scalar)
                .collect(),
        );
    }
    match raw {
        "true" | "True" | "TRUE" => return Value::Bool(true),
        "false" | "False" | "FALSE" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Some(n) = raw.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(raw.to_string())
}

fn unquote(raw: &str) -> Option<String> {
    let quote = raw.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let inner = raw.strip_prefix(quote)?.strip_suffix(quote)?;
    Some(if quote == '"' {
        inner.replace("\\\"", "\"").replace("\\n", "\n")
    } else {
        inner.replace("''", "'")
    })
}

fn strip_comment(raw: &str) -> &str {
    if raw.starts_with('"') || raw.starts_with('\'') {
        return raw;
    }
    match raw.find(" #") {
        Some(pos) => &raw[..pos],
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_scalars_and_nesting() {
        let doc = parse("name: x\nmeta:\n  count: 3\n  ok: true\n").unwrap();
        assert_eq!(doc, json!({"name": "x", "meta": {"count": 3, "ok": true}}));
    }

    #[test]
    fn duplicate_top_level_keys_last_wins() {
        let doc = parse("name: a\nprompt: p\nname: b\n").unwrap();
        assert_eq!(doc["name"], "b");
        assert_eq!(doc["prompt"], "p");
    }

    #[test]
    fn sequences_attach_to_nearest_key() {
        let doc = parse("rules:\n  - one\n  - two\nafter: x\n").unwrap();
        assert_eq!(doc["rules"], json!(["one", "two"]));
        assert_eq!(doc["after"], "x");
    }

    #[test]
    fn same_indent_sequences_are_accepted() {
        let doc = parse("rules:\n- one\n- two\nafter: x\n").unwrap();
        assert_eq!(doc["rules"], json!(["one", "two"]));
        assert_eq!(doc["after"], "x");
    }

    #[test]
    fn mapping_items_inside_sequences() {
        let doc = parse("arguments:\n  - name: A\n    description: first\n  - name: B\n").unwrap();
        assert_eq!(
            doc["arguments"],
            json!([{"name": "A", "description": "first"}, {"name": "B"}])
        );
    }

    #[test]
    fn inconsistent_indentation_is_tolerated() {
        let doc = parse("outer:\n    deep: 1\n  shallow: 2\nnext: 3\n").unwrap();
        assert_eq!(doc["outer"]["deep"], 1);
        assert_eq!(doc["next"], 3);
        // `shallow` dedents out of `outer` without matching a sibling level.
        assert_eq!(doc["shallow"], 2);
    }

    #[test]
    fn block_scalars_keep_lines() {
        let doc = parse("prompt: |\n  Hello $NAME\n  Bye\nname: x\n").unwrap();
        assert_eq!(doc["prompt"], "Hello $NAME\nBye\n");
        assert_eq!(doc["name"], "x");
    }

    #[test]
    fn folded_scalars_join_lines() {
        let doc = parse("Identity: >\n  one\n  two\n").unwrap();
        assert_eq!(doc["Identity"], "one two\n");
    }

    #[test]
    fn empty_key_at_end_becomes_null() {
        let doc = parse("name: x\nempty:\n").unwrap();
        assert_eq!(doc["empty"], Value::Null);
    }

    #[test]
    fn quoted_values_and_comments() {
        let doc = parse("a: \"x: y # z\"\nb: plain # note\nc: 'it''s'\n").unwrap();
        assert_eq!(doc["a"], "x: y # z");
        assert_eq!(doc["b"], "plain");
        assert_eq!(doc["c"], "it's");
    }

    #[test]
    fn tabs_count_as_indentation() {
        let doc = parse("outer:\n\tinner: 1\n").unwrap();
        assert_eq!(doc["outer"]["inner"], 1);
    }

    #[test]
    fn rejects_prose_and_stray_items() {
        assert!(matches!(
            parse("this is not yaml at all"),
            Err(ManualError::Unrecognized { line: 1, .. })
        ));
        assert!(matches!(
            parse("- orphan\n"),
            Err(ManualError::StraySequenceItem { line: 1 })
        ));
        assert_eq!(parse("# only a comment\n"), Err(ManualError::Empty));
    }
}
