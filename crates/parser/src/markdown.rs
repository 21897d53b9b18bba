//! Markdown command files.
//!
//! Markdown commands skip the structural chain entirely. The description
//! comes from a `Purpose:` line when there is one; everything else in the
//! body is the prompt.

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::chain::yaml_to_json;
use crate::types::{ArgumentSpec, Command};
use crate::ParseError;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Z][A-Z0-9_]*)\b").expect("valid placeholder regex"));

const PURPOSE_MARKER: &str = "Purpose:";

/// Parses a markdown command. `name` is the file's base name.
pub fn parse_markdown_command(name: &str, text: &str) -> Command {
    let (frontmatter, body) = split_frontmatter(text);
    let (purpose, prompt_body) = take_purpose(body.trim());
    let description = purpose
        .or_else(|| frontmatter_description(frontmatter.as_deref()))
        .or_else(|| first_heading(&prompt_body))
        .unwrap_or_default();
    let argument_specs = extract_arguments(&prompt_body, &HashMap::new());
    Command {
        name: name.to_string(),
        description,
        prompt_body,
        argument_specs,
    }
}

/// Splits an optional leading `---` YAML block from the body.
///
/// Returns `(frontmatter_yaml, body)`. An unterminated block is treated as
/// body text.
pub fn split_frontmatter(content: &str) -> (Option<String>, &str) {
    let trimmed = content.trim_start_matches('\u{feff}').trim_start();
    let Some(after_open) = trimmed.strip_prefix("---") else {
        return (None, content);
    };
    let after_open = after_open.trim_start_matches([' ', '\t']);
    let Some(after_open) = after_open
        .strip_prefix("\r\n")
        .or_else(|| after_open.strip_prefix('\n'))
    else {
        return (None, content);
    };
    if let Some(end) = after_open.find("\n---") {
        let yaml = &after_open[..end];
        let rest = &after_open[end + 4..];
        let rest = rest.split_once('\n').map(|(_, r)| r).unwrap_or("");
        (Some(yaml.trim_end_matches('\r').to_string()), rest)
    } else {
        (None, content)
    }
}

/// Pulls the first non-empty `Purpose:` line out of `body`. The rest of the
/// body, minus that line, is the prompt.
fn take_purpose(body: &str) -> (Option<String>, String) {
    let found = body.lines().enumerate().find_map(|(index, line)| {
        let (_, after) = line.split_once(PURPOSE_MARKER)?;
        let text = after.trim().trim_matches('*').trim();
        (!text.is_empty()).then(|| (index, text.to_string()))
    });
    match found {
        Some((index, purpose)) => {
            let rest: Vec<&str> = body
                .lines()
                .enumerate()
                .filter_map(|(i, line)| (i != index).then_some(line))
                .collect();
            (Some(purpose), rest.join("\n").trim().to_string())
        }
        None => (None, body.to_string()),
    }
}

fn frontmatter_description(yaml: Option<&str>) -> Option<String> {
    let value: serde_yaml::Value = serde_yaml::from_str(yaml?).ok()?;
    let mut ignored = Vec::new();
    match yaml_to_json(value, &mut ignored) {
        Value::Object(map) => map
            .get("description")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

fn first_heading(body: &str) -> Option<String> {
    body.lines().find_map(|line| {
        let text = line.trim_start().strip_prefix('#')?;
        let text = text.trim_start_matches('#').trim();
        (!text.is_empty()).then(|| text.to_string())
    })
}

/// Discovers `$UPPER_CASE` placeholders, de-duplicated by name in order of
/// first appearance. `declared` supplies optional descriptions by name.
pub fn extract_arguments(prompt: &str, declared: &HashMap<String, String>) -> Vec<ArgumentSpec> {
    let mut seen = std::collections::HashSet::new();
    PLACEHOLDER
        .captures_iter(prompt)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .filter(|name| seen.insert(*name))
        .map(|name| ArgumentSpec {
            name: name.to_string(),
            description: declared
                .get(name)
                .cloned()
                .unwrap_or_else(|| format!("Value for ${name}")),
            required: true,
        })
        .collect()
}

impl Command {
    /// Substitutes every placeholder with its argument value.
    ///
    /// Every declared argument is required; all missing names are reported
    /// together.
    pub fn render(&self, args: &HashMap<String, String>) -> Result<String, ParseError> {
        let missing: Vec<String> = self
            .argument_specs
            .iter()
            .filter(|spec| spec.required && !args.contains_key(&spec.name))
            .map(|spec| spec.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(ParseError::MissingArguments {
                command: self.name.clone(),
                missing,
            });
        }
        let rendered = PLACEHOLDER.replace_all(&self.prompt_body, |caps: &regex::Captures<'_>| {
            args.get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        });
        Ok(rendered.into_owned())
    }
}
