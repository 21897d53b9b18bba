use serde::{Deserialize, Serialize};
use std::fmt;

/// The three artifact families the engine produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Prompt template with `$PLACEHOLDER` arguments.
    Command,
    /// Agent persona definition.
    Persona,
    /// Behavioral rule leaf.
    Rule,
}

impl ArtifactKind {
    /// Returns a stable label for this kind.
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactKind::Command => "command",
            ArtifactKind::Persona => "persona",
            ArtifactKind::Rule => "rule",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A placeholder discovered in a command prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentSpec {
    /// Placeholder name without the leading `$`.
    pub name: String,
    pub description: String,
    /// Placeholders are never optional.
    pub required: bool,
}

/// A prompt template.
///
/// `name` always comes from the source file's base name, so a rename shows up
/// as one command disappearing and another appearing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub name: String,
    pub description: String,
    pub prompt_body: String,
    #[serde(default)]
    pub argument_specs: Vec<ArgumentSpec>,
}

/// An agent persona.
///
/// `instructions` is the normalized concatenation of identity, core belief,
/// problem-solving approach, and focus, in that order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub description: String,
    pub instructions: String,
}

/// A flattened rule leaf. `name` is the last path segment only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub content: String,
}

/// A file that no parsing tier could make sense of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnparsedFile {
    /// Source-relative path (or remote path) of the file.
    pub path: String,
    /// Why the last tier gave up.
    pub reason: String,
}

/// Output of one load operation: the records plus every file that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loaded<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub unparsed: Vec<UnparsedFile>,
}

impl<T> Default for Loaded<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            unparsed: Vec::new(),
        }
    }
}

impl<T> Loaded<T> {
    /// Appends another outcome to this one, preserving order.
    pub fn extend(&mut self, other: Loaded<T>) {
        self.items.extend(other.items);
        self.unparsed.extend(other.unparsed);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.unparsed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_serializes_camel_case() {
        let cmd = Command {
            name: "greet".into(),
            description: String::new(),
            prompt_body: "Hello $NAME".into(),
            argument_specs: vec![ArgumentSpec {
                name: "NAME".into(),
                description: "Value for $NAME".into(),
                required: true,
            }],
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["promptBody"], "Hello $NAME");
        assert_eq!(json["argumentSpecs"][0]["required"], true);
    }

    #[test]
    fn loaded_extend_keeps_order() {
        let mut a = Loaded {
            items: vec![1, 2],
            unparsed: vec![],
        };
        a.extend(Loaded {
            items: vec![3],
            unparsed: vec![UnparsedFile {
                path: "x.yaml".into(),
                reason: "bad".into(),
            }],
        });
        assert_eq!(a.items, vec![1, 2, 3]);
        assert_eq!(a.unparsed.len(), 1);
        assert!(!a.is_empty());
    }
}
