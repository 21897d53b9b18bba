//! Single entry point the loaders call for every fetched file.

use std::path::Path;

use crate::chain::parse_structural;
use crate::classify::{classify, field, Classification};
use crate::markdown::parse_markdown_command;
use crate::normalize::{
    command_from_document, flatten_rules, persona_from_document, personas_from_collection,
};
use crate::types::{Command, Persona, Rule, UnparsedFile};

/// Where a file was found, which tells the engine what it should contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Commands,
    Personas,
    Rules,
    /// Role not evident from the path; classification decides.
    Unspecified,
}

/// How a file's text is interpreted, decided by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Markdown,
    Structural,
}

impl FileFormat {
    /// Returns `None` for extensions the engine does not read.
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "md" | "markdown" => Some(FileFormat::Markdown),
            "yaml" | "yml" | "json" => Some(FileFormat::Structural),
            _ => None,
        }
    }
}

/// Everything one file contributed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileArtifacts {
    pub commands: Vec<Command>,
    pub personas: Vec<Persona>,
    pub rules: Vec<Rule>,
    /// Set when no parsing tier accepted the file.
    pub unparsed: Option<UnparsedFile>,
}

/// Base name of `path` without its extension.
pub fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Parses one file found at `location`.
pub fn parse_file(location: Location, path: &str, text: &str) -> FileArtifacts {
    let mut out = FileArtifacts::default();
    let Some(format) = FileFormat::from_path(path) else {
        tracing::trace!(target: "grimoire::parser", path, "skipping non-artifact file");
        return out;
    };
    let stem = file_stem(path);

    if format == FileFormat::Markdown {
        match location {
            Location::Commands | Location::Unspecified => {
                out.commands.push(parse_markdown_command(&stem, text));
            }
            _ => {
                tracing::debug!(target: "grimoire::parser", path, ?location, "markdown outside commands; skipped");
            }
        }
        return out;
    }

    let parsed = match parse_structural(text) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::debug!(target: "grimoire::parser", path, error = %err, "file could not be parsed");
            out.unparsed = Some(UnparsedFile {
                path: path.to_string(),
                reason: err.to_string(),
            });
            return out;
        }
    };
    let Some(doc) = parsed.document.as_object() else {
        return out;
    };

    if location == Location::Rules {
        out.rules = flatten_rules(&parsed.document);
        return out;
    }

    let class = classify(&parsed.document);
    match (location, class) {
        (Location::Commands | Location::Unspecified, Classification::Command) => {
            out.commands.extend(command_from_document(&stem, doc));
        }
        // Under commands/ a bare `prompt` is enough; the path says what it is.
        (Location::Commands, Classification::Unknown) if field(doc, "prompt").is_some() => {
            out.commands.extend(command_from_document(&stem, doc));
        }
        (Location::Personas | Location::Unspecified, Classification::Persona) => {
            out.personas.push(persona_from_document(&stem, doc));
        }
        (Location::Personas | Location::Unspecified, Classification::PersonaCollection) => {
            out.personas.extend(personas_from_collection(doc));
        }
        (Location::Unspecified, Classification::Rules) => {
            out.rules = flatten_rules(&parsed.document);
        }
        (_, Classification::Unknown) => {
            tracing::debug!(target: "grimoire::parser", path, "unclassifiable document; skipped");
        }
        (location, class) => {
            tracing::debug!(
                target: "grimoire::parser",
                path,
                ?location,
                ?class,
                "document does not belong at its location; skipped"
            );
        }
    }
    out
}
