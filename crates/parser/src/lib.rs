//! Structural parsing engine for grimoire artifacts.
//!
//! Converts raw command, persona, and rule files into typed records while
//! tolerating the malformed markup hand-edited definition files tend to
//! contain:
//! - an ordered fallback chain (lenient, strict, manual) for YAML/JSON,
//! - shape-based classification when a file's role is not evident,
//! - markdown command parsing with `$PLACEHOLDER` discovery.
//!
//! # Examples
//!
//! ```
//! use grimoire_parser::{parse_file, Location};
//!
//! let out = parse_file(
//!     Location::Commands,
//!     "commands/greet.yaml",
//!     "name: greet\nprompt: Hello $NAME\nname: greet\n",
//! );
//! assert_eq!(out.commands[0].argument_specs[0].name, "NAME");
//! ```

#![deny(unsafe_code)]

/// Ordered fallback chain for structural text.
pub mod chain;
/// Shape-based document classification.
pub mod classify;
/// Per-file entry point used by the loaders.
pub mod engine;
/// Line-oriented descent parser.
pub mod manual;
/// Markdown commands and placeholders.
pub mod markdown;
/// Document to artifact conversion.
pub mod normalize;
/// Artifact data model.
pub mod types;

pub use chain::{parse_structural, Document, Parsed, Tier};
pub use classify::{classify, Classification};
pub use engine::{file_stem, parse_file, FileArtifacts, FileFormat, Location};
pub use markdown::{extract_arguments, parse_markdown_command};
pub use normalize::flatten_rules;
pub use types::{ArgumentSpec, ArtifactKind, Command, Loaded, Persona, Rule, UnparsedFile};

/// Errors produced by the parsing engine.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    /// Every tier of the fallback chain rejected the text.
    #[error("all parse tiers failed: {reasons}")]
    Exhausted { reasons: String },
    /// A command was rendered without all of its placeholders.
    #[error("command `{command}` is missing required arguments: {}", missing.join(", "))]
    MissingArguments {
        command: String,
        missing: Vec<String>,
    },
}

/// Result type for parsing operations.
pub type Result<T> = std::result::Result<T, ParseError>;
