//! Local directory source.

use async_trait::async_trait;
use grimoire_parser::{Command, FileFormat, Loaded, Location, Persona, Rule};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::{
    assemble, take_commands, take_personas, take_rules, LoaderError, Result, SourceFile,
    SourceLoader, COMMANDS_DIR, PERSONAS_DIR, RULES_FILES,
};

/// Reads artifacts from a directory tree. Holds no cache.
#[derive(Debug, Clone)]
pub struct FilesystemLoader {
    root: PathBuf,
}

impl FilesystemLoader {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read_tree(&self, dir: &str) -> Result<Vec<SourceFile>> {
        let root = self.root.clone();
        let dir = root.join(dir);
        tokio::task::spawn_blocking(move || scan(&root, &dir)).await?
    }

    async fn read_rules(&self) -> Result<Vec<SourceFile>> {
        for name in RULES_FILES {
            let path = self.root.join(name);
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    return Ok(vec![SourceFile {
                        path: name.to_string(),
                        text: decode(name, bytes),
                    }])
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => return Err(LoaderError::Io { path, source }),
            }
        }
        tracing::debug!(target: "grimoire::loader", root = %self.root.display(), "no rules file");
        Ok(Vec::new())
    }
}

/// Collects every artifact file under `dir`, sorted by path.
///
/// A missing directory yields nothing.
fn scan(root: &Path, dir: &Path) -> Result<Vec<SourceFile>> {
    if !dir.is_dir() {
        tracing::debug!(target: "grimoire::loader", dir = %dir.display(), "directory absent");
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = pathdiff::diff_paths(path, root).unwrap_or_else(|| path.to_path_buf());
        let relative = relative.to_string_lossy().replace('\\', "/");
        if FileFormat::from_path(&relative).is_none() {
            continue;
        }
        let bytes = std::fs::read(path).map_err(|source| LoaderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let text = decode(&relative, bytes);
        files.push(SourceFile {
            path: relative,
            text,
        });
    }
    Ok(files)
}

/// Undecodable bytes are the parser's problem, not a read failure.
fn decode(path: &str, bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(target: "grimoire::loader", path, "file is not valid UTF-8; decoding lossily");
            String::from_utf8_lossy(err.as_bytes()).into_owned()
        }
    }
}

#[async_trait]
impl SourceLoader for FilesystemLoader {
    async fn load_commands(&self) -> Result<Loaded<Command>> {
        let files = self.read_tree(COMMANDS_DIR).await?;
        Ok(assemble(files, Location::Commands, take_commands))
    }

    async fn load_personas(&self) -> Result<Loaded<Persona>> {
        let files = self.read_tree(PERSONAS_DIR).await?;
        Ok(assemble(files, Location::Personas, take_personas))
    }

    async fn load_rules(&self) -> Result<Loaded<Rule>> {
        let files = self.read_rules().await?;
        Ok(assemble(files, Location::Rules, take_rules))
    }

    fn clear_cache(&self) {}

    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }
}
