//! Shared test utilities for grimoire crates.
//!
//! Environment guards for tests that touch process state, and a temporary
//! artifact library laid out the way the filesystem source expects it.

use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, MutexGuard};

/// Serialize tests that mutate process-global state (env vars, cwd, etc).
pub fn env_guard() -> MutexGuard<'static, ()> {
    static TEST_SERIAL: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));
    TEST_SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

/// RAII guard for an environment variable; restores the original on drop.
pub struct EnvVarGuard {
    key: &'static str,
    previous: Option<String>,
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        match &self.previous {
            Some(v) => std::env::set_var(self.key, v),
            None => std::env::remove_var(self.key),
        }
    }
}

/// Sets (or with `None`, removes) a variable until the guard drops.
///
/// ```
/// let _guard = grimoire_test_utils::set_env_var("GRIMOIRE_DOCTEST_VAR", Some("value"));
/// assert_eq!(std::env::var("GRIMOIRE_DOCTEST_VAR").unwrap(), "value");
/// ```
pub fn set_env_var(key: &'static str, value: Option<&str>) -> EnvVarGuard {
    let previous = std::env::var(key).ok();
    match value {
        Some(val) => std::env::set_var(key, val),
        None => std::env::remove_var(key),
    }
    EnvVarGuard { key, previous }
}

/// A temporary artifact library: `commands/`, `personas/`, and `rules.yml`
/// under one root. Removed when dropped.
pub struct LibraryFixture {
    pub tempdir: tempfile::TempDir,
    pub commands: PathBuf,
    pub personas: PathBuf,
}

impl LibraryFixture {
    /// Creates the root with empty `commands/` and `personas/` directories.
    pub fn new() -> std::io::Result<Self> {
        let tempdir = tempfile::tempdir()?;
        let commands = tempdir.path().join("commands");
        let personas = tempdir.path().join("personas");
        std::fs::create_dir_all(&commands)?;
        std::fs::create_dir_all(&personas)?;
        Ok(Self {
            tempdir,
            commands,
            personas,
        })
    }

    pub fn root(&self) -> &Path {
        self.tempdir.path()
    }

    /// Writes `commands/<file_name>`; nested names create subdirectories.
    pub fn command(&self, file_name: &str, content: &str) -> std::io::Result<PathBuf> {
        write(&self.commands.join(file_name), content)
    }

    pub fn persona(&self, file_name: &str, content: &str) -> std::io::Result<PathBuf> {
        write(&self.personas.join(file_name), content)
    }

    pub fn rules(&self, content: &str) -> std::io::Result<PathBuf> {
        write(&self.root().join("rules.yml"), content)
    }

    pub fn remove(&self, relative: &str) -> std::io::Result<()> {
        std::fs::remove_file(self.root().join(relative))
    }
}

fn write(path: &Path, content: &str) -> std::io::Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_env_var_sets_and_restores() {
        let _g = env_guard();
        const KEY: &str = "GRIMOIRE_TEST_UTILS_TEST_VAR";
        std::env::remove_var(KEY);
        {
            let _guard = set_env_var(KEY, Some("test_value"));
            assert_eq!(std::env::var(KEY).ok(), Some("test_value".to_string()));
        }
        assert!(std::env::var(KEY).is_err());
    }

    #[test]
    fn set_env_var_removes_when_none() {
        let _g = env_guard();
        const KEY: &str = "GRIMOIRE_TEST_REMOVE_VAR";
        std::env::set_var(KEY, "exists");
        {
            let _guard = set_env_var(KEY, None);
            assert!(std::env::var(KEY).is_err());
        }
        assert_eq!(std::env::var(KEY).ok(), Some("exists".to_string()));
        std::env::remove_var(KEY);
    }

    #[test]
    fn fixture_lays_out_library() {
        let lib = LibraryFixture::new().expect("fixture creation");
        assert!(lib.commands.is_dir());
        assert!(lib.personas.is_dir());
        let nested = lib.command("git/commit.md", "Commit $MSG").unwrap();
        assert!(nested.exists());
        lib.rules("rules: []").unwrap();
        lib.remove("rules.yml").unwrap();
        assert!(!lib.root().join("rules.yml").exists());
    }
}
