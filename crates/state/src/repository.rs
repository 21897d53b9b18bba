//! Remote repository references.

use std::fmt;

use crate::ConfigError;

/// `owner/repo` on a git host, parsed from a repository URL.
///
/// Accepted forms:
/// - `https://github.com/owner/repo` (optionally `.git`, trailing path ignored)
/// - `ssh://git@github.com/owner/repo.git`
/// - `git@github.com:owner/repo.git`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    pub host: String,
    pub owner: String,
    pub repo: String,
}

impl RepositoryRef {
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::RepositoryUrl(url.to_string());
        let trimmed = url.trim();

        let (authority, path) = if let Some((_, rest)) = trimmed.split_once("://") {
            rest.split_once('/').ok_or_else(invalid)?
        } else {
            trimmed.split_once(':').ok_or_else(invalid)?
        };
        let host = authority
            .rsplit_once('@')
            .map(|(_, h)| h)
            .unwrap_or(authority);

        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let owner = segments.next().ok_or_else(invalid)?;
        let repo = segments.next().ok_or_else(invalid)?;
        let repo = repo.strip_suffix(".git").unwrap_or(repo);

        if host.is_empty() || owner.is_empty() || repo.is_empty() || host.contains(' ') {
            return Err(invalid());
        }
        Ok(Self {
            host: host.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}
