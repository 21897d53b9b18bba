//! Remote repository source speaking the GitHub contents API.
//!
//! Directories are listed through `{api}/repos/{owner}/{repo}/contents/{path}`
//! and file bodies come from `{raw}/{owner}/{repo}/{branch}/{path}`. Both are
//! cached per path for the configured TTL. A 404 means "not there" and is
//! never an error.

mod cache;

use async_trait::async_trait;
use futures::future::{try_join_all, BoxFuture, FutureExt};
use grimoire_parser::{Command, FileFormat, Loaded, Location, Persona, Rule};
use grimoire_state::RepositoryRef;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    assemble, take_commands, take_personas, take_rules, LoaderError, Result, SourceFile,
    SourceLoader, COMMANDS_DIR, PERSONAS_DIR, RULES_FILES,
};
use cache::TtlCache;

const DEFAULT_API_BASE: &str = "https://api.github.com";
const DEFAULT_RAW_BASE: &str = "https://raw.githubusercontent.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    /// `file`, `dir`, `symlink`, or `submodule`.
    #[serde(rename = "type")]
    pub kind: String,
}

pub struct RemoteLoader {
    client: reqwest::Client,
    repo: RepositoryRef,
    branch: String,
    api_base: String,
    raw_base: String,
    token: Option<String>,
    listings: TtlCache<Arc<Vec<ContentEntry>>>,
    bodies: TtlCache<Option<Arc<str>>>,
}

impl std::fmt::Debug for RemoteLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteLoader")
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("api_base", &self.api_base)
            .field("raw_base", &self.raw_base)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RemoteLoader {
    pub fn new(
        repo: RepositoryRef,
        branch: &str,
        cache_ttl: Duration,
        token: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("grimoire/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| LoaderError::Http {
                url: DEFAULT_API_BASE.to_string(),
                source,
            })?;
        Ok(Self {
            client,
            repo,
            branch: branch.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            raw_base: DEFAULT_RAW_BASE.to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            listings: TtlCache::new(cache_ttl),
            bodies: TtlCache::new(cache_ttl),
        })
    }

    /// Points the loader at different listing and raw-content hosts.
    pub fn with_endpoints(mut self, api_base: impl Into<String>, raw_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self.raw_base = raw_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Number of cached listings and bodies.
    pub fn cached_entries(&self) -> usize {
        self.listings.len() + self.bodies.len()
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    /// Sends a request; `Ok(None)` on 404.
    async fn send(&self, url: &str, builder: reqwest::RequestBuilder) -> Result<Option<reqwest::Response>> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|source| LoaderError::Http {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(LoaderError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                hint: status_hint(status),
            });
        }
        Ok(Some(response))
    }

    async fn list_dir(&self, path: &str) -> Result<Arc<Vec<ContentEntry>>> {
        if let Some(hit) = self.listings.get(path) {
            return Ok(hit);
        }
        let url = format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base, self.repo.owner, self.repo.repo, path
        );
        let request = self
            .client
            .get(&url)
            .query(&[("ref", self.branch.as_str())])
            .header(ACCEPT, "application/vnd.github.v3+json");
        let entries = match self.send(&url, request).await? {
            Some(response) => response
                .json::<Vec<ContentEntry>>()
                .await
                .map_err(|source| LoaderError::Http { url, source })?,
            None => {
                tracing::debug!(target: "grimoire::loader", path, "remote directory absent");
                Vec::new()
            }
        };
        let entries = Arc::new(entries);
        self.listings.insert(path.to_string(), Arc::clone(&entries));
        Ok(entries)
    }

    /// Every artifact file below `path`. Each directory is listed before
    /// its files are reported; sibling directories are listed concurrently.
    fn list_tree(&self, path: String) -> BoxFuture<'_, Result<Vec<String>>> {
        async move {
            let entries = self.list_dir(&path).await?;
            let mut files = Vec::new();
            let mut subdirs = Vec::new();
            for entry in entries.iter() {
                match entry.kind.as_str() {
                    "file" if FileFormat::from_path(&entry.path).is_some() => {
                        files.push(entry.path.clone())
                    }
                    "dir" => subdirs.push(entry.path.clone()),
                    _ => {}
                }
            }
            let nested = try_join_all(subdirs.into_iter().map(|dir| self.list_tree(dir))).await?;
            files.extend(nested.into_iter().flatten());
            Ok(files)
        }
        .boxed()
    }

    /// Raw body of one file; `Ok(None)` on 404.
    async fn fetch_raw(&self, path: &str) -> Result<Option<Arc<str>>> {
        if let Some(hit) = self.bodies.get(path) {
            return Ok(hit);
        }
        let url = format!(
            "{}/{}/{}/{}/{}",
            self.raw_base, self.repo.owner, self.repo.repo, self.branch, path
        );
        let body = match self.send(&url, self.client.get(&url)).await? {
            Some(response) => Some(Arc::<str>::from(
                response
                    .text()
                    .await
                    .map_err(|source| LoaderError::Http { url, source })?,
            )),
            None => None,
        };
        self.bodies.insert(path.to_string(), body.clone());
        Ok(body)
    }

    async fn read_tree(&self, dir: &str) -> Result<Vec<SourceFile>> {
        let mut paths = self.list_tree(dir.to_string()).await?;
        paths.sort();
        let bodies = try_join_all(paths.iter().map(|p| self.fetch_raw(p))).await?;
        Ok(paths
            .into_iter()
            .zip(bodies)
            .filter_map(|(path, body)| {
                body.map(|text| SourceFile {
                    path,
                    text: text.to_string(),
                })
            })
            .collect())
    }

    async fn read_rules(&self) -> Result<Vec<SourceFile>> {
        for name in RULES_FILES {
            if let Some(text) = self.fetch_raw(name).await? {
                return Ok(vec![SourceFile {
                    path: name.to_string(),
                    text: text.to_string(),
                }]);
            }
        }
        tracing::debug!(target: "grimoire::loader", repo = %self.repo, "no remote rules file");
        Ok(Vec::new())
    }
}

fn status_hint(status: StatusCode) -> Option<&'static str> {
    match status.as_u16() {
        401 => Some("authentication failed; verify GITHUB_TOKEN"),
        403 => Some("forbidden or rate limited; set GITHUB_TOKEN for higher limits"),
        429 => Some("rate limited; retry later"),
        _ => None,
    }
}

#[async_trait]
impl SourceLoader for RemoteLoader {
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

    fn clear_cache(&self) {
        self.listings.clear();
        self.bodies.clear();
        tracing::debug!(target: "grimoire::loader", repo = %self.repo, "remote cache cleared");
    }

    fn describe(&self) -> String {
        format!("remote:{}@{}", self.repo, self.branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_token() {
        let repo = RepositoryRef::parse("https://github.com/acme/prompts").unwrap();
        let loader = RemoteLoader::new(repo, "main", Duration::ZERO, Some("s3cret".into())).unwrap();
        let rendered = format!("{loader:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn endpoints_drop_trailing_slash() {
        let repo = RepositoryRef::parse("git@github.com:acme/prompts.git").unwrap();
        let loader = RemoteLoader::new(repo, "dev", Duration::ZERO, None)
            .unwrap()
            .with_endpoints("http://api.local/", "http://raw.local/");
        assert_eq!(loader.api_base, "http://api.local");
        assert_eq!(loader.raw_base, "http://raw.local");
        assert_eq!(loader.describe(), "remote:acme/prompts@dev");
    }

    #[test]
    fn hints_for_auth_statuses() {
        assert!(status_hint(StatusCode::FORBIDDEN).is_some());
        assert!(status_hint(StatusCode::INTERNAL_SERVER_ERROR).is_none());
    }
}
