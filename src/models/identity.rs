//! Repository identity resolution.
//!
//! Turns a user-supplied GitHub URL into a validated `(owner, name)` pair.
//! Pure and deterministic; no network access.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Hosts accepted as repository sources.
const ACCEPTED_HOSTS: &[&str] = &["github.com", "www.github.com"];

/// Owner: alphanumeric and hyphens, no leading/trailing hyphen, max 39 chars.
static OWNER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,37}[A-Za-z0-9])?$").unwrap());

/// Repository name: alphanumeric plus `_`, `.` and `-`, 1 to 100 chars.
static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]{1,100}$").unwrap());

/// Normalized identity of a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryIdentity {
    pub owner: String,
    pub name: String,
    /// `{owner}_{name}`
    pub canonical_id: String,
}

impl RepositoryIdentity {
    /// Resolve a repository URL into its identity.
    ///
    /// Accepts `https://github.com/<owner>/<name>` with an optional `.git`
    /// suffix, trailing slash, or further path segments (`/tree/main`,
    /// `/blob/...`), of which only the first two are used.
    pub fn resolve(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::InvalidUrl("URL must not be empty".to_string()));
        }

        let url = Url::parse(input)
            .map_err(|e| Error::InvalidUrl(format!("'{}' is not a well-formed URL: {}", input, e)))?;

        if url.scheme() != "https" {
            return Err(Error::InvalidUrl(format!(
                "unsupported scheme '{}', expected https://github.com/<owner>/<repo>",
                url.scheme()
            )));
        }

        let host = url.host_str().unwrap_or_default().to_lowercase();
        if !ACCEPTED_HOSTS.contains(&host.as_str()) || url.port().is_some() {
            return Err(Error::InvalidUrl(format!(
                "unsupported host '{}', expected https://github.com/<owner>/<repo>",
                host
            )));
        }

        let mut segments = url.path_segments().into_iter().flatten();
        let owner = segments.next().unwrap_or_default();
        let name = segments.next().unwrap_or_default();

        if owner.is_empty() {
            return Err(Error::InvalidUrl("owner is missing from the URL path".to_string()));
        }
        if name.is_empty() {
            return Err(Error::InvalidUrl(
                "repository name is missing from the URL path".to_string(),
            ));
        }

        let name = name.strip_suffix(".git").unwrap_or(name);

        Self::new(owner, name)
    }

    /// Build an identity from already separated parts, applying the same
    /// validation as [`resolve`](Self::resolve).
    pub fn new(owner: &str, name: &str) -> Result<Self> {
        if !OWNER_RE.is_match(owner) {
            return Err(Error::InvalidUrl(format!(
                "invalid owner '{}': only alphanumeric characters and hyphens are allowed, \
                 and it cannot start or end with a hyphen",
                owner
            )));
        }
        if !NAME_RE.is_match(name) || name.contains("..") || name.starts_with('-') {
            return Err(Error::InvalidUrl(format!(
                "invalid repository name '{}': only alphanumeric characters, hyphens, periods \
                 and underscores are allowed, without '..' or a leading hyphen",
                name
            )));
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            canonical_id: format!("{}_{}", owner, name),
        })
    }

    /// Canonical repository URL, used as the unique key for stored repositories.
    pub fn url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }

    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepositoryIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
