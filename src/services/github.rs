//! GitHub service for README retrieval.
//!
//! Implements [`ContentFetcher`] against the GitHub REST API. Every failure
//! is classified into a [`FetchError`] kind so callers can tell a missing
//! README from a timeout or an exhausted rate limit.

use async_trait::async_trait;
use base64::Engine;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::GitHubConfig;
use crate::error::{Error, Result};
use crate::models::RepositoryIdentity;

/// Failure kinds of a content fetch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access forbidden: {0}")]
    Forbidden(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Stable name of the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::Unauthorized(_) => "unauthorized",
            Self::RateLimited(_) => "rate_limited",
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::Malformed(_) => "malformed",
        }
    }
}

/// Source of the primary document (README) of a repository.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch_primary_document(
        &self,
        identity: &RepositoryIdentity,
    ) -> std::result::Result<String, FetchError>;
}

/// GitHub file content
#[derive(Debug, Clone, Deserialize)]
struct ReadmeContent {
    content: Option<String>,
    encoding: Option<String>,
}

/// Service for GitHub API operations.
#[derive(Clone)]
pub struct GitHubService {
    client: Client,
    api_url: String,
    token: Option<String>,
    timeout_secs: u64,
}

impl GitHubService {
    /// Create a new GitHub service.
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("DeepWiki/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            api_url = %config.api_url,
            authenticated = config.token.is_some(),
            "GitHub service initialized"
        );

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    /// Build headers with optional authentication.
    fn build_headers(&self) -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github.v3+json"),
        );
        if let Some(token) = &self.token {
            match header::HeaderValue::from_str(&format!("token {}", token)) {
                Ok(value) => {
                    headers.insert(header::AUTHORIZATION, value);
                }
                Err(_) => warn!("GitHub token contains invalid header characters, sending unauthenticated"),
            }
        }
        headers
    }

    /// Get the decoded README of a repository.
    pub async fn get_readme(
        &self,
        owner: &str,
        repo: &str,
    ) -> std::result::Result<String, FetchError> {
        let url = format!("{}/repos/{}/{}/readme", self.api_url, owner, repo);
        let full_name = format!("{}/{}", owner, repo);

        debug!(repo = %full_name, "Fetching README");

        let response = self
            .client
            .get(&url)
            .headers(self.build_headers())
            .send()
            .await
            .map_err(|e| self.classify_transport_error(&full_name, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.classify_status(&full_name, status, response.headers()));
        }

        let body: ReadmeContent = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.classify_transport_error(&full_name, e)
            } else {
                FetchError::Malformed(format!("Failed to parse README response for {}: {}", full_name, e))
            }
        })?;

        decode_content(&full_name, body)
    }

    fn classify_transport_error(&self, full_name: &str, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(format!(
                "GitHub did not respond within {}s while fetching {}",
                self.timeout_secs, full_name
            ))
        } else {
            FetchError::Transport(format!("Request to GitHub failed for {}: {}", full_name, e))
        }
    }

    fn classify_status(
        &self,
        full_name: &str,
        status: StatusCode,
        headers: &header::HeaderMap,
    ) -> FetchError {
        let rate_limit_exhausted = headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim() == "0")
            .unwrap_or(false);

        match status {
            StatusCode::NOT_FOUND => {
                FetchError::NotFound(format!("README not found for repository {}", full_name))
            }
            StatusCode::UNAUTHORIZED => {
                FetchError::Unauthorized("GitHub rejected the configured API token".to_string())
            }
            StatusCode::TOO_MANY_REQUESTS => {
                FetchError::RateLimited("GitHub API rate limit exceeded".to_string())
            }
            StatusCode::FORBIDDEN if rate_limit_exhausted => FetchError::RateLimited(
                "GitHub API rate limit exceeded".to_string(),
            ),
            StatusCode::FORBIDDEN => {
                if self.token.is_some() {
                    FetchError::Forbidden(format!(
                        "Access to {} is forbidden for the configured token",
                        full_name
                    ))
                } else {
                    FetchError::Forbidden(format!(
                        "Access to {} is forbidden, no GitHub token is configured",
                        full_name
                    ))
                }
            }
            other => FetchError::Transport(format!(
                "GitHub API error {} while fetching {}",
                other, full_name
            )),
        }
    }
}

#[async_trait]
impl ContentFetcher for GitHubService {
    async fn fetch_primary_document(
        &self,
        identity: &RepositoryIdentity,
    ) -> std::result::Result<String, FetchError> {
        self.get_readme(&identity.owner, &identity.name).await
    }
}

/// Decode the `content` field of a contents API response.
fn decode_content(full_name: &str, body: ReadmeContent) -> std::result::Result<String, FetchError> {
    let content = match body.content {
        Some(c) if !c.trim().is_empty() => c,
        _ => {
            return Err(FetchError::NotFound(format!(
                "README for {} has no content",
                full_name
            )))
        }
    };

    match body.encoding.as_deref() {
        None | Some("base64") => {
            // GitHub wraps base64 payloads at 60 columns
            let compact: String = content.split_whitespace().collect();
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(compact)
                .map_err(|e| {
                    FetchError::Malformed(format!("Failed to decode README for {}: {}", full_name, e))
                })?;
            String::from_utf8(decoded).map_err(|e| {
                FetchError::Malformed(format!("README for {} is not valid UTF-8: {}", full_name, e))
            })
        }
        Some("utf-8") | Some("utf8") => Ok(content),
        Some(other) => Err(FetchError::Malformed(format!(
            "Unsupported README encoding '{}' for {}",
            other, full_name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(content: Option<&str>, encoding: Option<&str>) -> ReadmeContent {
        ReadmeContent {
            content: content.map(str::to_string),
            encoding: encoding.map(str::to_string),
        }
    }

    #[test]
    fn test_decode_wrapped_base64() {
        // "# Widgets\nA widget library." split across lines
        let content = "IyBXaWRnZXRzCkEgd2lk\nZ2V0IGxpYnJhcnku\n";
        let decoded = decode_content("acme/widgets", body(Some(content), Some("base64"))).unwrap();
        assert_eq!(decoded, "# Widgets\nA widget library.");
    }

    #[test]
    fn test_missing_content_is_not_found() {
        let err = decode_content("acme/widgets", body(None, Some("base64"))).unwrap_err();
        assert_eq!(err.kind(), "not_found");

        let err = decode_content("acme/widgets", body(Some("  \n"), Some("base64"))).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_garbage_is_malformed() {
        let err = decode_content("acme/widgets", body(Some("%%%not base64%%%"), Some("base64")))
            .unwrap_err();
        assert_eq!(err.kind(), "malformed");

        // 0xFF 0xFE is not UTF-8
        let err = decode_content("acme/widgets", body(Some("//4="), Some("base64"))).unwrap_err();
        assert_eq!(err.kind(), "malformed");
    }

    #[test]
    fn test_forbidden_message_mentions_token() {
        let mut config = GitHubConfig::default();
        let anonymous = GitHubService::new(&config).unwrap();
        let err = anonymous.classify_status("acme/widgets", StatusCode::FORBIDDEN, &header::HeaderMap::new());
        assert!(matches!(&err, FetchError::Forbidden(m) if m.contains("no GitHub token")));

        config.token = Some("secret".to_string());
        let authed = GitHubService::new(&config).unwrap();
        let err = authed.classify_status("acme/widgets", StatusCode::FORBIDDEN, &header::HeaderMap::new());
        assert!(matches!(&err, FetchError::Forbidden(m) if m.contains("configured token")));

        let mut headers = header::HeaderMap::new();
        headers.insert("x-ratelimit-remaining", header::HeaderValue::from_static("0"));
        let err = authed.classify_status("acme/widgets", StatusCode::FORBIDDEN, &headers);
        assert_eq!(err.kind(), "rate_limited");
    }
}
