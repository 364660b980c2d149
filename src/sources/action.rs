//! GitHub Action version source (repository tags via the GitHub API)

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::resolve::{ResolveError, ResolveOptions, Resolver, SourceError, select_latest};
use crate::sources::USER_AGENT;
use crate::sources::rate_limit::RateLimiter;

#[cfg(test)]
use mockall::automock;

const GITHUB_API: &str = "https://api.github.com";
const PER_PAGE: u32 = 100;

// GitHub allows 5000 requests per hour when authenticated, 60 otherwise.
const AUTHENTICATED_RATE: u64 = 5000;
const ANONYMOUS_RATE: u64 = 60;
const AUTHENTICATED_BURST: u64 = 10;
const ANONYMOUS_BURST: u64 = 1;

/// A `uses:` reference from a workflow step: `owner/repo@version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRef {
    pub owner: String,
    pub repo: String,
    pub version: String,
}

impl ActionRef {
    /// Parses `owner/repo@version`. Subpath actions (`owner/repo/path@v1`)
    /// resolve against the repository itself.
    pub fn parse(uses: &str) -> Result<Self, SourceError> {
        let (name, version) = uses.split_once('@').ok_or_else(|| {
            SourceError::InvalidReference(format!("action reference without version: {uses}"))
        })?;
        let mut segments = name.split('/');
        let (Some(owner), Some(repo)) = (segments.next(), segments.next()) else {
            return Err(SourceError::InvalidReference(format!(
                "action reference must be owner/repo@version: {uses}"
            )));
        };
        if owner.is_empty() || repo.is_empty() || version.is_empty() {
            return Err(SourceError::InvalidReference(format!(
                "action reference must be owner/repo@version: {uses}"
            )));
        }
        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            version: version.to_string(),
        })
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.version)
    }
}

/// Lists the tags of a repository hosting an action.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ActionTagLister: Send + Sync {
    async fn list_tags(&self, owner: &str, repo: &str) -> Result<Vec<String>, SourceError>;
}

/// GitHub API client. Requests pass through a token bucket sized to the
/// documented API quota for the credential in use.
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    limiter: RateLimiter,
}

#[derive(Deserialize)]
struct Tag {
    name: String,
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Self {
        Self::with_base_url(GITHUB_API.to_string(), token)
    }

    pub fn with_base_url(base_url: String, token: Option<String>) -> Self {
        let (rate, burst) = if token.is_some() {
            (AUTHENTICATED_RATE, AUTHENTICATED_BURST)
        } else {
            (ANONYMOUS_RATE, ANONYMOUS_BURST)
        };
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .expect("failed to create HTTP client"),
            base_url,
            token,
            limiter: RateLimiter::new(rate, Duration::from_secs(3600), burst),
        }
    }
}

#[async_trait::async_trait]
impl ActionTagLister for GitHubClient {
    async fn list_tags(&self, owner: &str, repo: &str) -> Result<Vec<String>, SourceError> {
        self.limiter.acquire().await;
        debug!(owner, repo, "listing repository tags");
        let url = format!(
            "{}/repos/{owner}/{repo}/tags?per_page={PER_PAGE}",
            self.base_url
        );
        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        match response.status() {
            reqwest::StatusCode::OK => {}
            reqwest::StatusCode::NOT_FOUND => {
                return Err(SourceError::NotFound(format!("{owner}/{repo}")));
            }
            reqwest::StatusCode::FORBIDDEN | reqwest::StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                return Err(SourceError::RateLimited { retry_after_secs });
            }
            status => {
                return Err(SourceError::InvalidResponse(format!(
                    "GitHub API returned {status} for {owner}/{repo}"
                )));
            }
        }

        let tags: Vec<Tag> = response.json().await?;
        Ok(tags.into_iter().map(|t| t.name).collect())
    }
}

/// Resolves the best version for an action by listing its repository tags.
pub struct ActionResolver<S> {
    source: S,
}

impl<S: ActionTagLister> ActionResolver<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

#[async_trait::async_trait]
impl<S: ActionTagLister> Resolver<ActionRef> for ActionResolver<S> {
    async fn resolve(
        &self,
        reference: &ActionRef,
        opts: &ResolveOptions,
    ) -> Result<Option<String>, ResolveError> {
        let tags = self
            .source
            .list_tags(&reference.owner, &reference.repo)
            .await?;
        Ok(select_latest(&reference.version, &tags, opts)?)
    }
}
