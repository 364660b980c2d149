//! Helm chart version source (repository `index.yaml`)

use std::collections::HashMap;

use serde::Deserialize;

use crate::resolve::{ResolveError, ResolveOptions, Resolver, SourceError, select_latest};
use crate::sources::USER_AGENT;

#[cfg(test)]
use mockall::automock;

/// A chart reference from a cluster config: repository URL, chart name and
/// the currently pinned version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRef {
    pub repository: String,
    pub name: String,
    pub version: String,
}

/// Lists the versions published for a chart in a repository.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ChartVersionLister: Send + Sync {
    async fn list_versions(
        &self,
        repository: &str,
        chart: &str,
    ) -> Result<Vec<String>, SourceError>;
}

/// Fetches `index.yaml` from a Helm repository and reads the version list
/// for one chart.
pub struct HelmRepoClient {
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct RepoIndex {
    entries: HashMap<String, Vec<ChartEntry>>,
}

#[derive(Deserialize)]
struct ChartEntry {
    version: String,
}

impl HelmRepoClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .expect("failed to create HTTP client"),
        }
    }
}

impl Default for HelmRepoClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ChartVersionLister for HelmRepoClient {
    async fn list_versions(
        &self,
        repository: &str,
        chart: &str,
    ) -> Result<Vec<String>, SourceError> {
        let url = format!("{}/index.yaml", repository.trim_end_matches('/'));
        let response = self.client.get(&url).send().await?;
        match response.status() {
            reqwest::StatusCode::OK => {}
            reqwest::StatusCode::NOT_FOUND => {
                return Err(SourceError::NotFound(repository.to_string()));
            }
            status => {
                return Err(SourceError::InvalidResponse(format!(
                    "chart repository returned {status} for {url}"
                )));
            }
        }
        let body = response.text().await?;
        let index: RepoIndex = serde_yaml::from_str(&body)
            .map_err(|e| SourceError::InvalidResponse(format!("invalid index.yaml: {e}")))?;
        let entries = index
            .entries
            .get(chart)
            .ok_or_else(|| SourceError::NotFound(format!("{repository}: chart {chart}")))?;
        Ok(entries.iter().map(|e| e.version.clone()).collect())
    }
}

/// Resolves the best version for a chart by reading its repository index.
pub struct ChartResolver<S> {
    source: S,
}

impl<S: ChartVersionLister> ChartResolver<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

#[async_trait::async_trait]
impl<S: ChartVersionLister> Resolver<ChartRef> for ChartResolver<S> {
    async fn resolve(
        &self,
        reference: &ChartRef,
        opts: &ResolveOptions,
    ) -> Result<Option<String>, ResolveError> {
        let versions = self
            .source
            .list_versions(&reference.repository, &reference.name)
            .await?;
        Ok(select_latest(&reference.version, &versions, opts)?)
    }
}
