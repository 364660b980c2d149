//! Container image tag source (Docker Registry HTTP API v2)

use serde::Deserialize;
use tracing::debug;

use crate::resolve::{ResolveError, ResolveOptions, Resolver, SourceError, select_latest};
use crate::sources::USER_AGENT;

#[cfg(test)]
use mockall::automock;

const DEFAULT_REGISTRY: &str = "registry-1.docker.io";

/// A container image reference from a manifest: repository name plus the
/// currently pinned tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub name: String,
    pub tag: String,
}

/// Lists the tags published for an image.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait TagLister: Send + Sync {
    async fn list_tags(&self, image: &str) -> Result<Vec<String>, SourceError>;
}

/// Docker Registry v2 client. Handles the anonymous Bearer token dance for
/// registries that answer `401` with a `Www-Authenticate` challenge.
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: Option<String>,
}

#[derive(Deserialize)]
struct TagList {
    tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

impl RegistryClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .expect("failed to create HTTP client"),
            base_url: None,
        }
    }

    /// Directs every request at `base_url` instead of the registry host
    /// derived from the image name.
    pub fn with_base_url(base_url: String) -> Self {
        Self {
            base_url: Some(base_url),
            ..Self::new()
        }
    }

    /// Splits an image name into registry host and repository path.
    ///
    /// The first segment is a host when it contains a dot or port (or is
    /// `localhost`); otherwise the public registry is assumed and bare names
    /// get the `library/` prefix.
    fn split_image(image: &str) -> Result<(String, String), SourceError> {
        let (host, repository) = match image.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            }
            Some(_) => (DEFAULT_REGISTRY.to_string(), image.to_string()),
            None => (DEFAULT_REGISTRY.to_string(), format!("library/{image}")),
        };
        if repository.contains(':') {
            return Err(SourceError::InvalidReference(format!(
                "image name must not embed a tag: {image}"
            )));
        }
        Ok((host, repository))
    }

    async fn anonymous_token(&self, challenge: &str) -> Result<Option<String>, SourceError> {
        let Some(challenge) = BearerChallenge::parse(challenge) else {
            return Ok(None);
        };
        let mut query = vec![];
        if let Some(service) = &challenge.service {
            query.push(("service", service.clone()));
        }
        if let Some(scope) = &challenge.scope {
            query.push(("scope", scope.clone()));
        }
        let response = self
            .client
            .get(&challenge.realm)
            .query(&query)
            .send()
            .await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let token: TokenResponse = response.json().await?;
        Ok(Some(token.token))
    }
}

impl Default for RegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TagLister for RegistryClient {
    async fn list_tags(&self, image: &str) -> Result<Vec<String>, SourceError> {
        let (host, repository) = Self::split_image(image)?;
        let base = match &self.base_url {
            Some(base) => base.clone(),
            None => format!("https://{host}"),
        };
        let url = format!("{base}/v2/{repository}/tags/list");

        let mut response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            let challenge = response
                .headers()
                .get(reqwest::header::WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            if let Some(challenge) = challenge
                && let Some(token) = self.anonymous_token(&challenge).await?
            {
                debug!(image, "retrying tag listing with anonymous token");
                response = self
                    .client
                    .get(&url)
                    .bearer_auth(token)
                    .send()
                    .await?;
            }
        }

        match response.status() {
            reqwest::StatusCode::OK => {}
            reqwest::StatusCode::NOT_FOUND => {
                return Err(SourceError::NotFound(image.to_string()));
            }
            reqwest::StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                return Err(SourceError::RateLimited { retry_after_secs });
            }
            status => {
                return Err(SourceError::InvalidResponse(format!(
                    "registry returned {status} for {image}"
                )));
            }
        }

        let list: TagList = response.json().await?;
        Ok(list.tags.unwrap_or_default())
    }
}

struct BearerChallenge {
    realm: String,
    service: Option<String>,
    scope: Option<String>,
}

impl BearerChallenge {
    fn parse(header: &str) -> Option<Self> {
        let params = header.strip_prefix("Bearer ")?;
        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for param in params.split(',') {
            let (key, value) = param.trim().split_once('=')?;
            let value = value.trim_matches('"').to_string();
            match key {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }
        Some(Self {
            realm: realm?,
            service,
            scope,
        })
    }
}

/// Resolves the best tag for an image by listing its registry tags.
pub struct ImageResolver<S> {
    source: S,
}

impl<S: TagLister> ImageResolver<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

#[async_trait::async_trait]
impl<S: TagLister> Resolver<ImageRef> for ImageResolver<S> {
    async fn resolve(
        &self,
        reference: &ImageRef,
        opts: &ResolveOptions,
    ) -> Result<Option<String>, ResolveError> {
        let tags = self.source.list_tags(&reference.name).await?;
        Ok(select_latest(&reference.tag, &tags, opts)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("nginx", DEFAULT_REGISTRY, "library/nginx")]
    #[case("grafana/grafana", DEFAULT_REGISTRY, "grafana/grafana")]
    #[case("ghcr.io/owner/app", "ghcr.io", "owner/app")]
    #[case("localhost:5000/app", "localhost:5000", "app")]
    #[case("localhost/app", "localhost", "app")]
    fn split_image_derives_host_and_repository(
        #[case] image: &str,
        #[case] host: &str,
        #[case] repository: &str,
    ) {
        let (h, r) = RegistryClient::split_image(image).unwrap();
        assert_eq!(h, host);
        assert_eq!(r, repository);
    }

    #[test]
    fn split_image_rejects_embedded_tag() {
        let err = RegistryClient::split_image("grafana/grafana:v10").unwrap_err();
        assert!(matches!(err, SourceError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn list_tags_returns_registry_tags() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/library/nginx/tags/list")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name":"library/nginx","tags":["1.25","1.26","1.27"]}"#)
            .create_async()
            .await;

        let client = RegistryClient::with_base_url(server.url());
        let tags = client.list_tags("nginx").await.unwrap();

        assert_eq!(tags, vec!["1.25", "1.26", "1.27"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn list_tags_fetches_anonymous_token_on_challenge() {
        let mut server = mockito::Server::new_async().await;
        let realm = format!("{}/token", server.url());
        let challenge = server
            .mock("GET", "/v2/library/nginx/tags/list")
            .with_status(401)
            .with_header(
                "www-authenticate",
                &format!(r#"Bearer realm="{realm}",service="registry",scope="repository:library/nginx:pull""#),
            )
            .create_async()
            .await;
        let token = server
            .mock("GET", "/token")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("service".into(), "registry".into()),
                mockito::Matcher::UrlEncoded(
                    "scope".into(),
                    "repository:library/nginx:pull".into(),
                ),
            ]))
            .with_status(200)
            .with_body(r#"{"token":"anon-token"}"#)
            .create_async()
            .await;
        let authed = server
            .mock("GET", "/v2/library/nginx/tags/list")
            .match_header("authorization", "Bearer anon-token")
            .with_status(200)
            .with_body(r#"{"name":"library/nginx","tags":["1.27"]}"#)
            .create_async()
            .await;

        let client = RegistryClient::with_base_url(server.url());
        let tags = client.list_tags("nginx").await.unwrap();

        assert_eq!(tags, vec!["1.27"]);
        challenge.assert_async().await;
        token.assert_async().await;
        authed.assert_async().await;
    }

    #[tokio::test]
    async fn list_tags_maps_missing_image_to_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/library/ghost/tags/list")
            .with_status(404)
            .create_async()
            .await;

        let client = RegistryClient::with_base_url(server.url());
        let err = client.list_tags("ghost").await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_tags_surfaces_rate_limit_with_retry_after() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/library/nginx/tags/list")
            .with_status(429)
            .with_header("retry-after", "30")
            .create_async()
            .await;

        let client = RegistryClient::with_base_url(server.url());
        let err = client.list_tags("nginx").await.unwrap_err();
        assert!(matches!(
            err,
            SourceError::RateLimited {
                retry_after_secs: Some(30)
            }
        ));
    }

    #[tokio::test]
    async fn resolver_picks_newest_acceptable_tag() {
        let mut lister = MockTagLister::new();
        lister
            .expect_list_tags()
            .withf(|image| image == "grafana/grafana")
            .returning(|_| Ok(vec!["v9.0.0".to_string(), "v10.1.0".to_string()]));

        let resolver = ImageResolver::new(lister);
        let reference = ImageRef {
            name: "grafana/grafana".to_string(),
            tag: "v9.5.0".to_string(),
        };
        let best = resolver
            .resolve(&reference, &ResolveOptions::default())
            .await
            .unwrap();
        assert_eq!(best.as_deref(), Some("v10.1.0"));
    }

    #[tokio::test]
    async fn resolver_propagates_source_failure() {
        let mut lister = MockTagLister::new();
        lister
            .expect_list_tags()
            .returning(|_| Err(SourceError::NotFound("grafana/grafana".to_string())));

        let resolver = ImageResolver::new(lister);
        let reference = ImageRef {
            name: "grafana/grafana".to_string(),
            tag: "v9.5.0".to_string(),
        };
        let err = resolver
            .resolve(&reference, &ResolveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Source(SourceError::NotFound(_))));
    }
}
