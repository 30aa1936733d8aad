use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client as ReqwestClient, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::domain::errors::{ProviderError, ProviderResult};
use crate::domain::models::config::GitHubConfig;
use crate::domain::models::{IssuePayload, RepositoryPayload, SearchPage, SearchQuery};
use crate::domain::ports::IssueProvider;

/// Results per search page (the provider maximum).
pub const PER_PAGE: u32 = 100;

/// The search endpoint never serves more than this many results per query.
const SEARCH_RESULT_CAP: u64 = 1000;

const USER_AGENT: &str = concat!("issue-mirror/", env!("CARGO_PKG_VERSION"));
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const TEXT_MATCH_MEDIA_TYPE: &str = "application/vnd.github.v3.text-match+json";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    incomplete_results: bool,
    #[serde(default)]
    items: Vec<IssuePayload>,
}

/// REST client for the GitHub API
///
/// Performs no retries and no rate limiting of its own; a failed request is
/// surfaced as a [`ProviderError`].
pub struct GitHubClient {
    http_client: ReqwestClient,
    base_url: String,
    token: Option<String>,
}

impl GitHubClient {
    /// Create a client from the `github` configuration section
    ///
    /// # Returns
    /// * `Ok(GitHubClient)` - Successfully created client
    /// * `Err(anyhow::Error)` - Failed to build HTTP client
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(4)
            .build()
            .context("Failed to build HTTP client")?;

        let token = Some(config.token.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        Ok(Self {
            http_client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, path: &str, accept: &str) -> reqwest::RequestBuilder {
        let request = self
            .http_client
            .get(format!("{}{path}", self.base_url))
            .header(header::ACCEPT, accept)
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Map a non-success response to a [`ProviderError`]
    async fn error_for(response: Response, resource: &str) -> ProviderError {
        let status = response.status();
        let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
            || (status == StatusCode::FORBIDDEN
                && response
                    .headers()
                    .get("x-ratelimit-remaining")
                    .is_some_and(|v| v.as_bytes() == b"0"));

        if rate_limited {
            return ProviderError::RateLimited;
        }
        if status == StatusCode::NOT_FOUND {
            return ProviderError::NotFound(resource.to_string());
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());
        ProviderError::Http {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl IssueProvider for GitHubClient {
    #[instrument(skip(self))]
    async fn fetch_repository(&self, fullname: &str) -> ProviderResult<RepositoryPayload> {
        let response = self
            .get(&format!("/repos/{fullname}"), JSON_MEDIA_TYPE)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response, fullname).await);
        }

        let repository: RepositoryPayload = response.json().await?;
        debug!(id = repository.id, fork = repository.fork, "fetched repository");
        Ok(repository)
    }

    #[instrument(skip(self, query), fields(query = %query))]
    async fn search(&self, query: &SearchQuery, page: u32) -> ProviderResult<SearchPage> {
        let accept = if query.wants_text_matches() {
            TEXT_MATCH_MEDIA_TYPE
        } else {
            JSON_MEDIA_TYPE
        };

        let response = self
            .get("/search/issues", accept)
            .query(&[
                ("q", query.to_string()),
                ("sort", "updated".to_string()),
                ("order", "desc".to_string()),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response, "search/issues").await);
        }

        let body: SearchResponse = response.json().await?;
        if body.incomplete_results {
            warn!("provider returned incomplete search results");
        }

        let served = u64::from(page) * u64::from(PER_PAGE);
        let has_more = served < body.total_count.min(SEARCH_RESULT_CAP);
        debug!(
            total = body.total_count,
            items = body.items.len(),
            has_more,
            "search page fetched"
        );

        Ok(SearchPage {
            items: body.items,
            has_more,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Predicate;
    use mockito::Matcher;
    use serde_json::json;

    fn client(server: &mockito::ServerGuard, token: &str) -> GitHubClient {
        GitHubClient::new(&GitHubConfig {
            token: token.to_string(),
            api_url: server.url(),
            ..GitHubConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_repository_with_source() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/bob/widgets")
            .match_header("authorization", "Bearer s3cret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": 7,
                    "name": "widgets",
                    "full_name": "bob/widgets",
                    "html_url": "https://github.com/bob/widgets",
                    "owner": {"login": "bob"},
                    "fork": true,
                    "source": {"id": 42, "name": "widgets", "full_name": "acme/widgets"}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let repo = client(&server, "s3cret")
            .fetch_repository("bob/widgets")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(repo.id, 7);
        assert!(repo.fork);
        assert_eq!(repo.source.unwrap().full_name, "acme/widgets");
    }

    #[tokio::test]
    async fn test_fetch_repository_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/acme/missing")
            .with_status(404)
            .with_body(r#"{"message":"Not Found"}"#)
            .create_async()
            .await;

        let err = client(&server, "")
            .fetch_repository("acme/missing")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(name) if name == "acme/missing"));
    }

    #[tokio::test]
    async fn test_search_sends_query_and_computes_has_more() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/search/issues")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "repo:acme/widgets involves:alice".into()),
                Matcher::UrlEncoded("page".into(), "1".into()),
                Matcher::UrlEncoded("per_page".into(), "100".into()),
                Matcher::UrlEncoded("sort".into(), "updated".into()),
            ]))
            .match_header("accept", TEXT_MATCH_MEDIA_TYPE)
            .with_status(200)
            .with_body(
                json!({
                    "total_count": 150,
                    "incomplete_results": false,
                    "items": [{
                        "id": 1,
                        "number": 3,
                        "state": "closed",
                        "text_matches": [{"object_type": "IssueComment", "fragment": "/promoted 42"}]
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let query = SearchQuery::new()
            .with(Predicate::Repo("acme/widgets".to_string()))
            .with(Predicate::Involves("alice".to_string()))
            .with_text_matches();
        let page = client(&server, "").search(&query, 1).await.unwrap();

        mock.assert_async().await;
        assert!(page.has_more);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].text_matches.len(), 1);
    }

    #[tokio::test]
    async fn test_search_last_page() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/search/issues")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_body(json!({"total_count": 150, "items": []}).to_string())
            .create_async()
            .await;

        let page = client(&server, "")
            .search(&SearchQuery::new(), 2)
            .await
            .unwrap();
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_search_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/search/issues")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_header("x-ratelimit-remaining", "0")
            .with_body(r#"{"message":"API rate limit exceeded"}"#)
            .create_async()
            .await;

        let err = client(&server, "")
            .search(&SearchQuery::new(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited));
    }

    #[tokio::test]
    async fn test_search_server_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/search/issues")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let err = client(&server, "")
            .search(&SearchQuery::new(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Http { status: 500, .. }));
    }
}
