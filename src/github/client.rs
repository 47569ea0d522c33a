//! HTTP implementation of the remote query interface
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client with the configured user agent and timeouts
//! - GraphQL queries for pull requests and their nested connections
//! - REST requests for raw commit diffs and quota introspection
//! - Turning non-success responses into classified [`ApiError`]s
//! - Remembering the quota headers of each response for the throttle guard

use crate::config::{GitHubConfig, RepositoryConfig};
use crate::github::error::{budget_from_headers, ApiError, ApiResult};
use crate::github::queries;
use crate::github::types::{
    Budget, CommitNode, Connection, GraphQlResponse, IssueComment, NestedData, PullRequestNode,
    PullRequestsData, RateLimitResponse, RateLimitSnapshot, Resource, ReviewComment,
    ReviewThread, ThreadNodeData,
};
use crate::github::{PullRequestApi, RateLimitSource};
use crate::{ConfigError, HarvestError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

const GRAPHQL_PATH: &str = "/graphql";
const RATE_LIMIT_PATH: &str = "/rate_limit";
const DIFF_MEDIA_TYPE: &str = "application/vnd.github.v3.diff";

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use pr_harvest::config::GitHubConfig;
/// use pr_harvest::github::build_http_client;
///
/// let client = build_http_client(&GitHubConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &GitHubConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// GraphQL document texts, rendered once per client
struct Documents {
    pull_requests: String,
    comments: String,
    review_threads: String,
    commits: String,
    thread_comments: String,
}

/// Client for one repository on a GitHub-compatible host
pub struct GitHubClient {
    http: Client,
    base_url: String,
    owner: String,
    name: String,
    token: String,
    documents: Documents,
    observed: Mutex<HashMap<Resource, Budget>>,
}

impl GitHubClient {
    /// Creates a client for the given repository
    ///
    /// # Arguments
    ///
    /// * `config` - Remote API settings (base URL, user agent, timeout)
    /// * `repository` - The repository every query targets
    /// * `token` - Bearer token
    pub fn new(
        config: &GitHubConfig,
        repository: &RepositoryConfig,
        token: impl Into<String>,
    ) -> Result<Self, HarvestError> {
        Url::parse(&config.api_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid api-url: {}", e)))?;

        Ok(Self {
            http: build_http_client(config)?,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            owner: repository.owner.clone(),
            name: repository.name.clone(),
            token: token.into(),
            documents: Documents {
                pull_requests: queries::pull_requests_query(),
                comments: queries::comments_query(),
                review_threads: queries::review_threads_query(),
                commits: queries::commits_query(),
                thread_comments: queries::thread_comments_query(),
            },
            observed: Mutex::new(HashMap::new()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends a request and returns the body of a successful response
    async fn send(&self, path: &str, request: RequestBuilder) -> ApiResult<String> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiError::from_transport(path, &e))?;

        let status = response.status();
        let headers = response.headers().clone();
        if path != RATE_LIMIT_PATH {
            self.observe(path, &headers);
        }
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::from_transport(path, &e))?;

        if !status.is_success() {
            return Err(ApiError::from_status(path, status, &headers, &body));
        }

        Ok(body)
    }

    /// Runs a GraphQL query and decodes its `data`
    ///
    /// A non-empty `errors` array fails the call even when partial data came
    /// back, since a partial page would break completeness accounting.
    async fn graphql<T: DeserializeOwned>(&self, document: &str, variables: Value) -> ApiResult<T> {
        let request = self
            .http
            .post(self.url(GRAPHQL_PATH))
            .json(&json!({ "query": document, "variables": variables }));
        let body = self.send(GRAPHQL_PATH, request).await?;

        let envelope: GraphQlResponse<Value> =
            serde_json::from_str(&body).map_err(|e| ApiError::Decode {
                endpoint: GRAPHQL_PATH.to_string(),
                message: e.to_string(),
            })?;

        if !envelope.errors.is_empty() {
            return Err(ApiError::GraphQl {
                endpoint: GRAPHQL_PATH.to_string(),
                types: envelope
                    .errors
                    .iter()
                    .filter_map(|e| e.kind.clone())
                    .collect(),
                messages: envelope.errors.into_iter().map(|e| e.message).collect(),
            });
        }

        let data = envelope.data.ok_or_else(|| ApiError::Decode {
            endpoint: GRAPHQL_PATH.to_string(),
            message: "response has neither data nor errors".to_string(),
        })?;

        serde_json::from_value(data).map_err(|e| ApiError::Decode {
            endpoint: GRAPHQL_PATH.to_string(),
            message: e.to_string(),
        })
    }

    /// Fetches one page of a nested connection of one pull request
    async fn nested<T: DeserializeOwned>(
        &self,
        document: &str,
        number: u64,
        cursor: Option<&str>,
    ) -> ApiResult<Connection<T>> {
        let variables = json!({
            "owner": self.owner,
            "name": self.name,
            "number": number,
            "cursor": cursor,
        });

        let data: NestedData<T> = self.graphql(document, variables).await?;

        data.repository
            .and_then(|repo| repo.pull_request)
            .map(|pr| pr.connection)
            .ok_or_else(|| self.not_found(&format!("pull request #{}", number)))
    }

    /// Keeps the quota state a response reported for its pool
    fn observe(&self, path: &str, headers: &HeaderMap) {
        let Some((resource, budget)) = budget_from_headers(headers) else {
            return;
        };
        let resource = resource.unwrap_or(if path == GRAPHQL_PATH {
            Resource::Graphql
        } else {
            Resource::Core
        });
        if let Ok(mut observed) = self.observed.lock() {
            observed.insert(resource, budget);
        }
    }

    fn not_found(&self, what: &str) -> ApiError {
        ApiError::Status {
            endpoint: GRAPHQL_PATH.to_string(),
            status: 404,
            message: format!("{} not found in {}/{}", what, self.owner, self.name),
        }
    }
}

#[async_trait]
impl RateLimitSource for GitHubClient {
    async fn rate_limit(&self) -> ApiResult<RateLimitSnapshot> {
        let request = self.http.get(self.url(RATE_LIMIT_PATH));
        let body = self.send(RATE_LIMIT_PATH, request).await?;

        let response: RateLimitResponse =
            serde_json::from_str(&body).map_err(|e| ApiError::Decode {
                endpoint: RATE_LIMIT_PATH.to_string(),
                message: e.to_string(),
            })?;

        Ok(response.into())
    }

    fn take_observed(&self, resource: Resource) -> Option<Budget> {
        self.observed.lock().ok()?.remove(&resource)
    }
}

#[async_trait]
impl PullRequestApi for GitHubClient {
    async fn pull_requests(
        &self,
        first: u32,
        cursor: Option<&str>,
    ) -> ApiResult<Connection<PullRequestNode>> {
        let variables = json!({
            "owner": self.owner,
            "name": self.name,
            "first": first,
            "cursor": cursor,
        });

        let data: PullRequestsData = self
            .graphql(&self.documents.pull_requests, variables)
            .await?;

        data.repository
            .map(|repo| repo.pull_requests)
            .ok_or_else(|| self.not_found("repository"))
    }

    async fn comments(
        &self,
        number: u64,
        cursor: Option<&str>,
    ) -> ApiResult<Connection<IssueComment>> {
        self.nested(&self.documents.comments, number, cursor).await
    }

    async fn review_threads(
        &self,
        number: u64,
        cursor: Option<&str>,
    ) -> ApiResult<Connection<ReviewThread>> {
        self.nested(&self.documents.review_threads, number, cursor)
            .await
    }

    async fn commits(&self, number: u64, cursor: Option<&str>) -> ApiResult<Connection<CommitNode>> {
        self.nested(&self.documents.commits, number, cursor).await
    }

    async fn thread_comments(
        &self,
        thread_id: &str,
        cursor: Option<&str>,
    ) -> ApiResult<Connection<ReviewComment>> {
        let variables = json!({ "id": thread_id, "cursor": cursor });
        let data: ThreadNodeData<ReviewComment> = self
            .graphql(&self.documents.thread_comments, variables)
            .await?;

        data.node
            .and_then(|node| node.connection)
            .ok_or_else(|| self.not_found(&format!("review thread {}", thread_id)))
    }

    async fn commit_diff(&self, oid: &str) -> ApiResult<String> {
        let path = format!("/repos/{}/{}/commits/{}", self.owner, self.name, oid);
        let request = self
            .http
            .get(self.url(&path))
            .header(ACCEPT, DIFF_MEDIA_TYPE);
        self.send(&path, request).await
    }
}
