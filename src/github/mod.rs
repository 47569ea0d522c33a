//! Remote query interface
//!
//! This module contains everything that talks to the hosting service:
//! - The [`PullRequestApi`] and [`RateLimitSource`] traits the crawl engine
//!   is written against
//! - [`GitHubClient`], the reqwest implementation (GraphQL + REST)
//! - Wire types and GraphQL documents
//! - Error classification for the retry policy

mod client;
mod error;
pub mod queries;
mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use client::{build_http_client, GitHubClient};
pub use error::{
    budget_from_headers, mentions_rate_limit, reset_from_headers, ApiError, ApiResult, ErrorKind,
};
pub use types::{
    Actor, Budget, Commit, CommitAuthor, CommitNode, Connection, IssueComment, Keyed, Label,
    LabelConnection, PageInfo, PullRequestNode, RateLimitSnapshot, Resource, ReviewComment,
    ReviewThread, ThreadComments,
};

use async_trait::async_trait;

/// Quota introspection
#[async_trait]
pub trait RateLimitSource: Send + Sync {
    /// Returns the remaining budget and reset time of every quota pool
    async fn rate_limit(&self) -> ApiResult<RateLimitSnapshot>;

    /// Takes the most recent budget of `resource` reported alongside a
    /// response, if one arrived since the last call
    ///
    /// For GraphQL this reflects the points each query actually cost.
    fn take_observed(&self, _resource: Resource) -> Option<Budget> {
        None
    }
}

/// Queries the crawl engine issues against one repository
///
/// Every method is a single remote call; pagination, retries and throttling
/// are layered on top by the crawler.
#[async_trait]
pub trait PullRequestApi: RateLimitSource {
    /// One page of the pull-request connection, newest first
    async fn pull_requests(
        &self,
        first: u32,
        cursor: Option<&str>,
    ) -> ApiResult<Connection<PullRequestNode>>;

    /// One page of a pull request's conversation comments
    async fn comments(&self, number: u64, cursor: Option<&str>)
        -> ApiResult<Connection<IssueComment>>;

    /// One page of a pull request's review threads
    async fn review_threads(
        &self,
        number: u64,
        cursor: Option<&str>,
    ) -> ApiResult<Connection<ReviewThread>>;

    /// One page of a pull request's commits
    async fn commits(&self, number: u64, cursor: Option<&str>) -> ApiResult<Connection<CommitNode>>;

    /// One page of the comments of one review thread
    async fn thread_comments(
        &self,
        thread_id: &str,
        cursor: Option<&str>,
    ) -> ApiResult<Connection<ReviewComment>>;

    /// Unified diff of one commit
    async fn commit_diff(&self, oid: &str) -> ApiResult<String>;
}
