//! Wire types for the GraphQL and REST APIs
//!
//! Node types (comments, review threads, commits) are stored verbatim inside
//! pull-request records, so they serialize back to the same camelCase shape
//! they were received in.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Cursor position of a connection page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// One page of a cursor-paginated connection as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T> {
    pub total_count: u64,
    #[serde(default)]
    pub page_info: PageInfo,
    #[serde(default = "Vec::new")]
    pub nodes: Vec<T>,
}

/// A node with a stable identity inside its connection
///
/// Keys are what lets nested pages be merged into a stored record without
/// duplicates when a fetch is resumed or repeated.
pub trait Keyed {
    fn key(&self) -> &str;
}

/// A user or bot account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub login: String,
}

/// A conversation comment on a pull request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueComment {
    pub id: String,
    pub author: Option<Actor>,
    #[serde(default)]
    pub body: String,
    pub created_at: String,
}

impl Keyed for IssueComment {
    fn key(&self) -> &str {
        &self.id
    }
}

/// An inline review comment inside a review thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewComment {
    pub id: String,
    pub author: Option<Actor>,
    #[serde(default)]
    pub body: String,
    pub path: Option<String>,
    pub diff_hunk: Option<String>,
    pub created_at: String,
}

impl Keyed for ReviewComment {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Comments of one review thread
///
/// Queries that embed threads return only the first page of their comments.
/// `page_info` tells where the remainder starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadComments {
    pub total_count: u64,
    #[serde(default)]
    pub page_info: PageInfo,
    #[serde(default = "Vec::new")]
    pub nodes: Vec<ReviewComment>,
}

/// A review thread anchored to a diff location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewThread {
    pub id: String,
    #[serde(default)]
    pub is_resolved: bool,
    pub path: Option<String>,
    pub comments: ThreadComments,
}

impl Keyed for ReviewThread {
    fn key(&self) -> &str {
        &self.id
    }
}

impl ReviewThread {
    /// Returns true if every comment of the thread has been fetched
    pub fn is_complete(&self) -> bool {
        self.comments.nodes.len() as u64 == self.comments.total_count
    }
}

/// Git identity of a commit author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub name: Option<String>,
    pub email: Option<String>,
    pub user: Option<Actor>,
}

/// A commit referenced by a pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub oid: String,
    #[serde(default)]
    pub message: String,
    pub committed_date: Option<String>,
    pub author: Option<CommitAuthor>,
}

/// Entry of a pull request's `commits` connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitNode {
    pub commit: Commit,
}

impl Keyed for CommitNode {
    fn key(&self) -> &str {
        &self.commit.oid
    }
}

/// A label attached to a pull request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Label {
    pub name: String,
}

/// Labels connection (never paginated; the first 100 are requested)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LabelConnection {
    #[serde(default = "Vec::new")]
    pub nodes: Vec<Label>,
}

/// A pull request as returned by the enumeration query
///
/// Nested connections hold only their first page.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestNode {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub created_at: String,
    pub closed_at: Option<String>,
    pub merged_at: Option<String>,
    pub state: String,
    pub author: Option<Actor>,
    #[serde(default)]
    pub head_ref_name: String,
    #[serde(default)]
    pub labels: LabelConnection,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub changed_files: u64,
    pub comments: Connection<IssueComment>,
    pub review_threads: Connection<ReviewThread>,
    pub commits: Connection<CommitNode>,
}

/// GraphQL response envelope
#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default = "Vec::new")]
    pub errors: Vec<GraphQlErrorEntry>,
}

/// One entry of a GraphQL `errors` array
#[derive(Debug, Deserialize)]
pub struct GraphQlErrorEntry {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// `data` of the enumeration query
#[derive(Debug, Deserialize)]
pub struct PullRequestsData {
    pub repository: Option<PullRequestsRepository>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestsRepository {
    pub pull_requests: Connection<PullRequestNode>,
}

/// `data` of a single-item nested query (the field is aliased to `connection`)
#[derive(Debug, Deserialize)]
pub struct NestedData<T> {
    pub repository: Option<NestedRepository<T>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedRepository<T> {
    pub pull_request: Option<NestedPullRequest<T>>,
}

#[derive(Debug, Deserialize)]
pub struct NestedPullRequest<T> {
    pub connection: Connection<T>,
}

/// `data` of the per-thread comments query
#[derive(Debug, Deserialize)]
pub struct ThreadNodeData<T> {
    pub node: Option<ThreadNode<T>>,
}

/// A node looked up by id; `connection` is absent when it is not a thread
#[derive(Debug, Deserialize)]
pub struct ThreadNode<T> {
    pub connection: Option<Connection<T>>,
}

/// API quota pools tracked separately by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// GraphQL queries (enumeration and nested fields)
    Graphql,
    /// REST calls (commit diffs)
    Core,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Graphql => write!(f, "graphql"),
            Self::Core => write!(f, "core"),
        }
    }
}

/// Remaining calls and reset time of one quota pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

/// Snapshot of every quota pool the crawler uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub core: Budget,
    pub graphql: Budget,
}

impl RateLimitSnapshot {
    /// Returns the budget of the given pool
    pub fn budget(&self, resource: Resource) -> Budget {
        match resource {
            Resource::Core => self.core,
            Resource::Graphql => self.graphql,
        }
    }
}

/// Body of `GET /rate_limit`
#[derive(Debug, Deserialize)]
pub struct RateLimitResponse {
    pub resources: RateLimitResources,
}

#[derive(Debug, Deserialize)]
pub struct RateLimitResources {
    pub core: RateLimitEntry,
    pub graphql: RateLimitEntry,
}

#[derive(Debug, Deserialize)]
pub struct RateLimitEntry {
    pub limit: u64,
    pub remaining: u64,
    /// Epoch seconds
    pub reset: i64,
}

impl From<RateLimitEntry> for Budget {
    fn from(entry: RateLimitEntry) -> Self {
        Self {
            limit: entry.limit,
            remaining: entry.remaining,
            reset_at: Utc
                .timestamp_opt(entry.reset, 0)
                .single()
                .unwrap_or_else(Utc::now),
        }
    }
}

impl From<RateLimitResponse> for RateLimitSnapshot {
    fn from(response: RateLimitResponse) -> Self {
        Self {
            core: response.resources.core.into(),
            graphql: response.resources.graphql.into(),
        }
    }
}
