//! In-memory [`PullRequestApi`] used by unit tests
//!
//! Serves pull requests newest first with offset cursors, truncates nested
//! connections to one page inside the enumeration query like the real host,
//! records every call, and can be told to fail specific calls.

use crate::github::queries::{ENUMERATION_THREAD_COMMENTS, NESTED_PAGE_SIZE};
use crate::github::{
    Actor, ApiError, ApiResult, Budget, Commit, CommitNode, Connection, IssueComment,
    LabelConnection, PageInfo, PullRequestApi, PullRequestNode, RateLimitSnapshot,
    RateLimitSource, Resource, ReviewComment, ReviewThread, ThreadComments,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Full data of one pull request on the fake host
#[derive(Debug, Clone)]
pub(crate) struct FakePr {
    pub number: u64,
    pub comments: Vec<IssueComment>,
    pub threads: Vec<ReviewThread>,
    pub commits: Vec<CommitNode>,
}

impl FakePr {
    pub fn new(number: u64) -> Self {
        Self {
            number,
            comments: Vec::new(),
            threads: Vec::new(),
            commits: Vec::new(),
        }
    }

    pub fn with_comments(mut self, count: usize) -> Self {
        self.comments = (0..count).map(|i| comment(self.number, i)).collect();
        self
    }

    pub fn with_threads(mut self, count: usize) -> Self {
        self.threads = (0..count).map(|i| thread(self.number, i, 0)).collect();
        self
    }

    /// Appends one review thread carrying `comments` inline comments
    pub fn with_long_thread(mut self, comments: usize) -> Self {
        let index = self.threads.len();
        self.threads.push(thread(self.number, index, comments));
        self
    }

    pub fn with_commits(mut self, oids: &[&str]) -> Self {
        self.commits = oids.iter().map(|oid| commit(oid)).collect();
        self
    }

    /// The node the enumeration query would return for this pull request
    pub fn node(&self) -> PullRequestNode {
        PullRequestNode {
            number: self.number,
            title: format!("PR {}", self.number),
            body: String::new(),
            created_at: format!("2024-01-{:02}T00:00:00Z", self.number % 28 + 1),
            closed_at: None,
            merged_at: None,
            state: "OPEN".to_string(),
            author: Some(Actor {
                login: "octocat".to_string(),
            }),
            head_ref_name: format!("branch-{}", self.number),
            labels: LabelConnection::default(),
            additions: 1,
            deletions: 1,
            changed_files: 1,
            comments: page(&self.comments, NESTED_PAGE_SIZE, None),
            review_threads: thread_page(&self.threads, ENUMERATION_THREAD_COMMENTS, None),
            commits: page(&self.commits, NESTED_PAGE_SIZE, None),
        }
    }
}

pub(crate) fn comment(number: u64, index: usize) -> IssueComment {
    IssueComment {
        id: format!("IC_{}_{}", number, index),
        author: None,
        body: format!("comment {}", index),
        created_at: "2024-01-01T00:00:00Z".to_string(),
    }
}

/// A review thread with all of its comments
pub(crate) fn thread(number: u64, index: usize, comments: usize) -> ReviewThread {
    let id = format!("RT_{}_{}", number, index);
    let nodes: Vec<ReviewComment> = (0..comments)
        .map(|i| ReviewComment {
            id: format!("{}_C{}", id, i),
            author: None,
            body: format!("review comment {}", i),
            path: Some("src/lib.rs".to_string()),
            diff_hunk: Some("@@ -1 +1 @@".to_string()),
            created_at: "2024-01-01T00:00:00Z".to_string(),
        })
        .collect();

    ReviewThread {
        id,
        is_resolved: false,
        path: Some("src/lib.rs".to_string()),
        comments: ThreadComments {
            total_count: nodes.len() as u64,
            page_info: PageInfo::default(),
            nodes,
        },
    }
}

/// One page of threads, each cut to its first `comments` comments
fn thread_page(
    threads: &[ReviewThread],
    comments: u32,
    cursor: Option<&str>,
) -> Connection<ReviewThread> {
    let mut connection = page(threads, NESTED_PAGE_SIZE, cursor);
    for thread in &mut connection.nodes {
        let first = page(&thread.comments.nodes, comments, None);
        thread.comments = ThreadComments {
            total_count: first.total_count,
            page_info: first.page_info,
            nodes: first.nodes,
        };
    }
    connection
}

pub(crate) fn commit(oid: &str) -> CommitNode {
    CommitNode {
        commit: Commit {
            oid: oid.to_string(),
            message: format!("commit {}", oid),
            committed_date: Some("2024-01-01T00:00:00Z".to_string()),
            author: None,
        },
    }
}

/// Slices one page out of `items` using `offset:N` cursors
pub(crate) fn page<T: Clone>(items: &[T], first: u32, cursor: Option<&str>) -> Connection<T> {
    let start = cursor
        .and_then(|c| c.strip_prefix("offset:"))
        .and_then(|n| n.parse::<usize>().ok())
        .unwrap_or(0)
        .min(items.len());
    let end = (start + first as usize).min(items.len());

    Connection {
        total_count: items.len() as u64,
        page_info: PageInfo {
            has_next_page: end < items.len(),
            end_cursor: if end > start {
                Some(format!("offset:{}", end))
            } else {
                cursor.map(str::to_string)
            },
        },
        nodes: items[start..end].to_vec(),
    }
}

pub(crate) struct FakeApi {
    prs: Vec<FakePr>,
    diffs: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, VecDeque<ApiError>>>,
    budgets: Mutex<VecDeque<RateLimitSnapshot>>,
    observed: Mutex<HashMap<Resource, Budget>>,
    diff_delay: Duration,
    diffs_in_flight: AtomicUsize,
    peak_diffs_in_flight: AtomicUsize,
}

impl FakeApi {
    /// `prs` must be ordered newest first
    pub fn new(prs: Vec<FakePr>) -> Self {
        let diffs = prs
            .iter()
            .flat_map(|pr| pr.commits.iter())
            .map(|c| (c.commit.oid.clone(), format!("diff --git a/{0} b/{0}\n", c.commit.oid)))
            .collect();

        Self {
            prs,
            diffs,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            budgets: Mutex::new(VecDeque::new()),
            observed: Mutex::new(HashMap::new()),
            diff_delay: Duration::ZERO,
            diffs_in_flight: AtomicUsize::new(0),
            peak_diffs_in_flight: AtomicUsize::new(0),
        }
    }

    /// Makes every diff download take `delay` before answering
    pub fn with_diff_delay(mut self, delay: Duration) -> Self {
        self.diff_delay = delay;
        self
    }

    /// Highest number of diff downloads that were running at once
    pub fn peak_diffs_in_flight(&self) -> usize {
        self.peak_diffs_in_flight.load(Ordering::SeqCst)
    }

    /// Reports `budget` as if a response had carried it in its quota headers
    pub fn observe(&self, resource: Resource, budget: Budget) {
        self.observed.lock().unwrap().insert(resource, budget);
    }

    /// Makes the next calls with this key fail with the given errors, in order
    pub fn fail(&self, key: &str, errors: Vec<ApiError>) {
        self.failures
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .extend(errors);
    }

    /// Queues quota snapshots returned by successive `rate_limit` calls
    ///
    /// The last one is repeated once the queue runs dry.
    pub fn queue_budgets(&self, snapshots: Vec<RateLimitSnapshot>) {
        self.budgets.lock().unwrap().extend(snapshots);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, key: &str) -> ApiResult<()> {
        self.calls.lock().unwrap().push(key.to_string());
        let next_failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(|queue| queue.pop_front());
        match next_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn pr(&self, number: u64) -> ApiResult<&FakePr> {
        self.prs
            .iter()
            .find(|pr| pr.number == number)
            .ok_or_else(|| ApiError::Status {
                endpoint: "/graphql".to_string(),
                status: 404,
                message: format!("pull request #{} not found", number),
            })
    }
}

pub(crate) fn generous_budget() -> RateLimitSnapshot {
    let budget = Budget {
        limit: 5000,
        remaining: 5000,
        reset_at: Utc::now() + chrono::Duration::hours(1),
    };
    RateLimitSnapshot {
        core: budget,
        graphql: budget,
    }
}

#[async_trait]
impl RateLimitSource for FakeApi {
    async fn rate_limit(&self) -> ApiResult<RateLimitSnapshot> {
        self.calls.lock().unwrap().push("rate_limit".to_string());
        let mut budgets = self.budgets.lock().unwrap();
        let snapshot = if budgets.len() > 1 {
            budgets.pop_front()
        } else {
            budgets.front().copied()
        };
        Ok(snapshot.unwrap_or_else(generous_budget))
    }

    fn take_observed(&self, resource: Resource) -> Option<Budget> {
        self.observed.lock().unwrap().remove(&resource)
    }
}

#[async_trait]
impl PullRequestApi for FakeApi {
    async fn pull_requests(
        &self,
        first: u32,
        cursor: Option<&str>,
    ) -> ApiResult<Connection<PullRequestNode>> {
        self.record(&format!("pull_requests:{}", cursor.unwrap_or("start")))?;
        let nodes: Vec<PullRequestNode> = self.prs.iter().map(FakePr::node).collect();
        Ok(page(&nodes, first, cursor))
    }

    async fn comments(
        &self,
        number: u64,
        cursor: Option<&str>,
    ) -> ApiResult<Connection<IssueComment>> {
        self.record(&format!("comments:{}", number))?;
        Ok(page(&self.pr(number)?.comments, NESTED_PAGE_SIZE, cursor))
    }

    async fn review_threads(
        &self,
        number: u64,
        cursor: Option<&str>,
    ) -> ApiResult<Connection<ReviewThread>> {
        self.record(&format!("review_threads:{}", number))?;
        Ok(thread_page(&self.pr(number)?.threads, NESTED_PAGE_SIZE, cursor))
    }

    async fn thread_comments(
        &self,
        thread_id: &str,
        cursor: Option<&str>,
    ) -> ApiResult<Connection<ReviewComment>> {
        self.record(&format!("thread_comments:{}", thread_id))?;
        let thread = self
            .prs
            .iter()
            .flat_map(|pr| pr.threads.iter())
            .find(|t| t.id == thread_id)
            .ok_or_else(|| ApiError::Status {
                endpoint: "/graphql".to_string(),
                status: 404,
                message: format!("review thread {} not found", thread_id),
            })?;
        Ok(page(&thread.comments.nodes, NESTED_PAGE_SIZE, cursor))
    }

    async fn commits(&self, number: u64, cursor: Option<&str>) -> ApiResult<Connection<CommitNode>> {
        self.record(&format!("commits:{}", number))?;
        Ok(page(&self.pr(number)?.commits, NESTED_PAGE_SIZE, cursor))
    }

    async fn commit_diff(&self, oid: &str) -> ApiResult<String> {
        self.record(&format!("diff:{}", oid))?;

        let running = self.diffs_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_diffs_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.diff_delay.is_zero() {
            tokio::time::sleep(self.diff_delay).await;
        }
        self.diffs_in_flight.fetch_sub(1, Ordering::SeqCst);

        self.diffs.get(oid).cloned().ok_or_else(|| ApiError::Status {
            endpoint: format!("/repos/o/n/commits/{}", oid),
            status: 404,
            message: "No commit found".to_string(),
        })
    }
}
