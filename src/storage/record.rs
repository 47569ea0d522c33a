//! Persisted pull-request record

use crate::github::{
    Actor, CommitNode, Connection, IssueComment, Keyed, PageInfo, PullRequestNode,
    ReviewComment, ReviewThread, ThreadComments,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// Nested connections of a pull request that may need extra pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NestedField {
    Comments,
    ReviewThreads,
    Commits,
}

impl NestedField {
    /// All nested fields, in fetch order
    pub const ALL: [NestedField; 3] = [Self::Comments, Self::ReviewThreads, Self::Commits];
}

impl fmt::Display for NestedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Comments => "comments",
            Self::ReviewThreads => "reviewThreads",
            Self::Commits => "commits",
        };
        write!(f, "{}", name)
    }
}

/// A nested connection as stored in a record
///
/// Complete iff `nodes.len() == total_count`. While incomplete, `end_cursor`
/// remembers where the last fetched page ended so the next fetch resumes
/// there instead of starting over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedConnection<T> {
    pub total_count: u64,
    pub nodes: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_cursor: Option<String>,
}

impl<T: Keyed> NestedConnection<T> {
    /// Returns true if every node the host reported has been fetched
    pub fn is_complete(&self) -> bool {
        self.nodes.len() as u64 == self.total_count
    }

    /// Appends nodes whose keys are not stored yet
    ///
    /// Returns how many nodes were added.
    pub fn merge(&mut self, nodes: Vec<T>) -> usize {
        let mut seen: HashSet<String> = self.nodes.iter().map(|n| n.key().to_string()).collect();
        let before = self.nodes.len();
        for node in nodes {
            if seen.insert(node.key().to_string()) {
                self.nodes.push(node);
            }
        }
        self.nodes.len() - before
    }

    /// Drops fetched nodes and the resume cursor, forcing a fetch from the start
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.end_cursor = None;
    }

    /// Forgets the resume cursor once nothing is left to fetch
    pub fn settle(&mut self) {
        if self.is_complete() {
            self.end_cursor = None;
        }
    }
}

impl<T: Keyed> From<Connection<T>> for NestedConnection<T> {
    fn from(connection: Connection<T>) -> Self {
        let mut nested = Self {
            total_count: connection.total_count,
            end_cursor: connection.page_info.end_cursor,
            nodes: Vec::new(),
        };
        nested.merge(connection.nodes);
        nested.settle();
        nested
    }
}

impl From<ThreadComments> for NestedConnection<ReviewComment> {
    fn from(comments: ThreadComments) -> Self {
        let end_cursor = if comments.page_info.has_next_page {
            comments.page_info.end_cursor
        } else {
            None
        };
        Self {
            total_count: comments.total_count,
            nodes: comments.nodes,
            end_cursor,
        }
    }
}

impl From<NestedConnection<ReviewComment>> for ThreadComments {
    fn from(nested: NestedConnection<ReviewComment>) -> Self {
        Self {
            total_count: nested.total_count,
            page_info: PageInfo {
                has_next_page: !nested.is_complete(),
                end_cursor: nested.end_cursor,
            },
            nodes: nested.nodes,
        }
    }
}

/// One durable file per pull request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestRecord {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub created_at: String,
    pub closed_at: Option<String>,
    pub merged_at: Option<String>,
    pub state: String,
    pub author: Option<Actor>,
    #[serde(default)]
    pub head_ref_name: String,
    pub labels: BTreeSet<String>,
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
    pub comments: NestedConnection<IssueComment>,
    pub review_threads: NestedConnection<ReviewThread>,
    pub commits: NestedConnection<CommitNode>,
}

impl PullRequestRecord {
    /// Returns true if every nested connection is complete
    pub fn is_complete(&self) -> bool {
        self.incomplete_fields().is_empty()
    }

    /// Nested fields still short of their `totalCount`
    pub fn incomplete_fields(&self) -> Vec<NestedField> {
        NestedField::ALL
            .into_iter()
            .filter(|field| !self.is_field_complete(*field))
            .collect()
    }

    pub fn is_field_complete(&self, field: NestedField) -> bool {
        match field {
            NestedField::Comments => self.comments.is_complete(),
            NestedField::ReviewThreads => {
                self.review_threads.is_complete()
                    && self.review_threads.nodes.iter().all(ReviewThread::is_complete)
            }
            NestedField::Commits => self.commits.is_complete(),
        }
    }

    /// Commit identifiers referenced by this pull request
    pub fn commit_oids(&self) -> impl Iterator<Item = &str> + '_ {
        self.commits.nodes.iter().map(|node| node.commit.oid.as_str())
    }
}

impl From<PullRequestNode> for PullRequestRecord {
    fn from(node: PullRequestNode) -> Self {
        Self {
            number: node.number,
            title: node.title,
            body: node.body,
            created_at: node.created_at,
            closed_at: node.closed_at,
            merged_at: node.merged_at,
            state: node.state,
            author: node.author,
            head_ref_name: node.head_ref_name,
            labels: node.labels.nodes.into_iter().map(|l| l.name).collect(),
            additions: node.additions,
            deletions: node.deletions,
            changed_files: node.changed_files,
            comments: node.comments.into(),
            review_threads: node.review_threads.into(),
            commits: node.commits.into(),
        }
    }
}
