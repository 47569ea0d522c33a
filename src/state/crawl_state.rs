use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A per-item failure recorded for a later run to retry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Pull-request number the failure belongs to
    pub id: u64,

    /// Human-readable failure description
    pub message: String,

    /// When the failure was recorded
    #[serde(default = "Utc::now")]
    pub at: DateTime<Utc>,
}

/// Progress of a crawl, persisted as the checkpoint
///
/// Owned by the crawl driver and mutated only through the methods below, which
/// keep the invariants:
/// - an id is in at most one of `completed_ids` / `pending_ids`
/// - `processed_items` never decreases
/// - `cursor` is `None` exactly when enumeration has not started or is finished
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlState {
    /// `owner/name` of the repository this checkpoint belongs to
    pub repository: String,

    /// Resume point of the pull-request enumeration
    pub cursor: Option<String>,

    /// Whether enumeration has walked the whole connection
    #[serde(default)]
    pub enumeration_complete: bool,

    /// Total pull requests reported by the host
    pub total_items: u64,

    /// Pull requests recorded so far
    pub processed_items: u64,

    /// Pull requests whose nested connections are all complete
    pub completed_ids: BTreeSet<u64>,

    /// Pull requests with at least one truncated nested connection
    pub pending_ids: BTreeSet<u64>,

    /// Failures, oldest first
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,

    /// Last time the state was persisted
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CrawlState {
    /// Creates an empty state for the given repository
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            ..Self::default()
        }
    }

    /// Returns true if the pull request has been recorded in any state
    pub fn is_known(&self, id: u64) -> bool {
        self.completed_ids.contains(&id) || self.pending_ids.contains(&id)
    }

    /// Returns true if the pull request is fully fetched
    pub fn is_complete(&self, id: u64) -> bool {
        self.completed_ids.contains(&id)
    }

    /// Records a partially fetched pull request
    ///
    /// Returns true if the id was not known before. A completed id is never
    /// demoted back to pending.
    pub fn mark_pending(&mut self, id: u64) -> bool {
        if self.completed_ids.contains(&id) {
            return false;
        }
        let newly_seen = self.pending_ids.insert(id);
        if newly_seen {
            self.processed_items += 1;
        }
        newly_seen
    }

    /// Records a fully fetched pull request and drops its past failures
    ///
    /// Returns true if the id was not known before.
    pub fn mark_complete(&mut self, id: u64) -> bool {
        self.errors.retain(|e| e.id != id);
        let was_pending = self.pending_ids.remove(&id);
        let newly_complete = self.completed_ids.insert(id);
        let newly_seen = newly_complete && !was_pending;
        if newly_seen {
            self.processed_items += 1;
        }
        newly_seen
    }

    /// Moves a completed id back to pending
    ///
    /// Only used when the record on disk was lost and had to be rebuilt from a
    /// truncated enumeration node. Does not count the id again.
    pub fn reopen(&mut self, id: u64) -> bool {
        if self.completed_ids.remove(&id) {
            self.pending_ids.insert(id);
            true
        } else {
            false
        }
    }

    /// Records the latest failure for the given pull request
    ///
    /// Only one entry is kept per id.
    pub fn record_error(&mut self, id: u64, message: impl Into<String>) {
        self.errors.retain(|e| e.id != id);
        self.errors.push(ErrorEntry {
            id,
            message: message.into(),
            at: Utc::now(),
        });
    }

    /// Stamps the state with the current time before it is persisted
    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }

    /// Moves the enumeration cursor past a fully processed page
    pub fn advance_cursor(&mut self, cursor: String) {
        self.cursor = Some(cursor);
    }

    /// Marks enumeration as finished and clears the cursor
    pub fn finish_enumeration(&mut self) {
        self.cursor = None;
        self.enumeration_complete = true;
    }

    /// Number of pull requests still waiting for nested data
    pub fn pending_count(&self) -> usize {
        self.pending_ids.len()
    }

    /// Number of pull requests fully fetched
    pub fn completed_count(&self) -> usize {
        self.completed_ids.len()
    }
}
