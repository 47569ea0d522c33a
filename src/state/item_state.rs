//! Lifecycle state of a single pull request
//!
//! `Unseen → PartiallyFetched → Complete`, never backwards while its record exists.

use crate::state::CrawlState;
use crate::storage::PullRequestRecord;
use std::fmt;

/// Represents how much of a pull request has been fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemState {
    /// Not yet returned by enumeration
    Unseen,

    /// Recorded, but at least one nested connection is truncated
    PartiallyFetched,

    /// Every nested connection holds `totalCount` nodes
    Complete,
}

impl ItemState {
    /// Classifies a stored record by comparing node counts to `totalCount`
    pub fn of_record(record: &PullRequestRecord) -> Self {
        if record.is_complete() {
            Self::Complete
        } else {
            Self::PartiallyFetched
        }
    }

    /// Looks up the state of a pull request in the checkpoint
    pub fn of_id(state: &CrawlState, id: u64) -> Self {
        if state.completed_ids.contains(&id) {
            Self::Complete
        } else if state.pending_ids.contains(&id) {
            Self::PartiallyFetched
        } else {
            Self::Unseen
        }
    }

    /// Returns true if no further fetching is needed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Returns true if `next` is reachable from this state
    pub fn can_transition_to(&self, next: ItemState) -> bool {
        next >= *self
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unseen => "unseen",
            Self::PartiallyFetched => "partially_fetched",
            Self::Complete => "complete",
        };
        write!(f, "{}", name)
    }
}
