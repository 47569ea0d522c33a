//! Completion of truncated nested connections
//!
//! The enumeration query returns only the first page of each nested
//! connection. A pull request with more comments, review threads or commits
//! than fit in that page is recorded as partially fetched and completed here,
//! one single-item query per missing page.

use crate::crawler::paginator::{Page, PaginationError, Paginator};
use crate::crawler::retry::{RetryError, RetryPolicy};
use crate::github::{Keyed, PullRequestApi, Resource, ReviewComment, ReviewThread};
use crate::state::ItemState;
use crate::storage::{NestedConnection, NestedField, PullRequestRecord};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ItemError {
    #[error("fetching {field} of #{number} failed: {source}")]
    Fetch {
        number: u64,
        field: NestedField,
        #[source]
        source: PaginationError,
    },

    #[error("{field} of #{number} still incomplete: {fetched} of {expected} nodes")]
    Incomplete {
        number: u64,
        field: NestedField,
        fetched: usize,
        expected: u64,
    },
}

impl ItemError {
    /// Returns true if the credential was rejected
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Fetch { source, .. } => source.is_auth(),
            Self::Incomplete { .. } => false,
        }
    }
}

/// Fetches the missing pages of partially fetched pull requests
pub struct ItemFetcher<A> {
    api: Arc<A>,
    retry: Arc<RetryPolicy>,
}

impl<A: PullRequestApi> ItemFetcher<A> {
    pub fn new(api: Arc<A>, retry: Arc<RetryPolicy>) -> Self {
        Self { api, retry }
    }

    /// Lifecycle state of a record, from its nested connection counts
    pub fn classify(record: &PullRequestRecord) -> ItemState {
        ItemState::of_record(record)
    }

    /// Completes every incomplete nested field of `record` in place
    ///
    /// On error the record keeps whatever was merged before the failure,
    /// including the resume cursor, so persisting it loses no progress.
    pub async fn complete_item(&self, record: &mut PullRequestRecord) -> Result<(), ItemError> {
        let number = record.number;
        let api = &self.api;
        let retry = &self.retry;

        for field in record.incomplete_fields() {
            let label = format!("{} of #{}", field, number);
            let label = label.as_str();
            tracing::debug!("Completing {} ({})", label, ItemState::of_record(record));

            match field {
                NestedField::Comments => {
                    let fetch = |cursor: Option<String>| async move {
                        retry
                            .run(Resource::Graphql, label, || {
                                api.comments(number, cursor.as_deref())
                            })
                            .await
                            .map(Page::from)
                    };
                    complete_field(number, field, &mut record.comments, fetch).await?;
                }
                NestedField::ReviewThreads => {
                    if !record.review_threads.is_complete() {
                        let fetch = |cursor: Option<String>| async move {
                            retry
                                .run(Resource::Graphql, label, || {
                                    api.review_threads(number, cursor.as_deref())
                                })
                                .await
                                .map(Page::from)
                        };
                        complete_field(number, field, &mut record.review_threads, fetch).await?;
                    }
                    for thread in &mut record.review_threads.nodes {
                        if !thread.is_complete() {
                            self.complete_thread(number, thread).await?;
                        }
                    }
                }
                NestedField::Commits => {
                    let fetch = |cursor: Option<String>| async move {
                        retry
                            .run(Resource::Graphql, label, || {
                                api.commits(number, cursor.as_deref())
                            })
                            .await
                            .map(Page::from)
                    };
                    complete_field(number, field, &mut record.commits, fetch).await?;
                }
            }
        }

        Ok(())
    }

    /// Fetches the comments a review thread was returned without
    ///
    /// The thread keeps whatever was merged, and its resume cursor, when the
    /// fetch fails.
    async fn complete_thread(
        &self,
        number: u64,
        thread: &mut ReviewThread,
    ) -> Result<(), ItemError> {
        let api = &self.api;
        let retry = &self.retry;
        let thread_id = thread.id.as_str();
        let label = format!("comments of review thread {} on #{}", thread_id, number);
        let label = label.as_str();

        let fetch = |cursor: Option<String>| async move {
            retry
                .run(Resource::Graphql, label, || {
                    api.thread_comments(thread_id, cursor.as_deref())
                })
                .await
                .map(Page::from)
        };

        let mut nested = NestedConnection::<ReviewComment>::from(thread.comments.clone());
        let result = complete_field(number, NestedField::ReviewThreads, &mut nested, fetch).await;
        thread.comments = nested.into();
        result
    }
}

/// Resumes one nested field from its stored cursor, falling back to a single
/// full pass from the start if the counts still disagree
async fn complete_field<T, F, Fut>(
    number: u64,
    field: NestedField,
    nested: &mut NestedConnection<T>,
    fetch: F,
) -> Result<(), ItemError>
where
    T: Keyed,
    F: Fn(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, RetryError>>,
{
    let resumed = nested.end_cursor.is_some();

    let pages = Paginator::resume_from(nested.end_cursor.clone(), &fetch);
    merge_pages(pages, nested)
        .await
        .map_err(|source| ItemError::Fetch {
            number,
            field,
            source,
        })?;
    nested.settle();

    if nested.is_complete() {
        return Ok(());
    }

    if resumed {
        tracing::debug!(
            "{} of #{} has {} of {} nodes after resuming; refetching from the start",
            field,
            number,
            nested.nodes.len(),
            nested.total_count
        );
        nested.reset();
        merge_pages(Paginator::new(&fetch), nested)
            .await
            .map_err(|source| ItemError::Fetch {
                number,
                field,
                source,
            })?;
        nested.settle();

        if nested.is_complete() {
            return Ok(());
        }
    }

    Err(ItemError::Incomplete {
        number,
        field,
        fetched: nested.nodes.len(),
        expected: nested.total_count,
    })
}

async fn merge_pages<T, F, Fut>(
    mut pages: Paginator<F>,
    nested: &mut NestedConnection<T>,
) -> Result<(), PaginationError>
where
    T: Keyed,
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, RetryError>>,
{
    while let Some(page) = pages.next_page().await? {
        nested.total_count = page.total_count;
        nested.merge(page.nodes);
        nested.end_cursor = pages.cursor().map(str::to_string);
    }
    Ok(())
}
