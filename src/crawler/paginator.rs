//! Cursor pagination over connections
//!
//! The paginator knows nothing about node shapes or queries: it is driven by a
//! fetch closure that turns an optional cursor into one [`Page`]. Callers wrap
//! the remote call in the retry policy inside that closure.

use crate::crawler::retry::RetryError;
use crate::github::Connection;
use std::future::Future;
use thiserror::Error;

/// One page of a connection
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub nodes: Vec<T>,
    pub total_count: u64,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

impl<T> From<Connection<T>> for Page<T> {
    fn from(connection: Connection<T>) -> Self {
        Self {
            nodes: connection.nodes,
            total_count: connection.total_count,
            has_next_page: connection.page_info.has_next_page,
            end_cursor: connection.page_info.end_cursor,
        }
    }
}

#[derive(Debug, Error)]
pub enum PaginationError {
    #[error(transparent)]
    Fetch(#[from] RetryError),

    #[error("page claims more results but has no end cursor (after {fetched} nodes)")]
    MissingCursor { fetched: usize },

    #[error("cursor {cursor} did not advance (after {fetched} nodes)")]
    Stalled { cursor: String, fetched: usize },
}

impl PaginationError {
    /// Returns true if the credential was rejected
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Fetch(err) => err.is_auth(),
            _ => false,
        }
    }
}

/// Lazily walks a connection one page at a time
///
/// `cursor()` always names the point after the last page handed out, so a
/// caller that persists it after processing a page can resume there later.
pub struct Paginator<F> {
    fetch: F,
    cursor: Option<String>,
    finished: bool,
    fetched: usize,
}

impl<F> Paginator<F> {
    /// Starts at the beginning of the connection
    pub fn new(fetch: F) -> Self {
        Self::resume_from(None, fetch)
    }

    /// Starts after `cursor`, or at the beginning when it is `None`
    pub fn resume_from(cursor: Option<String>, fetch: F) -> Self {
        Self {
            fetch,
            cursor,
            finished: false,
            fetched: 0,
        }
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Nodes handed out so far
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    /// Fetches the next page, or `None` once the connection is exhausted
    pub async fn next_page<T, Fut>(&mut self) -> Result<Option<Page<T>>, PaginationError>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<Page<T>, RetryError>>,
    {
        if self.finished {
            return Ok(None);
        }

        let page = (self.fetch)(self.cursor.clone()).await?;
        self.fetched += page.nodes.len();

        if !page.has_next_page {
            self.finished = true;
            if page.end_cursor.is_some() {
                self.cursor = page.end_cursor.clone();
            }
            return Ok(Some(page));
        }

        match &page.end_cursor {
            None => {
                self.finished = true;
                Err(PaginationError::MissingCursor {
                    fetched: self.fetched,
                })
            }
            Some(next) if page.nodes.is_empty() && self.cursor.as_ref() == Some(next) => {
                self.finished = true;
                Err(PaginationError::Stalled {
                    cursor: next.clone(),
                    fetched: self.fetched,
                })
            }
            Some(next) => {
                tracing::debug!(
                    "Fetched page of {} nodes, next cursor {}",
                    page.nodes.len(),
                    next
                );
                self.cursor = Some(next.clone());
                Ok(Some(page))
            }
        }
    }

    /// Drains every remaining page into one vector
    pub async fn collect_all<T, Fut>(mut self) -> Result<Vec<T>, PaginationError>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<Page<T>, RetryError>>,
    {
        let mut nodes = Vec::new();
        while let Some(page) = self.next_page().await? {
            nodes.extend(page.nodes);
        }
        Ok(nodes)
    }
}
