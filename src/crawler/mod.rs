//! Crawler module for pull-request harvesting
//!
//! This module contains the core crawling logic, including:
//! - Quota-aware admission control ([`ThrottleGuard`])
//! - Failure classification and backoff ([`RetryPolicy`])
//! - Cursor pagination ([`Paginator`])
//! - Completion of truncated nested connections ([`ItemFetcher`])
//! - Bounded-concurrency diff download ([`DiffFetcher`])
//! - Overall crawl coordination ([`Coordinator`])

mod coordinator;
mod diffs;
mod items;
mod paginator;
mod retry;
mod throttle;

pub use coordinator::{run_crawl, Coordinator, CrawlReport};
pub use diffs::{DiffFetcher, DiffReport};
pub use items::{ItemError, ItemFetcher};
pub use paginator::{Page, PaginationError, Paginator};
pub use retry::{RetryError, RetryPolicy};
pub use throttle::ThrottleGuard;
