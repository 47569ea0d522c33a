//! Crawler coordinator - main crawl orchestration logic
//!
//! This module drives a crawl through three phases, each resumable on its own:
//! - **enumerate**: page through pull requests newest first, writing one record
//!   per pull request and checkpointing after every page
//! - **details**: complete the truncated nested connections of pending items
//! - **diffs**: download one diff per commit of every complete item
//!
//! The checkpoint is saved after every page and every item, so an interrupted
//! run loses at most the unit of work in flight.

use crate::config::Config;
use crate::crawler::diffs::{DiffFetcher, DiffReport};
use crate::crawler::items::ItemFetcher;
use crate::crawler::paginator::{Page, Paginator};
use crate::crawler::retry::RetryPolicy;
use crate::crawler::throttle::ThrottleGuard;
use crate::github::{GitHubClient, PullRequestApi, PullRequestNode, Resource};
use crate::state::{CrawlState, ItemState};
use crate::storage::{CheckpointStore, OutputLayout, PullRequestRecord, RecordStore};
use crate::{HarvestError, Result};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Summary of one crawl run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Pull requests the host reports for the repository
    pub total_items: u64,

    /// Pull requests recorded across all runs
    pub processed_items: u64,

    /// Records written by enumeration in this run
    pub recorded: usize,

    /// Pending items completed in this run
    pub completed: usize,

    /// Items complete after this run
    pub complete_total: usize,

    /// Items still partially fetched after this run
    pub pending_total: usize,

    /// Item failures recorded in this run
    pub item_failures: usize,

    /// Diff phase outcome, `None` when skipped
    pub diffs: Option<DiffReport>,

    /// Whether the whole pull-request connection has been walked
    pub enumeration_finished: bool,

    /// Whether the per-run item limit stopped enumeration
    pub limit_reached: bool,
}

impl CrawlReport {
    /// Returns true if nothing is left for a later run to do
    pub fn is_complete(&self) -> bool {
        self.enumeration_finished
            && self.pending_total == 0
            && self.item_failures == 0
            && self.diffs.as_ref().map_or(true, |d| d.failed == 0)
    }

    /// Returns true if the run did everything it set out to do
    ///
    /// Same as [`is_complete`](Self::is_complete), except that a walk cut short
    /// by the item limit still counts as success.
    pub fn is_successful(&self) -> bool {
        (self.enumeration_finished || self.limit_reached)
            && self.pending_total == 0
            && self.item_failures == 0
            && self.diffs.as_ref().map_or(true, |d| d.failed == 0)
    }
}

/// Main crawler coordinator structure
pub struct Coordinator<A> {
    config: Arc<Config>,
    api: Arc<A>,
    retry: Arc<RetryPolicy>,
    layout: OutputLayout,
    checkpoint: CheckpointStore,
    records: RecordStore,
    state: CrawlState,
    last_saved: Option<CrawlState>,
}

impl<A: PullRequestApi + 'static> Coordinator<A> {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The validated crawl configuration
    /// * `api` - The remote query interface
    /// * `fresh` - Ignore any existing checkpoint and start over
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Output directories exist and state is loaded
    /// * `Err(HarvestError)` - The output directories could not be created
    pub fn new(config: Config, api: Arc<A>, fresh: bool) -> Result<Self> {
        let layout = OutputLayout::new(&config.output.directory);
        layout.create_dirs()?;

        let repository = config.repository.slug();
        let checkpoint = layout.checkpoint();
        let state = if fresh {
            tracing::info!("Starting fresh crawl of {}", repository);
            CrawlState::new(repository)
        } else {
            let state = checkpoint.load(&repository);
            if state.processed_items > 0 {
                tracing::info!(
                    "Resuming crawl of {}: {} recorded, {} complete, {} pending",
                    repository,
                    state.processed_items,
                    state.completed_count(),
                    state.pending_count()
                );
            } else {
                tracing::info!("No previous progress for {}, starting new crawl", repository);
            }
            state
        };

        let last_saved = if fresh {
            None
        } else {
            checkpoint.peek().filter(|saved| *saved == state)
        };

        let throttle = Arc::new(ThrottleGuard::from_config(api.clone(), &config.crawler));
        let retry = Arc::new(RetryPolicy::from_config(throttle, &config.crawler));

        Ok(Self {
            records: layout.records(),
            config: Arc::new(config),
            api,
            retry,
            layout,
            checkpoint,
            state,
            last_saved,
        })
    }

    pub fn state(&self) -> &CrawlState {
        &self.state
    }

    /// Runs every phase and returns the run summary
    ///
    /// Fatal errors (local I/O, rejected credential, enumeration failure after
    /// retries) are returned after the checkpoint has been saved.
    pub async fn run(&mut self) -> Result<CrawlReport> {
        tracing::info!("Crawling {}", self.state.repository);
        let start_time = std::time::Instant::now();
        let mut report = CrawlReport::default();

        self.enumerate(&mut report).await?;
        self.complete_pending(&mut report).await?;
        report.diffs = self.fetch_diffs().await?;

        self.save_checkpoint()?;

        report.total_items = self.state.total_items;
        report.processed_items = self.state.processed_items;
        report.complete_total = self.state.completed_count();
        report.pending_total = self.state.pending_count();
        report.enumeration_finished = self.state.enumeration_complete;

        tracing::info!(
            "Crawl finished in {:?}: {} of {} pull requests complete, {} pending",
            start_time.elapsed(),
            report.complete_total,
            report.total_items,
            report.pending_total
        );

        Ok(report)
    }

    /// Pages through pull requests from the checkpoint cursor
    async fn enumerate(&mut self, report: &mut CrawlReport) -> Result<()> {
        if self.state.enumeration_complete {
            tracing::info!("Enumeration already complete, skipping");
            return Ok(());
        }

        let api = self.api.clone();
        let retry = self.retry.clone();
        let (api, retry) = (&api, &retry);
        let first = self.config.crawler.page_size;

        let fetch = |cursor: Option<String>| async move {
            retry
                .run(Resource::Graphql, "pull request page", || {
                    api.pull_requests(first, cursor.as_deref())
                })
                .await
                .map(Page::from)
        };
        let mut pages = Paginator::resume_from(self.state.cursor.clone(), fetch);

        if let Some(cursor) = pages.cursor() {
            tracing::info!("Resuming enumeration after cursor {}", cursor);
        }

        loop {
            if self.limit_reached(report) {
                report.limit_reached = true;
                break;
            }

            let page = match pages.next_page().await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(e) => {
                    self.save_checkpoint()?;
                    return Err(if e.is_auth() {
                        HarvestError::Unauthorized(e.to_string())
                    } else {
                        HarvestError::Enumeration(e)
                    });
                }
            };

            self.state.total_items = page.total_count;
            let page_len = page.nodes.len();
            let mut handled = 0;
            for node in page.nodes {
                if self.limit_reached(report) {
                    break;
                }
                self.record_node(node, report)?;
                handled += 1;
            }

            if handled < page_len {
                // Cursor stays before this page so the rest is picked up next run
                tracing::info!(
                    "Item limit reached after {} new records; stopping enumeration",
                    report.recorded
                );
                report.limit_reached = true;
                self.save_checkpoint()?;
                return Ok(());
            }

            if pages.is_finished() {
                self.state.finish_enumeration();
            } else if let Some(cursor) = pages.cursor() {
                self.state.advance_cursor(cursor.to_string());
            }
            self.save_checkpoint()?;

            tracing::info!(
                "Progress: {} of {} pull requests recorded, {} pending",
                self.state.processed_items,
                self.state.total_items,
                self.state.pending_count()
            );

            if pages.is_finished() {
                break;
            }
        }

        Ok(())
    }

    fn limit_reached(&self, report: &CrawlReport) -> bool {
        self.config
            .crawler
            .limit
            .map_or(false, |limit| report.recorded as u64 >= limit)
    }

    /// Writes the record for one enumerated node and classifies it
    fn record_node(&mut self, node: PullRequestNode, report: &mut CrawlReport) -> Result<()> {
        let number = node.number;
        if self.state.is_known(number) && self.records.exists(number) {
            tracing::debug!("#{} already recorded, skipping", number);
            return Ok(());
        }

        let record = PullRequestRecord::from(node);
        self.records.write(&record)?;
        report.recorded += 1;

        match ItemFetcher::<A>::classify(&record) {
            ItemState::Complete => {
                self.state.mark_complete(number);
            }
            _ => {
                if !self.state.mark_pending(number) {
                    self.state.reopen(number);
                }
                tracing::debug!(
                    "#{} is partially fetched ({})",
                    number,
                    record
                        .incomplete_fields()
                        .iter()
                        .map(|f| f.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
        }

        Ok(())
    }

    /// Completes pending items, newest first
    async fn complete_pending(&mut self, report: &mut CrawlReport) -> Result<()> {
        let pending: Vec<u64> = self.state.pending_ids.iter().rev().copied().collect();
        if pending.is_empty() {
            return Ok(());
        }

        tracing::info!("Completing {} partially fetched pull requests", pending.len());
        let fetcher = ItemFetcher::new(self.api.clone(), self.retry.clone());

        for (index, number) in pending.iter().copied().enumerate() {
            let Some(mut record) = self.records.read(number)? else {
                tracing::warn!("Record for #{} is missing or unreadable", number);
                self.state
                    .record_error(number, "record file missing or unreadable");
                report.item_failures += 1;
                self.save_checkpoint()?;
                continue;
            };

            let result = fetcher.complete_item(&mut record).await;
            self.records.write(&record)?;

            match result {
                Ok(()) => {
                    self.state.mark_complete(number);
                    report.completed += 1;
                }
                Err(e) if e.is_auth() => {
                    self.save_checkpoint()?;
                    return Err(HarvestError::Unauthorized(e.to_string()));
                }
                Err(e) => {
                    tracing::warn!("Leaving #{} pending: {}", number, e);
                    self.state.record_error(number, e.to_string());
                    report.item_failures += 1;
                }
            }
            self.save_checkpoint()?;

            if (index + 1) % 10 == 0 {
                tracing::info!(
                    "Progress: {} of {} pending pull requests processed",
                    index + 1,
                    pending.len()
                );
            }
        }

        Ok(())
    }

    /// Downloads the diffs of every commit referenced by a complete record
    async fn fetch_diffs(&self) -> Result<Option<DiffReport>> {
        if self.config.crawler.skip_diffs {
            tracing::info!("Skipping diff phase");
            return Ok(None);
        }

        let mut oids = BTreeSet::new();
        for number in &self.state.completed_ids {
            if let Some(record) = self.records.read(*number)? {
                oids.extend(record.commit_oids().map(str::to_string));
            }
        }

        let fetcher = DiffFetcher::new(
            self.api.clone(),
            self.retry.clone(),
            self.layout.diffs(),
            self.config.crawler.diff_concurrency,
        );
        fetcher.fetch_all(oids).await.map(Some)
    }

    /// Writes the checkpoint if the state changed since it was last written
    fn save_checkpoint(&mut self) -> Result<()> {
        if self.last_saved.as_ref() == Some(&self.state) {
            return Ok(());
        }
        self.state.touch();
        self.checkpoint.save(&self.state)?;
        self.last_saved = Some(self.state.clone());
        Ok(())
    }
}

/// Runs a complete crawl against the configured host
///
/// # Arguments
///
/// * `config` - The validated crawl configuration
/// * `token` - Bearer token for the API
/// * `fresh` - Ignore any existing checkpoint
///
/// # Example
///
/// ```no_run
/// use pr_harvest::config::{load_config, resolve_token};
/// use pr_harvest::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("harvest.toml"))?;
/// let token = resolve_token(&config.github)?;
/// let report = run_crawl(config, token, false).await?;
/// println!("{} pull requests complete", report.complete_total);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config, token: String, fresh: bool) -> Result<CrawlReport> {
    let client = GitHubClient::new(&config.github, &config.repository, token)?;
    let mut coordinator = Coordinator::new(config, Arc::new(client), fresh)?;
    coordinator.run().await
}
