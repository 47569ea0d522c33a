//! Per-commit diff download with a bounded worker pool

use crate::crawler::retry::{RetryError, RetryPolicy};
use crate::github::{PullRequestApi, Resource};
use crate::storage::DiffStore;
use crate::{HarvestError, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

/// Outcome of one diff phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffReport {
    /// Unique commit ids considered
    pub requested: usize,

    /// Diffs downloaded and written this run
    pub fetched: usize,

    /// Diffs already on disk
    pub skipped: usize,

    /// Diffs that could not be fetched
    pub failed: usize,

    pub failed_oids: Vec<String>,
}

enum Outcome {
    Fetched,
    Failed { oid: String, error: RetryError },
}

/// Downloads one diff per commit, never more than `concurrency` at a time
///
/// Workers share the throttle guard and retry policy but never touch the
/// crawl state; a failed diff is logged and left for a later run, since the
/// missing file is its only marker.
pub struct DiffFetcher<A> {
    api: Arc<A>,
    retry: Arc<RetryPolicy>,
    store: DiffStore,
    concurrency: usize,
}

impl<A: PullRequestApi + 'static> DiffFetcher<A> {
    pub fn new(api: Arc<A>, retry: Arc<RetryPolicy>, store: DiffStore, concurrency: usize) -> Self {
        Self {
            api,
            retry,
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Fetches every diff in `oids` that is not on disk yet
    ///
    /// Only local write failures and a rejected credential are errors; every
    /// other failure is counted in the report.
    pub async fn fetch_all<I>(&self, oids: I) -> Result<DiffReport>
    where
        I: IntoIterator<Item = String>,
    {
        let unique: BTreeSet<String> = oids.into_iter().collect();
        let mut report = DiffReport {
            requested: unique.len(),
            ..DiffReport::default()
        };

        let missing: Vec<String> = unique
            .into_iter()
            .filter(|oid| !self.store.exists(oid))
            .collect();
        report.skipped = report.requested - missing.len();

        tracing::info!(
            "Fetching {} diffs ({} already on disk) with {} workers",
            missing.len(),
            report.skipped,
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut queue = missing.into_iter();
        let mut workers = JoinSet::new();
        let mut fatal: Option<HarvestError> = None;

        loop {
            // Refill the pool; nothing new starts once a fatal error is seen
            while fatal.is_none() {
                let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                    break;
                };
                let Some(oid) = queue.next() else {
                    break;
                };
                self.spawn_worker(&mut workers, oid, permit);
            }

            let Some(joined) = workers.join_next().await else {
                break;
            };
            match joined {
                Ok(Ok(Outcome::Fetched)) => report.fetched += 1,
                Ok(Ok(Outcome::Failed { oid, error })) => {
                    tracing::warn!("Skipping diff {}: {}", oid, error);
                    if error.is_auth() && fatal.is_none() {
                        fatal = Some(HarvestError::Unauthorized(error.to_string()));
                        workers.abort_all();
                    }
                    report.failed += 1;
                    report.failed_oids.push(oid);
                }
                Ok(Err(e)) => {
                    if fatal.is_none() {
                        fatal = Some(e);
                        workers.abort_all();
                    }
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    tracing::error!("Diff worker panicked: {}", e);
                    report.failed += 1;
                }
            }
        }

        if let Some(e) = fatal {
            return Err(e);
        }

        report.failed_oids.sort();
        tracing::info!(
            "Diffs: {} fetched, {} skipped, {} failed",
            report.fetched,
            report.skipped,
            report.failed
        );
        Ok(report)
    }

    fn spawn_worker(
        &self,
        workers: &mut JoinSet<Result<Outcome>>,
        oid: String,
        permit: OwnedSemaphorePermit,
    ) {
        let api = self.api.clone();
        let retry = self.retry.clone();
        let store = self.store.clone();

        workers.spawn(async move {
            let _permit = permit;
            let label = format!("diff {}", oid);
            let fetched = retry
                .run(Resource::Core, &label, || api.commit_diff(&oid))
                .await;
            let diff = match fetched {
                Ok(diff) => diff,
                Err(error) => return Ok(Outcome::Failed { oid, error }),
            };
            store.write(&oid, &diff).await?;
            tracing::debug!("Wrote diff {}", oid);
            Ok::<_, HarvestError>(Outcome::Fetched)
        });
    }
}
