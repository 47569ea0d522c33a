//! Quota-aware admission control for remote calls
//!
//! The host grants a fixed number of points per pool (`graphql`, `core`) per
//! window. The guard keeps a cached copy of each pool's budget and decrements
//! it on every admitted call. Whenever a response has reported the pool's real
//! remaining points, that figure replaces the cached one, so queries costing
//! more than one point are accounted for. Without such reports the guard
//! re-synchronises with the quota endpoint every `sync_interval` reservations
//! or once the window has rolled over. When the budget is at or below the
//! threshold the caller is suspended until the window resets.

use crate::config::CrawlerConfig;
use crate::github::{ApiResult, Budget, RateLimitSource, Resource};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// How long to back off when the host reports a limit while the primary
/// quota still has room (secondary / abuse limits publish no reset time)
const SECONDARY_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Cached view of one quota pool
#[derive(Debug, Clone, Copy)]
struct CachedBudget {
    budget: Budget,
    reservations_since_sync: u32,
}

/// Throttle guard shared by every task issuing remote calls
pub struct ThrottleGuard {
    source: Arc<dyn RateLimitSource>,
    threshold: u64,
    safety_margin: Duration,
    sync_interval: u32,
    budgets: Mutex<HashMap<Resource, CachedBudget>>,
}

impl ThrottleGuard {
    pub fn new(
        source: Arc<dyn RateLimitSource>,
        threshold: u64,
        safety_margin: Duration,
        sync_interval: u32,
    ) -> Self {
        Self {
            source,
            threshold,
            safety_margin,
            sync_interval: sync_interval.max(1),
            budgets: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a guard using the thresholds from the crawler configuration
    pub fn from_config(source: Arc<dyn RateLimitSource>, config: &CrawlerConfig) -> Self {
        Self::new(
            source,
            config.throttle_threshold,
            Duration::from_secs(config.safety_margin_secs),
            config.sync_interval,
        )
    }

    /// Queries the live budget of one pool
    pub async fn remaining_budget(&self, resource: Resource) -> ApiResult<Budget> {
        let snapshot = self.source.rate_limit().await?;
        Ok(snapshot.budget(resource))
    }

    /// Suspends until one more call against `resource` fits in the budget,
    /// then reserves it
    ///
    /// If the quota endpoint itself fails the call is admitted anyway; the
    /// retry policy will catch a real rate limit from the response.
    pub async fn await_capacity(&self, resource: Resource) {
        loop {
            let wait_until = {
                let mut budgets = self.budgets.lock().await;

                if let Some(budget) = self.source.take_observed(resource) {
                    tracing::trace!(
                        "Observed {} budget: {}/{} remaining",
                        resource,
                        budget.remaining,
                        budget.limit
                    );
                    budgets.insert(
                        resource,
                        CachedBudget {
                            budget,
                            reservations_since_sync: 0,
                        },
                    );
                }

                let stale = match budgets.get(&resource) {
                    None => true,
                    Some(cached) => {
                        cached.reservations_since_sync >= self.sync_interval
                            || cached.budget.reset_at <= Utc::now()
                    }
                };

                if stale {
                    match self.remaining_budget(resource).await {
                        Ok(budget) => {
                            tracing::debug!(
                                "Synced {} budget: {}/{} remaining, resets at {}",
                                resource,
                                budget.remaining,
                                budget.limit,
                                budget.reset_at
                            );
                            budgets.insert(
                                resource,
                                CachedBudget {
                                    budget,
                                    reservations_since_sync: 0,
                                },
                            );
                        }
                        Err(e) => {
                            tracing::warn!("Could not query {} budget: {}", resource, e);
                            budgets.remove(&resource);
                            return;
                        }
                    }
                }

                let Some(cached) = budgets.get_mut(&resource) else {
                    return;
                };

                if cached.budget.remaining > self.threshold {
                    cached.budget.remaining -= 1;
                    cached.reservations_since_sync += 1;
                    return;
                }

                let reset_at = cached.budget.reset_at;
                budgets.remove(&resource);
                reset_at
            };

            tracing::info!(
                "{} budget at or below {}; pausing until {}",
                resource,
                self.threshold,
                wait_until
            );
            self.sleep_until_reset(wait_until).await;
        }
    }

    /// Waits out a rate-limit window the host has just reported
    ///
    /// `reset_hint` is the reset time declared by the failing response. Without
    /// one the quota endpoint is consulted; if it still shows room, the limit
    /// was a secondary one and a fixed pause is taken instead.
    pub async fn drain(&self, resource: Resource, reset_hint: Option<DateTime<Utc>>) {
        match reset_hint {
            Some(reset_at) => {
                tracing::info!("{} rate limit hit; waiting until {}", resource, reset_at);
                self.sleep_until_reset(reset_at).await;
            }
            None => match self.remaining_budget(resource).await {
                Ok(budget) if budget.remaining <= self.threshold => {
                    tracing::info!(
                        "{} rate limit hit; waiting until {}",
                        resource,
                        budget.reset_at
                    );
                    self.sleep_until_reset(budget.reset_at).await;
                }
                Ok(_) => {
                    tracing::info!(
                        "Secondary {} rate limit hit; pausing for {:?}",
                        resource,
                        SECONDARY_LIMIT_WAIT
                    );
                    tokio::time::sleep(SECONDARY_LIMIT_WAIT).await;
                }
                Err(e) => {
                    tracing::warn!(
                        "Could not query {} budget after rate limit ({}); pausing for {:?}",
                        resource,
                        e,
                        SECONDARY_LIMIT_WAIT
                    );
                    tokio::time::sleep(SECONDARY_LIMIT_WAIT).await;
                }
            },
        }

        self.budgets.lock().await.remove(&resource);
    }

    async fn sleep_until_reset(&self, reset_at: DateTime<Utc>) {
        let wait = (reset_at - Utc::now()).to_std().unwrap_or(Duration::ZERO) + self.safety_margin;
        tokio::time::sleep(wait).await;
    }
}
