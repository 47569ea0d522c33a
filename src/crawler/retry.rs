//! Retry policy for remote calls
//!
//! Every remote call goes through [`RetryPolicy::run`], which admits it through
//! the [`ThrottleGuard`] and then reacts to failures by class:
//!
//! | Class | Reaction |
//! |-------|----------|
//! | RateLimit | wait for the quota window, retry without spending an attempt |
//! | Transient | exponential backoff, up to `max_attempts` attempts |
//! | Permanent | surface immediately |

use crate::config::CrawlerConfig;
use crate::crawler::throttle::ThrottleGuard;
use crate::github::{ApiError, ApiResult, ErrorKind, Resource};
use backon::{BackoffBuilder, ExponentialBuilder};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A remote call that could not be completed
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("{label} failed after {attempts} attempts: {last}")]
    Exhausted {
        label: String,
        attempts: u32,
        #[source]
        last: ApiError,
    },

    #[error("{label} failed: {source}")]
    Permanent {
        label: String,
        #[source]
        source: ApiError,
    },
}

impl RetryError {
    /// The last error returned by the remote side
    pub fn api_error(&self) -> &ApiError {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Permanent { source, .. } => source,
        }
    }

    /// Returns true if the credential was rejected
    pub fn is_auth(&self) -> bool {
        self.api_error().is_auth()
    }
}

/// Retry policy shared by the crawler phases
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    max_rate_limit_waits: u32,
    throttle: Arc<ThrottleGuard>,
}

impl RetryPolicy {
    pub fn new(
        throttle: Arc<ThrottleGuard>,
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        max_rate_limit_waits: u32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            max_rate_limit_waits,
            throttle,
        }
    }

    pub fn from_config(throttle: Arc<ThrottleGuard>, config: &CrawlerConfig) -> Self {
        Self::new(
            throttle,
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.max_rate_limit_waits,
        )
    }

    pub fn throttle(&self) -> &Arc<ThrottleGuard> {
        &self.throttle
    }

    fn backoff(&self) -> impl Iterator<Item = Duration> {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
            .build()
    }

    /// Runs `operation` until it succeeds, fails permanently or runs out of
    /// attempts
    ///
    /// # Arguments
    ///
    /// * `resource` - Quota pool the call is charged to
    /// * `label` - Short description used in logs and errors
    /// * `operation` - Produces a fresh attempt each time it is called
    pub async fn run<T, F, Fut>(
        &self,
        resource: Resource,
        label: &str,
        mut operation: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let mut delays = self.backoff();
        let mut attempts = 0u32;
        let mut rate_limit_waits = 0u32;

        loop {
            self.throttle.await_capacity(resource).await;
            attempts += 1;

            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match err.kind() {
                ErrorKind::Permanent => {
                    return Err(RetryError::Permanent {
                        label: label.to_string(),
                        source: err,
                    });
                }
                ErrorKind::RateLimit if rate_limit_waits < self.max_rate_limit_waits => {
                    rate_limit_waits += 1;
                    attempts -= 1;
                    tracing::warn!(
                        "{}: rate limited ({}/{} waits): {}",
                        label,
                        rate_limit_waits,
                        self.max_rate_limit_waits,
                        err
                    );
                    self.throttle.drain(resource, err.reset_at()).await;
                }
                ErrorKind::RateLimit => {
                    tracing::warn!(
                        "{}: still rate limited after {} waits; giving up",
                        label,
                        rate_limit_waits
                    );
                    return Err(RetryError::Exhausted {
                        label: label.to_string(),
                        attempts,
                        last: err,
                    });
                }
                ErrorKind::Transient => {
                    let delay = if attempts < self.max_attempts {
                        delays.next()
                    } else {
                        None
                    };
                    let Some(delay) = delay else {
                        return Err(RetryError::Exhausted {
                            label: label.to_string(),
                            attempts,
                            last: err,
                        });
                    };
                    tracing::warn!(
                        "{}: attempt {}/{} failed, retrying in {:?}: {}",
                        label,
                        attempts,
                        self.max_attempts,
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
