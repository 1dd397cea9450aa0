use crate::config::SessionConfig;
use crate::error::IsLeaderChange;
use backon::{ExponentialBuilder, Retryable};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Bounded retry for operations interrupted by a leader change.
///
/// Only failures classified as [`IsLeaderChange`] are retried; anything else is returned
/// after the first invocation, untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total invocations, including the first. Zero behaves like one.
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub backoff_factor: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            backoff_factor: 1.5,
        }
    }
}

impl From<&SessionConfig> for RetryPolicy {
    fn from(cfg: &SessionConfig) -> Self {
        Self {
            max_attempts: cfg.retry_max_attempts,
            initial_delay: cfg.retry_initial_delay(),
            backoff_factor: cfg.retry_backoff_factor,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            ..Self::default()
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_factor(self.backoff_factor)
            .with_max_times(self.max_attempts.saturating_sub(1))
    }

    pub async fn run<T, E, Fut, Op>(&self, operation: Op) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: IsLeaderChange + Display,
    {
        operation
            .retry(self.backoff())
            .when(IsLeaderChange::is_leader_change)
            .notify(|err: &E, dur: Duration| {
                warn!("Leader changed mid-operation ({}); retrying in {:?}", err, dur);
            })
            .await
    }
}

/// Runs `operation` under a [`RetryPolicy`] with the default 1.5x backoff.
pub async fn run_with_retry<T, E, Fut, Op>(
    operation: Op,
    max_attempts: usize,
    initial_delay: Duration,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsLeaderChange + Display,
{
    RetryPolicy::new(max_attempts, initial_delay)
        .run(operation)
        .await
}
