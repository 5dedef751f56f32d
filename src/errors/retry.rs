use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::types::ProbeError;

/// Seconds added to the backoff for every retry already made.
const BACKOFF_STEP_SECS: u64 = 2;

/// How many times a request is re-sent after its first attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    retries: u32,
}

impl RetryPolicy {
    pub fn new(retries: u32) -> Self {
        Self { retries }
    }

    /// Build a policy from a declared retry count. Zero or negative means a
    /// single attempt, never zero attempts.
    pub fn from_declared(retry_count: i64) -> Self {
        Self::new(u32::try_from(retry_count.max(0)).unwrap_or(u32::MAX))
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Wait before attempt `attempt` (0-indexed): none for the first attempt,
    /// then 2s, 4s, 6s, ...
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_secs(BACKOFF_STEP_SECS * u64::from(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Suspends the current run between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Run `factory` until it succeeds or the policy's attempts are used up.
///
/// Every failure counts against the budget, whatever its cause. On
/// exhaustion the last error is returned as `ProbeError::Request`.
pub async fn with_retry<F, Fut, T, E>(
    operation_name: &str,
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
    verbose: bool,
    mut factory: F,
) -> Result<T, ProbeError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts();
    let mut last_error: Option<String> = None;

    for attempt in 0..max_attempts {
        if attempt > 0 {
            let delay = policy.delay(attempt);
            if verbose {
                info!(
                    operation = operation_name,
                    attempt,
                    retries = policy.retries(),
                    delay_secs = delay.as_secs(),
                    "Waiting before retry"
                );
            } else {
                debug!(operation = operation_name, attempt, delay_secs = delay.as_secs(), "Retrying");
            }
            sleeper.sleep(delay).await;
        }

        match factory(attempt).await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if verbose {
                    warn!(operation = operation_name, attempt, error = %e, "Attempt failed");
                }
                last_error = Some(e.to_string());
            }
        }
    }

    Err(ProbeError::Request {
        attempts: max_attempts,
        message: last_error.unwrap_or_else(|| "no attempt was made".into()),
    })
}
