use crate::error::{FeedError, StoreError};
use rand::Rng;
use std::{fmt::Display, future::Future, time::Duration};
use tracing::warn;

/// Bounded exponential backoff with full jitter.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct RetryPolicy {
    /// Total attempts including the first, so `1` disables retrying.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Policy that makes a single attempt.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Upper bound of the sleep before retry number `attempt` (zero based):
    /// `min(base_delay * 2^attempt, max_delay)`.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Jittered sleep before retry number `attempt`, uniform in `[0, ceiling]`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling_ms = u64::try_from(self.ceiling(attempt).as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::rng().random_range(0..=ceiling_ms))
    }
}

/// Failure that may be retried.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        StoreError::is_transient(self)
    }
}

impl Transient for FeedError {
    fn is_transient(&self) -> bool {
        FeedError::is_transient(self)
    }
}

/// Run `operation` until it succeeds, fails with a non transient error, or the
/// [`RetryPolicy`] is out of attempts. The last error is returned.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, name: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(output) => return Ok(output),
            Err(error) if error.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay(attempt);
                warn!(
                    operation = name,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    ?delay,
                    %error,
                    "transient failure, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
