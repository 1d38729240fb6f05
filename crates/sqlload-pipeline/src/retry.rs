//! Bounded retry of a unit of work.
//!
//! A [`RetryPolicy`] runs one initial attempt plus up to `max_retries`
//! retries. Only failures whose [`FaultKind`] is in the policy's allow-list
//! are retried; anything else, or the last failure after exhaustion, is
//! returned to the caller unchanged.

use std::future::Future;
use std::time::Duration;

use sqlload_adapter_db::FaultKind;
use tracing::warn;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_DELAY: Duration = Duration::from_millis(2_000);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(256);

/// Failure classification consulted by the retry loop.
pub trait Classify {
    fn fault_kind(&self) -> Option<FaultKind>;
}

impl Classify for sqlload_adapter_db::Error {
    fn fault_kind(&self) -> Option<FaultKind> {
        sqlload_adapter_db::Error::fault_kind(self)
    }
}

/// A repeatable unit of work.
pub trait Operation {
    type Output;
    type Error: Classify;

    fn attempt(&mut self) -> impl Future<Output = Result<Self::Output, Self::Error>>;
}

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// The same delay before every retry
    Fixed,
    /// Doubling delay, capped at `max_delay`
    Exponential { max_delay: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
    pub backoff: Backoff,
    pub retry_on: Vec<FaultKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_DELAY,
            backoff: Backoff::Fixed,
            retry_on: vec![FaultKind::TransientConnection],
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_exponential_backoff(mut self, max_delay: Duration) -> Self {
        self.backoff = Backoff::Exponential { max_delay };
        self
    }

    pub fn with_retry_on(mut self, retry_on: Vec<FaultKind>) -> Self {
        self.retry_on = retry_on;
        self
    }

    /// Whether a failure with this classification may be retried.
    pub fn should_retry(&self, fault: Option<FaultKind>) -> bool {
        fault.is_some_and(|fault| self.retry_on.contains(&fault))
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { max_delay } => {
                let factor = 2_u32.checked_pow(retry).unwrap_or(u32::MAX);
                self.delay.saturating_mul(factor).min(max_delay)
            }
        }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable
    /// classification, or the retries are exhausted.
    pub async fn run<O: Operation>(&self, operation: &mut O) -> Result<O::Output, O::Error> {
        let mut retries = 0;
        loop {
            let err = match operation.attempt().await {
                Ok(output) => return Ok(output),
                Err(err) => err,
            };

            let fault = err.fault_kind();
            if retries >= self.max_retries || !self.should_retry(fault) {
                return Err(err);
            }

            let delay = self.delay_for(retries);
            retries += 1;
            warn!(
                retry = retries,
                max_retries = self.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                fault = ?fault,
                "attempt failed, retrying"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}
