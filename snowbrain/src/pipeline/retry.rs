use std::future::Future;
use std::time::{Duration, Instant};

use crate::config::BrainConfig;
use crate::error::{BrainError, Result};

/// A value together with the wall-clock time it took to produce, retries included.
#[derive(Debug, Clone)]
pub struct Timed<T> {
    pub value: T,
    pub elapsed: Duration,
}

/// Bounded retry with exponential backoff.
///
/// The delay before attempt `n + 1` is `base_delay * 2^(n - 1)`, capped at
/// `max_delay`. A rate-limit error carrying a retry-after hint waits at least
/// that long (still capped). Only errors the predicate accepts are retried;
/// everything else is returned after the first attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Policy for the three outbound generation calls.
    pub fn for_calls(config: &BrainConfig) -> Self {
        Self::new(
            config.retry_max_attempts,
            Duration::from_millis(config.retry_base_delay_ms),
            Duration::from_millis(config.retry_max_delay_ms),
        )
    }

    /// Policy for row inserts.
    pub fn for_writes(config: &BrainConfig) -> Self {
        Self::new(
            config.write_max_attempts,
            Duration::from_millis(config.retry_base_delay_ms),
            Duration::from_millis(config.retry_max_delay_ms),
        )
    }

    pub fn delay_for(&self, attempt: u32, error: &BrainError) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let backoff = self
            .base_delay
            .saturating_mul(2_u32.saturating_pow(exponent))
            .min(self.max_delay);

        match error.retry_after() {
            Some(hint) => backoff.max(hint.min(self.max_delay)),
            None => backoff,
        }
    }

    /// Retry transient failures.
    pub async fn run<T, F, Fut>(&self, label: &str, op: F) -> Result<Timed<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_if(label, BrainError::is_transient, op).await
    }

    /// Retry failures accepted by `retryable`.
    pub async fn run_if<T, F, Fut, P>(&self, label: &str, retryable: P, mut op: F) -> Result<Timed<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&BrainError) -> bool,
    {
        let started = Instant::now();
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => {
                    return Ok(Timed {
                        value,
                        elapsed: started.elapsed(),
                    })
                }
                Err(error) if attempt < self.max_attempts && retryable(&error) => {
                    let delay = self.delay_for(attempt, &error);
                    tracing::debug!(
                        call = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    if attempt > 1 {
                        tracing::debug!(call = label, attempts = attempt, "Giving up");
                    }
                    return Err(error);
                }
            }
        }
    }
}
