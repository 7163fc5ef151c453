//! Exponential backoff for retryable errors.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::PilotError;

/// Retry policy for operations that have produced no side effects yet,
/// such as opening a provider stream.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or attempts run out. A rate limit's `retry_after` hint raises the
    /// wait when it exceeds the backoff.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, PilotError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PilotError>>,
    {
        let mut backoff = self.initial_backoff;
        let mut attempt = 1;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !err.is_retryable() || attempt >= self.max_attempts {
                return Err(err);
            }

            let jittered = backoff.mul_f64(0.75 + jitter() * 0.5);
            let wait = match &err {
                PilotError::RateLimited {
                    retry_after_ms: Some(ms),
                } => jittered.max(Duration::from_millis(*ms)),
                _ => jittered,
            }
            .min(self.max_backoff);
            warn!(
                attempt,
                max_attempts = self.max_attempts,
                category = ?err.category(),
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "retrying after error"
            );
            tokio::time::sleep(wait).await;

            backoff = backoff.mul_f64(self.multiplier).min(self.max_backoff);
            attempt += 1;
        }
    }
}

/// Pseudo-random factor in [0, 1) from the clock and thread id.
fn jitter() -> f64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .hash(&mut hasher);
    std::thread::current().id().hash(&mut hasher);
    (hasher.finish() % 10_000) as f64 / 10_000.0
}
