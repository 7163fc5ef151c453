//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::PilotError;

/// Wrap a fallible future with a deadline; expiry yields [`PilotError::Timeout`].
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, PilotError>>,
) -> Result<T, PilotError> {
    with_deadline(Instant::now() + duration, duration, future).await
}

/// Like [`with_timeout`], against an absolute deadline shared by several
/// waits. `budget` is the total allowance reported on expiry.
pub async fn with_deadline<T>(
    deadline: Instant,
    budget: Duration,
    future: impl Future<Output = Result<T, PilotError>>,
) -> Result<T, PilotError> {
    match tokio::time::timeout_at(deadline, future).await {
        Ok(result) => result,
        Err(_) => Err(PilotError::Timeout(budget.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expiry_maps_to_timeout_error() {
        let pending = std::future::pending::<Result<(), PilotError>>();
        let err = with_timeout(Duration::from_millis(250), pending)
            .await
            .unwrap_err();
        assert!(matches!(err, PilotError::Timeout(250)));
    }

    #[tokio::test(start_paused = true)]
    async fn shared_deadline_counts_earlier_waits() {
        let deadline = Instant::now() + Duration::from_secs(10);
        tokio::time::sleep(Duration::from_secs(7)).await;
        let started = Instant::now();
        let pending = std::future::pending::<Result<(), PilotError>>();
        let err = with_deadline(deadline, Duration::from_secs(10), pending)
            .await
            .unwrap_err();
        assert!(matches!(err, PilotError::Timeout(10_000)));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(3) && waited < Duration::from_secs(4), "{waited:?}");
    }

    #[tokio::test]
    async fn inner_error_passes_through() {
        let failing = async { Err::<(), _>(PilotError::InvalidState("busy".into())) };
        let err = with_timeout(Duration::from_secs(1), failing).await.unwrap_err();
        assert!(matches!(err, PilotError::InvalidState(_)));
    }
}
