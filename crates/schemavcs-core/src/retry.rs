//! Exponential backoff helper for `RecoveryPolicy::RetryWithBackoff` errors.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::EngineError;

const BACKOFF_MS: [u64; 3] = [2000, 4000, 8000];
const MAX_ATTEMPTS: usize = 3;

/// Retries `op` up to `MAX_ATTEMPTS` times with the fixed 2s/4s/8s backoff
/// schedule, stopping early once `op` succeeds or `should_retry` says no.
pub async fn with_backoff<F, Fut, T>(
    should_retry: impl Fn(&EngineError) -> bool,
    mut op: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut last_err = None;
    for (attempt, delay_ms) in BACKOFF_MS.iter().enumerate().take(MAX_ATTEMPTS) {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if should_retry(&e) => {
                warn!(attempt = attempt + 1, delay_ms, error = %e, "retrying after backoff");
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.expect("loop runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_retry() {
        let attempts = AtomicUsize::new(0);
        let result = with_backoff(
            |_| true,
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 1 {
                        Err(EngineError::NetworkError("flaky".to_string()))
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_should_retry_returns_false() {
        let result: Result<(), EngineError> =
            with_backoff(|_| false, || async { Err(EngineError::ValidationError("bad".into())) })
                .await;
        assert!(result.is_err());
    }
}
