//! Retry-with-backoff for presence store writes.
//!
//! Only `StoreUnavailable` is retried; every other error is returned to
//! the caller on the first attempt. Background retries stop when their
//! cancellation token fires, leaving stale entries to the TTL.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use chathub_core::config::PresenceConfig;
use chathub_core::error::AppError;
use chathub_core::result::AppResult;

use crate::metrics::{EngineMetrics, connections};

/// Exponential backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the second attempt.
    pub initial: Duration,
    /// Upper bound on any single delay.
    pub max: Duration,
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Build the policy from presence configuration.
    pub fn from_config(config: &PresenceConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.retry_initial_backoff_ms),
            max: Duration::from_millis(config.retry_max_backoff_ms),
            max_attempts: config.retry_max_attempts.max(1),
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PresenceConfig::default())
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, runs out
/// of attempts, or `cancel` fires.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut op: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_store_unavailable() || attempt >= policy.max_attempts => {
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                debug!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Store unavailable, retrying"
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        return Err(AppError::store_unavailable(format!(
                            "{operation} cancelled after {attempt} attempts"
                        )));
                    }
                    () = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}

/// Retry `op` on a background task.
///
/// Failures after the last attempt are logged; the presence TTL cleans up
/// whatever the retries could not.
pub fn spawn_retry<F, Fut>(
    policy: RetryPolicy,
    cancel: CancellationToken,
    metrics: Arc<EngineMetrics>,
    operation: &'static str,
    mut op: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = AppResult<()>> + Send + 'static,
{
    connections::record_presence_retry(&metrics);
    tokio::spawn(async move {
        // The inline attempt already failed once; wait before the first retry.
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(policy.initial) => {}
        }

        let result = retry_with_backoff(policy, &cancel, operation, || {
            connections::record_presence_retry(&metrics);
            op()
        })
        .await;

        if let Err(e) = result {
            warn!(operation, error = %e, "Giving up on presence write; TTL will reconcile");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chathub_core::error::ErrorKind;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(400),
            max_attempts,
        }
    }

    #[test]
    fn test_delay_doubles_up_to_cap() {
        let p = policy(10);
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(400));
        assert_eq!(p.delay_for(4), Duration::from_millis(400));
        assert_eq!(p.delay_for(64), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_store_recovers() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = retry_with_backoff(policy(5), &CancellationToken::new(), "register", || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AppError::store_unavailable("down"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let err = retry_with_backoff(policy(5), &CancellationToken::new(), "register", || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(AppError::validation("bad")) }
        })
        .await
        .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let err = retry_with_backoff(policy(3), &CancellationToken::new(), "unregister", || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(AppError::store_unavailable("down")) }
        })
        .await
        .unwrap_err();

        assert!(err.is_store_unavailable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_retry_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let metrics = Arc::new(EngineMetrics::new());
        let task = spawn_retry(
            policy(100),
            cancel.clone(),
            Arc::clone(&metrics),
            "register",
            || async { Err(AppError::store_unavailable("down")) },
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        task.await.unwrap();
        assert!(metrics.snapshot().presence_retries >= 1);
    }
}
