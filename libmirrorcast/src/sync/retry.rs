//! Bounded retry with a fixed delay

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{MirrorcastError, PlatformError, Result};
use crate::sync::shutdown::Shutdown;

/// How often and how patiently to retry a platform call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries + 1
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out
///
/// Only transient errors (network trouble, rate limits) are retried. A
/// shutdown request during the delay ends the retries early with the last
/// error.
pub async fn retry<T, F, Fut>(
    policy: RetryPolicy,
    shutdown: &Shutdown,
    operation: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts();

    for attempt in 1..=max_attempts {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    info!("{} succeeded on attempt {}", operation, attempt);
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                warn!(
                    "Transient error during {} (attempt {}/{}): {}. Retrying in {:?}",
                    operation, attempt, max_attempts, e, policy.delay
                );
                if !shutdown.sleep(policy.delay).await {
                    warn!("Shutdown requested, giving up on {}", operation);
                    return Err(e);
                }
            }
            Err(e) => {
                if attempt == max_attempts && e.is_transient() {
                    warn!("{} failed after {} attempts: {}", operation, max_attempts, e);
                }
                return Err(e);
            }
        }
    }

    Err(MirrorcastError::from(PlatformError::Posting(format!(
        "{} failed after {} attempts",
        operation, max_attempts
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn quick(retries: u32) -> RetryPolicy {
        RetryPolicy::new(retries, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry(quick(3), &Shutdown::new(), "post", || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(MirrorcastError::from(PlatformError::Network("reset".to_string())))
                } else {
                    Ok("id-1".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "id-1");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<String> = retry(quick(2), &Shutdown::new(), "post", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(MirrorcastError::from(PlatformError::RateLimit("429".to_string())))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<String> = retry(quick(5), &Shutdown::new(), "post", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(MirrorcastError::from(PlatformError::Validation("too long".to_string())))
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(MirrorcastError::Platform(PlatformError::Validation(_)))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_means_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<String> = retry(quick(0), &Shutdown::new(), "post", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(MirrorcastError::from(PlatformError::Network("down".to_string())))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_retry_delay() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let policy = RetryPolicy::new(3, Duration::from_secs(60));
        let result: Result<String> = retry(policy, &shutdown, "post", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(MirrorcastError::from(PlatformError::Network("down".to_string())))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
