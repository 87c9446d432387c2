//! Retry helper for single network calls

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{CogVideoError, Result};

/// How often and how patiently a call is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Run `operation` until it succeeds, fails with an error `retryable` rejects,
/// or `policy.max_attempts` attempts have failed.
///
/// Exhausting the attempts yields [`CogVideoError::RetriesExhausted`] wrapping
/// the last failure.
pub async fn retry<T, F, Fut, P>(policy: &RetryPolicy, retryable: P, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&CogVideoError) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !retryable(&e) => return Err(e),
            Err(e) if attempt >= max_attempts => {
                return Err(CogVideoError::RetriesExhausted {
                    attempts: max_attempts,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                warn!(
                    "🔁 Network error, retry {} of {} in {:?}: {}",
                    attempt,
                    max_attempts - 1,
                    policy.delay,
                    e
                );
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}

/// [`retry`] with the default transient-error classification
pub async fn retry_transient<T, F, Fut>(policy: &RetryPolicy, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry(policy, CogVideoError::is_transient, operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    fn network_error() -> CogVideoError {
        CogVideoError::network(
            "poll",
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer"),
        )
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result = retry_transient(&fast_policy(5), || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= 2 {
                Err(network_error())
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<()> = retry_transient(&fast_policy(4), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(network_error())
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
        match err {
            CogVideoError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert!(last.to_string().contains("reset by peer"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_rejections_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<()> = retry_transient(&fast_policy(3), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CogVideoError::ApiRejection {
                operation: "Submit".into(),
                status: 400,
                api_status: Some(1),
                api_message: Some("bad prompt".into()),
                body: "{}".into(),
            })
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().http_status(), Some(400));
    }

    #[tokio::test]
    async fn test_custom_predicate() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        // Never retry anything
        let result: Result<()> = retry(&fast_policy(3), |_| false, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(network_error())
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(CogVideoError::Network { .. })));
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result = retry_transient(&fast_policy(0), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, CogVideoError>("done")
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
