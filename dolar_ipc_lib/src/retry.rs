//! Retry policy applied to each pipeline stage.
//!
//! The pipeline core never sleeps or counts attempts on its own; it hands
//! every stage to [`attempt`] together with a [`RetryPolicy`]. The default
//! policy retries three times with a fixed five-minute delay.

use std::future::Future;
use std::time::Duration;

use crate::error::PipelineError;

/// How many times a failed stage is retried and how long to wait before each retry.
pub trait RetryPolicy: Send + Sync {
    fn max_retries(&self) -> usize;

    /// Delay before retry number `attempt` (1-based).
    fn delay_for_attempt(&self, attempt: usize) -> Duration;
}

/// Bounded retries with the same delay every time.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    pub max_retries: usize,
    pub delay: Duration,
}

impl FixedDelay {
    pub fn new(max_retries: usize, delay: Duration) -> Self {
        Self { max_retries, delay }
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(300))
    }
}

impl RetryPolicy for FixedDelay {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn delay_for_attempt(&self, _attempt: usize) -> Duration {
        self.delay
    }
}

/// Fail on the first error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn max_retries(&self) -> usize {
        0
    }

    fn delay_for_attempt(&self, _attempt: usize) -> Duration {
        Duration::ZERO
    }
}

/// Runs `work` until it succeeds, fails with a non-retryable error, or the
/// policy's retries are used up. The last error is returned as is.
pub async fn attempt<P, T, F, Fut>(policy: &P, label: &str, mut work: F) -> Result<T, PipelineError>
where
    P: RetryPolicy + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let mut retries = 0usize;
    loop {
        match work().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if retries >= policy.max_retries() || !err.is_retryable() {
                    return Err(err);
                }
                retries += 1;
                let delay = policy.delay_for_attempt(retries);
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:.1}s",
                    label,
                    retries,
                    policy.max_retries(),
                    err,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn transient() -> PipelineError {
        PipelineError::TransientFetch(datosgob_api::Error::Transient("timed out".into()))
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let policy = FixedDelay::new(3, Duration::from_secs(300));
        let result = attempt(&policy, "fetch", move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(transient())
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let policy = FixedDelay::new(3, Duration::from_secs(300));
        let started = tokio::time::Instant::now();
        let result: Result<(), _> = attempt(&policy, "fetch", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;
        assert!(matches!(result, Err(PipelineError::TransientFetch(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(started.elapsed() >= Duration::from_secs(900));
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_immediately() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let policy = FixedDelay::new(3, Duration::from_secs(300));
        let result: Result<(), _> = attempt(&policy, "load", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(PipelineError::Validation("bad".into()))
        })
        .await;
        assert!(matches!(result, Err(PipelineError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_retry_runs_once() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: Result<(), _> = attempt(&NoRetry, "fetch", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_policy_is_three_retries_five_minutes_apart() {
        let policy = FixedDelay::default();
        assert_eq!(policy.max_retries(), 3);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(300));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(300));
    }
}
