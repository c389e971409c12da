//! Bounded retries with exponential backoff.
//!
//! Retries every failure except those whose status is classified as
//! permanent: 400, 401, 403, 500, 502 and 503.
//!
//! Treating 500/502/503 as permanent is unusual (transient server errors are
//! normally what retries exist for). The table is kept as-is on purpose;
//! see DESIGN.md before changing it.

use std::{future::Future, time::Duration};

use tokio::time::Instant;

use crate::error::FetchError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_MAX_DELAY_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    NoRetry,
}

/// Errors that can tell the retry handler whether another attempt makes sense.
pub trait Classify {
    fn retry_decision(&self) -> RetryDecision;
}

pub fn classify_status(status: u16) -> RetryDecision {
    match status {
        400 | 401 | 403 | 500 | 502 | 503 => RetryDecision::NoRetry,
        _ => RetryDecision::Retry,
    }
}

impl Classify for FetchError {
    fn retry_decision(&self) -> RetryDecision {
        self.status().map_or(RetryDecision::Retry, classify_status)
    }
}

/// Terminal result of a retried operation.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
    pub last_attempt_at: Instant,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryHandler {
    policy: RetryPolicy,
}

impl RetryHandler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `operation` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Sleeping between attempts only suspends the calling task.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + std::fmt::Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = operation().await;
            let last_attempt_at = Instant::now();

            let err = match result {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!("Operation succeeded after {} attempts", attempt);
                    }
                    return RetryOutcome { result: Ok(value), attempts: attempt, last_attempt_at };
                }
                Err(err) => err,
            };

            if err.retry_decision() == RetryDecision::NoRetry {
                tracing::debug!("Non-retryable error on attempt {}: {}", attempt, err);
                return RetryOutcome { result: Err(err), attempts: attempt, last_attempt_at };
            }

            if attempt >= max_attempts {
                tracing::error!("All {} attempts exhausted, last error: {}", attempt, err);
                return RetryOutcome { result: Err(err), attempts: attempt, last_attempt_at };
            }

            let delay = self.policy.delay_after(attempt);
            tracing::warn!(
                "Retryable error on attempt {} of {}: {}; waiting {:?}",
                attempt,
                max_attempts,
                err,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn status(code: u16) -> FetchError {
        FetchError::Status { status: code, message: String::new() }
    }

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
        assert_eq!(policy.max_delay, Duration::from_millis(5000));
    }

    #[test]
    fn delay_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_after(4), Duration::from_millis(5000));
        assert_eq!(policy.delay_after(10), Duration::from_millis(5000));
    }

    #[test]
    fn classification_table() {
        for code in [400, 401, 403, 500, 502, 503] {
            assert_eq!(status(code).retry_decision(), RetryDecision::NoRetry, "{code}");
        }
        for code in [404, 408, 429, 504] {
            assert_eq!(status(code).retry_decision(), RetryDecision::Retry, "{code}");
        }
        assert_eq!(
            FetchError::TooManyRequests { retry_after: None }.retry_decision(),
            RetryDecision::Retry
        );
        assert_eq!(FetchError::Network("reset".into()).retry_decision(), RetryDecision::Retry);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt() {
        let calls = &AtomicU32::new(0);
        let handler = RetryHandler::default();

        let outcome = handler
            .execute(move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FetchError::Network("timeout".into()))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn client_error_short_circuits() {
        let calls = &AtomicU32::new(0);
        let start = Instant::now();

        let outcome: RetryOutcome<(), _> = RetryHandler::default()
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(status(400))
            })
            .await;

        assert!(!outcome.succeeded());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_run_sleeps_between_attempts_only() {
        let start = Instant::now();

        let outcome: RetryOutcome<(), _> = RetryHandler::default()
            .execute(|| async { Err(status(429)) })
            .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result.unwrap_err(), status(429));
        // 1000ms + 2000ms, nothing after the final attempt.
        let slept = start.elapsed();
        assert!(slept >= Duration::from_millis(3000), "{slept:?}");
        assert!(slept < Duration::from_millis(3100), "{slept:?}");
        assert_eq!(outcome.last_attempt_at.duration_since(start), slept);
    }
}
