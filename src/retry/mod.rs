//! Bounded retry with exponential backoff.
//!
//! Every stage that calls an external capability goes through
//! [`with_retry`].  The wrapper only retries failures the error itself
//! reports as recoverable (see [`Recoverable`]); authentication and
//! malformed-request errors fail fast on the first attempt.  The final
//! error is always propagated unchanged.

use std::future::Future;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Recoverable
// ---------------------------------------------------------------------------

/// Classification hook implemented by every subsystem error.
///
/// `true` means the failure is transient (rate limit, network timeout,
/// 5xx) and worth another attempt; `false` means retrying cannot help
/// (bad credentials, malformed request, upstream rejection).
pub trait Recoverable {
    fn is_recoverable(&self) -> bool;
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Attempt bound and backoff schedule for [`with_retry`].
///
/// The delay before attempt `n + 1` is `base_delay * multiplier^(n - 1)`,
/// so with the defaults (4 attempts, 1 s base, ×2) a fully failing
/// operation waits 1 s, 2 s and 4 s between its four attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first (minimum 1).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Factor applied to the delay after each failed attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that performs exactly one attempt (no retries).
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// with_retry
// ---------------------------------------------------------------------------

/// Run `op` under `policy`, retrying recoverable failures with
/// exponentially increasing delay.
///
/// Emits one log event per attempt so operators can see retries in the
/// run's trace.  Returns the first success, the first non-recoverable
/// error, or — after exhausting `max_attempts` — the last error
/// unchanged.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    E: Recoverable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.base_delay;

    for attempt in 1..=max_attempts {
        log::debug!("{label}: attempt {attempt}/{max_attempts}");

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_recoverable() => {
                log::warn!("{label}: non-recoverable error on attempt {attempt}: {err}");
                return Err(err);
            }
            Err(err) if attempt == max_attempts => {
                log::warn!("{label}: attempt {attempt}/{max_attempts} failed: {err} (giving up)");
                return Err(err);
            }
            Err(err) => {
                log::warn!(
                    "{label}: attempt {attempt}/{max_attempts} failed: {err} (retrying in {delay:?})"
                );
                tokio::time::sleep(delay).await;
                delay = delay.mul_f64(policy.multiplier);
            }
        }
    }

    unreachable!("with_retry loop always returns inside the final attempt")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    // -----------------------------------------------------------------------
    // Test error
    // -----------------------------------------------------------------------

    #[derive(Debug, PartialEq)]
    struct TestError {
        message: &'static str,
        recoverable: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl Recoverable for TestError {
        fn is_recoverable(&self) -> bool {
            self.recoverable
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
        }
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn success_on_first_attempt_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<u32, TestError> = with_retry(&fast_policy(4), "test", move || {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recoverable_failure_is_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<&str, TestError> = with_retry(&fast_policy(4), "test", move || {
            let calls = Arc::clone(&calls_clone);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(TestError {
                        message: "transient",
                        recoverable: true,
                    })
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    /// With `max_attempts = N` the operation runs at most N times and the
    /// final error surfaces unchanged.
    #[tokio::test]
    async fn exhausted_attempts_surface_last_error_unchanged() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<(), TestError> = with_retry(&fast_policy(3), "test", move || {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError {
                    message: "still down",
                    recoverable: true,
                })
            }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.message, "still down");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_recoverable_error_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<(), TestError> = with_retry(&fast_policy(5), "test", move || {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError {
                    message: "bad credentials",
                    recoverable: false,
                })
            }
        })
        .await;

        assert_eq!(result.unwrap_err().message, "bad credentials");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn max_attempts_zero_is_clamped_to_one() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<(), TestError> = with_retry(&fast_policy(0), "test", move || {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError {
                    message: "boom",
                    recoverable: true,
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_policy_matches_documented_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert!((policy.multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn none_policy_performs_a_single_attempt() {
        assert_eq!(RetryPolicy::none().max_attempts, 1);
    }
}
