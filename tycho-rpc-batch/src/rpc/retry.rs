//! Per-call retry with exponential backoff and jitter
//!
//! A call is attempted once and, on failure, retried up to `max_retries` times. Before the retry
//! that follows attempt `n` (0-based) the caller waits `base_delay * 2^n`, shifted by a random
//! jitter of at most ±10%. Only the error of the last attempt is returned.

use std::{fmt::Display, future::Future, time::Duration};

use backoff::{backoff::Backoff, exponential::ExponentialBackoffBuilder, ExponentialBackoff};
use tokio::time::sleep;
use tracing::{debug, trace};

/// Largest relative deviation of a wait from its nominal value (±10%).
const RANDOMIZATION_FACTOR: f64 = 0.1;

/// Bounded retry with jittered exponential backoff.
///
/// Delays grow without a cap: the number of retries is the only bound on how long a call may
/// take.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_retries: usize,
    backoff: ExponentialBackoff,
}

impl Default for RetryPolicy {
    /// Creates a new retry policy with default values:
    /// - Max retries: 10 (11 attempts in total)
    /// - Base delay: 50ms
    fn default() -> Self {
        Self::new(10, Duration::from_millis(50))
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, base_delay: Duration) -> Self {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(base_delay)
            .with_multiplier(2.0)
            .with_randomization_factor(RANDOMIZATION_FACTOR)
            .with_max_interval(Duration::MAX)
            .with_max_elapsed_time(None)
            .build();

        Self { max_retries, backoff }
    }

    /// A policy that gives up after the first failed attempt.
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Retries up to `n` times with a 1ms base delay.
    pub fn n_times(n: usize) -> Self {
        Self::new(n, Duration::from_millis(1))
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn base_delay(&self) -> Duration {
        self.backoff.initial_interval
    }

    /// A fresh backoff sequence; the n-th call to `next_backoff` yields the wait after attempt n.
    pub fn backoff_schedule(&self) -> ExponentialBackoff {
        let mut backoff = self.backoff.clone();
        backoff.reset();
        backoff
    }

    /// Executes `operation`, retrying it on failure.
    pub async fn retry_request<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let first_outcome = operation().await;
        self.retry_after(first_outcome, operation)
            .await
    }

    /// Continues the retry loop for a call whose first attempt was already made elsewhere.
    ///
    /// `first_outcome` counts as attempt 0. Each further attempt is issued through `operation`.
    pub async fn retry_after<F, Fut, T, E>(
        &self,
        first_outcome: Result<T, E>,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut outcome = first_outcome;
        let mut attempts_made = 0;
        let mut backoff = self.backoff_schedule();

        loop {
            match outcome {
                Ok(value) => return Ok(value),
                Err(error) if attempts_made >= self.max_retries => {
                    debug!(attempts = attempts_made + 1, %error, "Retries exhausted");
                    return Err(error);
                }
                Err(error) => {
                    // Without an elapsed time limit the schedule never runs out
                    let wait = backoff
                        .next_backoff()
                        .unwrap_or(backoff.max_interval);
                    trace!(attempt = attempts_made, ?wait, %error, "Scheduling retry");
                    sleep(wait).await;
                    attempts_made += 1;
                    outcome = operation().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use rstest::rstest;
    use tokio::time::Instant;

    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries(), 10);
        assert_eq!(policy.base_delay(), Duration::from_millis(50));

        let schedule = policy.backoff_schedule();
        assert_eq!(schedule.multiplier, 2.0);
        assert_eq!(schedule.randomization_factor, 0.1);
        assert_eq!(schedule.max_elapsed_time, None);
    }

    #[rstest]
    #[case(0, Duration::from_millis(50))]
    #[case(1, Duration::from_millis(100))]
    #[case(4, Duration::from_millis(800))]
    fn test_nominal_delay_doubles(#[case] retries_before: usize, #[case] expected: Duration) {
        let mut schedule = RetryPolicy::default().backoff_schedule();
        for _ in 0..retries_before {
            schedule.next_backoff();
        }
        assert_eq!(schedule.current_interval, expected);
    }

    #[test]
    fn test_random_backoff_stays_within_jitter_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let mut schedule = policy.backoff_schedule();
            for attempts_made in 0..10 {
                let nominal = (Duration::from_millis(50) * 2u32.pow(attempts_made)).as_secs_f64();
                let delay = schedule
                    .next_backoff()
                    .unwrap()
                    .as_secs_f64();
                assert!(delay >= nominal * 0.9 - 1e-6, "{delay} below window of {nominal}");
                assert!(delay <= nominal * 1.1 + 1e-6, "{delay} above window of {nominal}");
            }
        }
    }

    #[test]
    fn test_schedule_restarts_for_every_call() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let mut first = policy.backoff_schedule();
        first.next_backoff();
        first.next_backoff();

        let second = policy.backoff_schedule();
        assert_eq!(second.current_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_delay_saturates_instead_of_overflowing() {
        let mut schedule = RetryPolicy::new(5000, Duration::from_secs(1)).backoff_schedule();
        for _ in 0..200 {
            schedule.next_backoff();
        }
        assert_eq!(schedule.current_interval, Duration::MAX);
        assert!(schedule.next_backoff().unwrap() >= Duration::MAX.mul_f64(0.85));
    }

    #[test]
    fn test_zero_base_delay_never_waits() {
        let mut schedule = RetryPolicy::no_retry().backoff_schedule();
        for _ in 0..64 {
            assert_eq!(schedule.next_backoff(), Some(Duration::ZERO));
        }
    }

    #[rstest]
    #[case::no_retries(0)]
    #[case::one_retry(1)]
    #[case::some_retries(3)]
    #[case::default_retries(10)]
    #[tokio::test(start_paused = true)]
    async fn test_always_failing_call_is_attempted_max_retries_plus_one(
        #[case] max_retries: usize,
    ) {
        let attempts = AtomicUsize::new(0);
        let policy = RetryPolicy::new(max_retries, Duration::from_millis(50));

        let result: Result<(), String> = policy
            .retry_request(|| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("attempt {n} failed")) }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), max_retries + 1);
        // Only the last error is reported
        assert_eq!(result.unwrap_err(), format!("attempt {max_retries} failed"));
    }

    #[rstest]
    #[case(0)]
    #[case(10)]
    #[tokio::test(start_paused = true)]
    async fn test_succeeding_call_is_attempted_once(#[case] max_retries: usize) {
        let attempts = AtomicUsize::new(0);
        let policy = RetryPolicy::new(max_retries, Duration::from_millis(50));

        let result: Result<&str, String> = policy
            .retry_request(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok("0x1") }
            })
            .await;

        assert_eq!(result.unwrap(), "0x1");
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[case::first_retry_succeeds(1, 3)]
    #[case::middle(2, 3)]
    #[case::last_retry_succeeds(3, 3)]
    #[tokio::test(start_paused = true)]
    async fn test_call_failing_k_times_then_succeeding(
        #[case] failures: usize,
        #[case] max_retries: usize,
    ) {
        let attempts = AtomicUsize::new(0);
        let policy = RetryPolicy::new(max_retries, Duration::from_millis(50));

        let result: Result<usize, String> = policy
            .retry_request(|| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < failures {
                        Err("rate limited".to_string())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), failures);
        assert_eq!(attempts.load(Ordering::SeqCst), failures + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_between_attempts_follows_backoff_window() {
        let issued_at = Mutex::new(Vec::new());
        let base = Duration::from_millis(50);
        let policy = RetryPolicy::new(4, base);

        let _: Result<(), String> = policy
            .retry_request(|| {
                issued_at
                    .lock()
                    .unwrap()
                    .push(Instant::now());
                async { Err("unavailable".to_string()) }
            })
            .await;

        let issued_at = issued_at.into_inner().unwrap();
        assert_eq!(issued_at.len(), 5);
        for (i, pair) in issued_at.windows(2).enumerate() {
            let waited = pair[1] - pair[0];
            let nominal = base * 2u32.pow(i as u32);
            // the timer wheel rounds deadlines up to whole milliseconds
            assert!(waited >= nominal.mul_f64(0.9), "retry {i} waited {waited:?}");
            assert!(
                waited <= nominal.mul_f64(1.1) + Duration::from_millis(1),
                "retry {i} waited {waited:?}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_uses_supplied_first_outcome() {
        let attempts = AtomicUsize::new(0);
        let policy = RetryPolicy::n_times(2);

        let result: Result<&str, String> = policy
            .retry_after(Err("batch failed".to_string()), || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok("0x2") }
            })
            .await;

        assert_eq!(result.unwrap(), "0x2");
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_after_success_skips_operation() {
        let attempts = AtomicUsize::new(0);

        let result: Result<u64, String> = RetryPolicy::default()
            .retry_after(Ok(7), || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok(8) }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }
}
