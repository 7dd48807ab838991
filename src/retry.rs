//! Bounded retry with exponential backoff.
//!
//! Only failures whose [`ErrorKind`](crate::error::ErrorKind) is transient are
//! retried. The delay before retry `k` (zero-based) is `base_delay * 2^k`,
//! optionally stretched by a non-negative jitter so it never undershoots.

use crate::error::{ConfigError, SendError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// One failed attempt and the pause scheduled after it.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryAttempt {
    /// 1-based attempt number
    pub attempt_number: u32,
    /// Backoff before the next attempt, `None` when no further attempt follows
    pub delay: Option<Duration>,
    pub error: SendError,
}

/// Terminal state of one retried action.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, SendError>,
    pub attempts: u32,
    pub history: Vec<RetryAttempt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    jitter_factor: f64,
}

impl RetryPolicy {
    /// Create a policy without jitter.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_delay` is zero.
    pub fn new(max_retries: u32, base_delay: Duration) -> Result<Self, ConfigError> {
        if base_delay.is_zero() {
            return Err(ConfigError::NotPositive {
                field: "base_delay_seconds",
            });
        }
        Ok(Self {
            max_retries,
            base_delay,
            jitter_factor: 0.0,
        })
    }

    /// Add up to `factor * delay` of random extra wait to each backoff.
    ///
    /// # Errors
    ///
    /// Returns an error if `factor` is outside `[0, 1]`.
    pub fn with_jitter(mut self, factor: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&factor) {
            return Err(ConfigError::OutOfRange {
                field: "jitter_factor",
                value: factor.to_string(),
            });
        }
        self.jitter_factor = factor;
        Ok(self)
    }

    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Deterministic part of the backoff before retry `retry_index` (0-based).
    ///
    /// Saturates at [`Duration::MAX`] rather than wrapping or shrinking.
    #[must_use]
    pub fn backoff(&self, retry_index: u32) -> Duration {
        2_u32
            .checked_pow(retry_index)
            .map_or(Duration::MAX, |multiplier| self.base_delay.saturating_mul(multiplier))
    }

    fn delay_with_jitter(&self, retry_index: u32) -> Duration {
        let delay = self.backoff(retry_index);
        if self.jitter_factor > 0.0 {
            let extra = rand::thread_rng().gen_range(0.0..=self.jitter_factor);
            let extra = Duration::try_from_secs_f64(delay.as_secs_f64() * extra).unwrap_or(Duration::MAX);
            delay.saturating_add(extra)
        } else {
            delay
        }
    }

    /// Run `action` until it succeeds, fails permanently, or retries run out.
    ///
    /// Cancellation is only observed between attempts: a started attempt always
    /// runs to completion, but no new one starts once `cancel` fires.
    pub async fn execute<T, F, Fut>(&self, mut action: F, cancel: &CancellationToken) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, SendError>>,
    {
        let mut history = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match action(attempt).await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                        history,
                    }
                }
                Err(err) => err,
            };

            let retry_index = attempt - 1;
            if !err.is_transient() || retry_index >= self.max_retries {
                error!(attempt, kind = %err.kind, error = %err.message, "Attempt failed, giving up");
                history.push(RetryAttempt {
                    attempt_number: attempt,
                    delay: None,
                    error: err.clone(),
                });
                return RetryOutcome {
                    result: Err(err),
                    attempts: attempt,
                    history,
                };
            }

            let delay = self.delay_with_jitter(retry_index);
            warn!(
                attempt,
                kind = %err.kind,
                error = %err.message,
                "Attempt failed. Retrying in {:.2} seconds...",
                delay.as_secs_f64()
            );
            history.push(RetryAttempt {
                attempt_number: attempt,
                delay: Some(delay),
                error: err.clone(),
            });

            tokio::select! {
                () = cancel.cancelled() => {
                    warn!(attempt, "Run cancelled, not retrying");
                    return RetryOutcome {
                        result: Err(err),
                        attempts: attempt,
                        history,
                    };
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            jitter_factor: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::cell::Cell;
    use tokio::time::Instant;

    fn policy(max_retries: u32, base_secs: u64) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_secs(base_secs)).unwrap()
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = policy(5, 1);
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_never_shrinks_for_large_indices() {
        let policy = policy(64, 1);
        assert_eq!(policy.backoff(21), Duration::from_secs(1 << 21));
        assert_eq!(policy.backoff(31), Duration::from_secs(1 << 31));
        assert_eq!(policy.backoff(32), Duration::MAX);
        assert_eq!(policy.backoff(63), Duration::MAX);
        for k in 1..64 {
            assert!(policy.backoff(k) >= policy.backoff(k - 1));
        }

        let jittered = policy.with_jitter(1.0).unwrap();
        assert_eq!(jittered.delay_with_jitter(40), Duration::MAX);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(RetryPolicy::new(3, Duration::ZERO).is_err());
        assert!(policy(3, 1).with_jitter(1.5).is_err());
        assert!(policy(3, 1).with_jitter(-0.1).is_err());
        assert!(policy(3, 1).with_jitter(0.25).is_ok());
    }

    #[test]
    fn test_jitter_never_undershoots() {
        let policy = policy(3, 1).with_jitter(0.5).unwrap();
        for k in 0..4 {
            let delay = policy.delay_with_jitter(k);
            assert!(delay >= policy.backoff(k));
            assert!(delay <= policy.backoff(k).mul_f64(1.5));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let outcome = policy(3, 1)
            .execute(
                |_| {
                    calls.set(calls.get() + 1);
                    let n = calls.get();
                    async move {
                        if n < 3 {
                            Err(SendError::new(ErrorKind::Connection, "reset"))
                        } else {
                            Ok(n)
                        }
                    }
                },
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.result, Ok(3));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.history.len(), 2);
        assert_eq!(outcome.history[1].delay, Some(Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_exhausts_retries() {
        let start = Instant::now();
        let outcome: RetryOutcome<()> = policy(3, 1)
            .execute(
                |_| async { Err(SendError::new(ErrorKind::TemporaryRejection, "421 busy")) },
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.attempts, 4);
        assert_eq!(outcome.result.unwrap_err().kind, ErrorKind::TemporaryRejection);
        assert!(start.elapsed() >= Duration::from_secs(7));
        assert_eq!(outcome.history.last().unwrap().delay, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_is_not_retried() {
        let start = Instant::now();
        let outcome: RetryOutcome<()> = policy(3, 1)
            .execute(
                |_| async { Err(SendError::new(ErrorKind::InvalidAddress, "553 bad mailbox")) },
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.result.unwrap_err().kind, ErrorKind::InvalidAddress);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_means_single_attempt() {
        let outcome: RetryOutcome<()> = policy(0, 1)
            .execute(
                |_| async { Err(SendError::new(ErrorKind::Timeout, "timed out")) },
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_further_retries() {
        let cancel = CancellationToken::new();
        let outcome: RetryOutcome<()> = policy(5, 10)
            .execute(
                |attempt| {
                    let cancel = cancel.clone();
                    async move {
                        if attempt == 1 {
                            cancel.cancel();
                        }
                        Err(SendError::new(ErrorKind::Connection, "reset"))
                    }
                },
                &cancel,
            )
            .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.result.unwrap_err().kind, ErrorKind::Connection);
    }
}
