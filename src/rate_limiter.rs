use crate::error::ConfigError;
use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Rolling-window rate limiter shared by every dispatch worker.
///
/// Grants at most `calls_per_period` permits inside any window of length
/// `period`. The grant log is the only state mutated by several workers, so
/// every read-evict-grant runs under one lock. Waiting happens outside the lock.
#[derive(Debug)]
pub struct RateLimiter {
    calls_per_period: NonZeroU32,
    period: Duration,
    grants: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(calls_per_period: NonZeroU32, period: Duration) -> Self {
        Self {
            calls_per_period,
            period,
            grants: Mutex::new(VecDeque::with_capacity(calls_per_period.get() as usize)),
        }
    }

    /// Build a limiter from raw configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if `calls_per_period` is zero or `period_seconds` is not a
    /// positive, finite number.
    pub fn from_config(calls_per_period: u32, period_seconds: f64) -> Result<Self, ConfigError> {
        let calls = NonZeroU32::new(calls_per_period).ok_or(ConfigError::NotPositive {
            field: "calls_per_period",
        })?;
        if !(period_seconds.is_finite() && period_seconds > 0.0) {
            return Err(ConfigError::NotPositive {
                field: "period_seconds",
            });
        }
        Ok(Self::new(calls, Duration::from_secs_f64(period_seconds)))
    }

    #[must_use]
    pub const fn calls_per_period(&self) -> u32 {
        self.calls_per_period.get()
    }

    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Wait until a permit is available, then take it.
    pub async fn acquire(&self) {
        loop {
            let wait = match self.try_acquire() {
                Ok(()) => return,
                Err(wait) => wait,
            };
            warn!(
                sleep_secs = wait.as_secs_f64(),
                "Rate limit reached. Sleeping for {:.2} seconds",
                wait.as_secs_f64()
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Take a permit if one is free right now.
    ///
    /// # Errors
    ///
    /// On refusal returns how long until the oldest grant leaves the window.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut grants = self.grants.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        self.evict(&mut grants, now);

        if grants.len() < self.calls_per_period.get() as usize {
            grants.push_back(now);
            debug!(in_window = grants.len(), "Rate limit permit granted");
            return Ok(());
        }

        // Full window: the front entry is the oldest grant still counted.
        let oldest = grants.front().copied().unwrap_or(now);
        let wait = (oldest + self.period).saturating_duration_since(now);
        Err(wait.max(Duration::from_millis(1)))
    }

    /// Number of grants currently inside the window.
    #[must_use]
    pub fn in_window(&self) -> usize {
        let mut grants = self.grants.lock().unwrap_or_else(PoisonError::into_inner);
        self.evict(&mut grants, Instant::now());
        grants.len()
    }

    fn evict(&self, grants: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = grants.front() {
            if now.saturating_duration_since(oldest) >= self.period {
                grants.pop_front();
            } else {
                break;
            }
        }
    }
}
