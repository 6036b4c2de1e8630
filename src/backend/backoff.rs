//! Rate-limit retry schedule with exponential backoff.
//!
//! [`BackoffConfig`] controls how a throttled call (HTTP 429) is retried.
//! Only rate-limit failures are retried; every other backend error surfaces
//! on the first attempt.

use std::time::Duration;

/// Configuration for rate-limit retry with exponential backoff.
///
/// The default schedule makes at most 3 attempts and waits `2^attempt`
/// seconds after failed attempt `attempt` (1-indexed): 2 s, then 4 s.
///
/// # Example
///
/// ```
/// use report_pipeline::backend::BackoffConfig;
/// use std::time::Duration;
///
/// let config = BackoffConfig::rate_limit();
/// assert_eq!(config.max_attempts, 3);
/// assert_eq!(config.delay_after_attempt(1), Duration::from_secs(2));
/// assert_eq!(config.delay_after_attempt(2), Duration::from_secs(4));
/// ```
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Total attempts, counting the first call. Minimum 1.
    pub max_attempts: u32,

    /// Base of the exponential schedule. Default: 2 seconds.
    /// Delay after attempt `n` is `base_delay * multiplier^(n-1)`.
    pub base_delay: Duration,

    /// Default: 2.0.
    pub multiplier: f64,

    /// Upper bound on a single wait. Default: 60 seconds.
    pub max_delay: Duration,

    /// Default: [`JitterStrategy::None`], so waits are exact.
    pub jitter: JitterStrategy,

    /// Use the provider's `Retry-After` hint instead of the schedule when
    /// one is sent. Default: `false`.
    pub respect_retry_after: bool,
}

/// Jitter applied to each computed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    /// Delay is exactly the calculated value.
    None,

    /// Random value in `[0, calculated_delay]`.
    Full,

    /// `calculated_delay/2 + random in [0, calculated_delay/2]`.
    Equal,
}

impl BackoffConfig {
    /// 3 attempts, 2 s base, doubling, no jitter.
    pub fn rate_limit() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: JitterStrategy::None,
            respect_retry_after: false,
        }
    }

    /// A single attempt; rate limits surface immediately.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::rate_limit()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Wait after failed attempt `attempt` (1-indexed) before the next one.
    ///
    /// The base delay is `base_delay * multiplier^(attempt-1)`, capped at
    /// `max_delay`. Jitter is then applied according to the configured strategy.
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let base = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
            JitterStrategy::Equal => capped / 2.0 + fastrand::f64() * (capped / 2.0),
        };

        Duration::from_secs_f64(jittered)
    }

    /// Pick the wait before the next attempt, honoring `Retry-After` when
    /// configured to.
    pub fn next_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) if self.respect_retry_after => hint.min(self.max_delay),
            _ => self.delay_after_attempt(attempt),
        }
    }

    /// Sum of every wait the schedule can impose before giving up.
    pub fn worst_case_wait(&self) -> Duration {
        (1..self.max_attempts.max(1))
            .map(|attempt| match self.jitter {
                JitterStrategy::None => self.delay_after_attempt(attempt),
                _ => {
                    let exponent = attempt.saturating_sub(1) as i32;
                    let base = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
                    Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()))
                }
            })
            .sum()
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::rate_limit()
    }
}
