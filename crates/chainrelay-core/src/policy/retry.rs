//! Retry policy: fixed delay by default, exponential when a multiplier is set.
//!
//! Only throttling errors are retried. Everything else propagates on the
//! first failure so the fallback chain can take over.

use std::time::Duration;

use crate::error::TransportError;

/// Configuration for the retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting the first try).
    pub max_retries: u32,
    /// Initial backoff delay.
    pub initial_backoff: Duration,
    /// Maximum backoff delay (caps exponential growth).
    pub max_backoff: Duration,
    /// Multiplier applied to backoff on each retry; 1.0 keeps it fixed.
    pub multiplier: f64,
    /// Add `jitter_fraction * backoff / 2` on top of each delay (0.0 = no jitter).
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1_000),
            max_backoff: Duration::from_secs(30),
            multiplier: 1.0,
            jitter_fraction: 0.0,
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given delay, then re-enter admission.
    Retry(Duration),
    /// Give up on this provider.
    Propagate,
}

/// Stateless retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Decide what follows the `attempt`-th failure (1-based) with `err`.
    pub fn decide(&self, err: &TransportError, attempt: u32) -> RetryDecision {
        if !err.is_retryable() {
            return RetryDecision::Propagate;
        }
        match self.next_delay(attempt) {
            Some(delay) => RetryDecision::Retry(delay),
            None => RetryDecision::Propagate,
        }
    }

    /// Returns the delay before the `attempt`-th retry (1-based).
    /// Returns `None` if `attempt` exceeds `max_retries`.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.config.max_retries {
            return None;
        }
        let base_ms = self.config.initial_backoff.as_millis() as f64
            * self.config.multiplier.powi((attempt - 1) as i32);
        let cap_ms = self.config.max_backoff.as_millis() as f64;
        let capped = base_ms.min(cap_ms);

        let jitter_ms = capped * self.config.jitter_fraction * 0.5;
        let total_ms = (capped + jitter_ms) as u64;

        Some(Duration::from_millis(total_ms))
    }

    /// Total attempts a single provider gets for one logical call.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_retries + 1
    }
}
