//! Token bucket rate limiter.
//!
//! Tokens accrue continuously at `refill_rate` tokens/second up to
//! `capacity`. Each admission consumes one token and is never refunded.
//! [`TokenBucket::acquire`] suspends until a token is available; waiters are
//! served in arrival order because the state lock is a fair Tokio mutex held
//! across the wait.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum tokens in the bucket.
    pub capacity: f64,
    /// Token refill rate (tokens per second).
    pub refill_rate: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 1.0,
            refill_rate: 10.0,
        }
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Thread-safe token bucket; starts full.
pub struct TokenBucket {
    config: RateLimiterConfig,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: config.capacity,
                last_refill: Instant::now(),
            }),
            config,
        }
    }

    /// Wait for one token and consume it.
    ///
    /// Returns how long the caller was held back.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();
        let mut state = self.state.lock().await;
        let mut waited = false;
        loop {
            self.refill(&mut state);
            if state.tokens >= 1.0 {
                state.tokens -= 1.0;
                return if waited { started.elapsed() } else { Duration::ZERO };
            }
            waited = true;
            let wait = self.deficit_wait(&state, 1.0);
            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limited, waiting for token");
            tokio::time::sleep(wait).await;
        }
    }

    fn deficit_wait(&self, state: &BucketState, cost: f64) -> Duration {
        let deficit = cost - state.tokens;
        if deficit <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(deficit / self.config.refill_rate)
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        let new_tokens = elapsed * self.config.refill_rate;
        state.tokens = (state.tokens + new_tokens).min(self.config.capacity);
        state.last_refill = now;
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("capacity", &self.config.capacity)
            .field("refill_rate", &self.config.refill_rate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_within_capacity() {
        let bucket = TokenBucket::new(RateLimiterConfig {
            capacity: 10.0,
            refill_rate: 1.0,
        });
        for _ in 0..10 {
            assert_eq!(bucket.acquire().await, Duration::ZERO, "should succeed within capacity");
        }
    }

    #[tokio::test]
    async fn waits_once_capacity_is_spent() {
        let bucket = TokenBucket::new(RateLimiterConfig {
            capacity: 3.0,
            refill_rate: 0.0001, // almost no refill
        });
        for _ in 0..3 {
            bucket.acquire().await;
        }
        let fourth = tokio::time::timeout(Duration::from_millis(30), bucket.acquire()).await;
        assert!(fourth.is_err(), "should be rate limited");
    }

    #[tokio::test]
    async fn acquire_waits_for_refill() {
        let bucket = TokenBucket::new(RateLimiterConfig {
            capacity: 1.0,
            refill_rate: 10.0, // one token every 100ms
        });
        assert_eq!(bucket.acquire().await, Duration::ZERO);

        let start = std::time::Instant::now();
        bucket.acquire().await;
        let waited = start.elapsed();
        assert!(
            waited >= Duration::from_millis(90),
            "second token came too early: {waited:?}"
        );
    }

    #[tokio::test]
    async fn tokens_never_go_negative() {
        let bucket = TokenBucket::new(RateLimiterConfig {
            capacity: 2.0,
            refill_rate: 100.0,
        });
        for _ in 0..5 {
            bucket.acquire().await;
            let available = bucket.state.lock().await.tokens;
            assert!(available >= 0.0, "tokens went negative: {available}");
        }
    }
}
