//! Client configuration.
//!
//! Keys are camelCase so the same JSON documents used by web front-ends
//! (`{"maxRequestsPerSecond": 5, "cacheTTL": 1000}`) load unchanged. Every
//! key is optional.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::{RateLimiterConfig, RetryConfig};

/// Errors raised while loading or validating a [`ClientConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether cache entries are shared between providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheScope {
    /// One entry per (method, params), whichever provider answered.
    #[default]
    Client,
    /// Entries are additionally keyed by the provider's url.
    Provider,
}

/// Configuration for [`RpcClient`](crate::RpcClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Token-bucket refill rate (admissions per second).
    pub max_requests_per_second: u32,
    /// Maximum number of unsettled provider calls.
    pub max_concurrent_requests: u32,
    /// Additional attempts after the first failure (throttling only).
    pub retry_attempts: u32,
    /// Pause before the first retry, in milliseconds.
    #[serde(rename = "retryDelay")]
    pub retry_delay_ms: u64,
    /// Cache freshness window in milliseconds; 0 disables caching.
    #[serde(rename = "cacheTTL")]
    pub cache_ttl_ms: u64,
    /// Token-bucket capacity.
    pub rate_burst: u32,
    /// Growth factor applied to the retry delay; 1.0 keeps it fixed.
    pub backoff_multiplier: f64,
    /// Upper bound on the retry delay, in milliseconds.
    #[serde(rename = "maxRetryDelay")]
    pub max_retry_delay_ms: u64,
    /// Fraction of the capped delay, halved, added on top of each retry delay.
    pub retry_jitter: f64,
    /// Per-call timeout in milliseconds; `None` lets calls run forever.
    #[serde(rename = "requestTimeout")]
    pub request_timeout_ms: Option<u64>,
    /// Optional cap on the number of cached entries.
    pub cache_max_entries: Option<usize>,
    pub cache_scope: CacheScope,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_requests_per_second: 10,
            max_concurrent_requests: 5,
            retry_attempts: 3,
            retry_delay_ms: 1_000,
            cache_ttl_ms: 5_000,
            rate_burst: 1,
            backoff_multiplier: 1.0,
            max_retry_delay_ms: 30_000,
            retry_jitter: 0.0,
            request_timeout_ms: Some(30_000),
            cache_max_entries: None,
            cache_scope: CacheScope::Client,
        }
    }
}

impl ClientConfig {
    /// Parse a JSON document; missing keys take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Check the invariants the scheduler and retry policy rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_requests_per_second == 0 {
            return Err(ConfigError::Invalid(
                "maxRequestsPerSecond must be greater than 0".into(),
            ));
        }
        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::Invalid(
                "maxConcurrentRequests must be greater than 0".into(),
            ));
        }
        if self.rate_burst == 0 {
            return Err(ConfigError::Invalid("rateBurst must be greater than 0".into()));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "backoffMultiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.retry_jitter) {
            return Err(ConfigError::Invalid(format!(
                "retryJitter must be within 0.0..=1.0, got {}",
                self.retry_jitter
            )));
        }
        if let Some(0) = self.cache_max_entries {
            return Err(ConfigError::Invalid(
                "cacheMaxEntries must be greater than 0 when set".into(),
            ));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub(crate) fn rate_limiter(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            capacity: f64::from(self.rate_burst),
            refill_rate: f64::from(self.max_requests_per_second),
        }
    }

    pub(crate) fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.retry_attempts,
            initial_backoff: Duration::from_millis(self.retry_delay_ms),
            max_backoff: Duration::from_millis(self.max_retry_delay_ms.max(self.retry_delay_ms)),
            multiplier: self.backoff_multiplier,
            jitter_fraction: self.retry_jitter,
        }
    }
}
