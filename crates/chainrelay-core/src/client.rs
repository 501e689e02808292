//! `RpcClient`: the single entry point callers talk to.
//!
//! Every call flows through:
//! ```text
//! cache lookup → [Scheduler] → provider → [RetryPolicy] → fallbacks → cache store
//! ```
//!
//! All mutable state (token bucket, concurrency gate, cache, fallback list)
//! is owned by the client instance. Two clients never share any of it.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::cache::{cache_key, ResponseCache};
use crate::config::{CacheScope, ClientConfig, ConfigError};
use crate::error::TransportError;
use crate::fallback::FallbackChain;
use crate::policy::{RetryDecision, RetryPolicy};
use crate::scheduler::Scheduler;
use crate::transport::RpcTransport;

/// Point-in-time copy of the client's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClientStats {
    /// Logical calls received (batch items count individually).
    pub requests: u64,
    /// Logical calls answered from the cache.
    pub cache_hits: u64,
    /// Physical provider invocations, retries included.
    pub provider_calls: u64,
    /// Retry sleeps taken.
    pub retries: u64,
    /// Escalations to a fallback provider.
    pub fallbacks: u64,
    /// Logical calls that ended in an error.
    pub failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub(crate) requests: AtomicU64,
    pub(crate) cache_hits: AtomicU64,
    pub(crate) provider_calls: AtomicU64,
    pub(crate) retries: AtomicU64,
    pub(crate) fallbacks: AtomicU64,
    pub(crate) failures: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ClientStats {
        ClientStats {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            provider_calls: self.provider_calls.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Rate-limited, caching, failover RPC client.
///
/// # Example
/// ```rust,no_run
/// # async fn demo(node: std::sync::Arc<dyn chainrelay_core::RpcTransport>) {
/// use chainrelay_core::{ClientConfig, RpcClient};
///
/// let client = RpcClient::new(ClientConfig::default()).unwrap();
/// let block = client.make_request(node.as_ref(), "eth_blockNumber", vec![]).await;
/// # }
/// ```
#[derive(Debug)]
pub struct RpcClient {
    config: ClientConfig,
    pub(crate) cache: ResponseCache,
    scheduler: Scheduler,
    retry: RetryPolicy,
    fallbacks: FallbackChain,
    pub(crate) stats: StatsCounters,
}

impl RpcClient {
    /// Build a client after validating `config`.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let cache = match config.cache_max_entries {
            Some(max) => ResponseCache::with_capacity(max),
            None => ResponseCache::new(),
        };
        Ok(Self {
            cache,
            scheduler: Scheduler::new(
                config.rate_limiter(),
                config.max_concurrent_requests as usize,
                config.request_timeout(),
            ),
            retry: RetryPolicy::new(config.retry()),
            fallbacks: FallbackChain::new(),
            stats: StatsCounters::default(),
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Append a provider to the fallback chain used by every call.
    ///
    /// Intended for setup time; calls already in flight keep the chain they
    /// started with.
    pub fn add_fallback_provider(&self, provider: Arc<dyn RpcTransport>) {
        self.fallbacks.push(provider);
    }

    pub fn fallback_count(&self) -> usize {
        self.fallbacks.len()
    }

    /// Calls currently admitted by the scheduler and not yet settled.
    pub fn in_flight(&self) -> usize {
        self.scheduler.in_flight()
    }

    pub fn stats(&self) -> ClientStats {
        self.stats.snapshot()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Perform one logical call.
    ///
    /// Returns the cached value when fresh. Otherwise the call is admitted by
    /// the scheduler, retried on throttling, and escalated through the
    /// fallback chain. Only successes are cached. When every provider fails
    /// the last provider error is returned as-is.
    pub async fn make_request(
        &self,
        provider: &dyn RpcTransport,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value, TransportError> {
        StatsCounters::bump(&self.stats.requests);
        let key = self.cache_key_for(provider, method, &params);

        if let Some(hit) = key.as_deref().and_then(|k| self.cache.get(k)) {
            StatsCounters::bump(&self.stats.cache_hits);
            tracing::debug!(method, provider = provider.url(), "cache hit");
            return Ok(hit);
        }

        match self.call_with_fallback(provider, method, &params).await {
            Ok(value) => {
                if let Some(key) = key {
                    self.cache.set(key, value.clone(), self.config.cache_ttl());
                }
                Ok(value)
            }
            Err(err) => {
                StatsCounters::bump(&self.stats.failures);
                Err(err)
            }
        }
    }

    /// Like [`make_request`](Self::make_request), deserializing the result.
    pub async fn call<T: DeserializeOwned>(
        &self,
        provider: &dyn RpcTransport,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, TransportError> {
        let value = self.make_request(provider, method, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Cache key for a call, or `None` when caching is disabled.
    pub(crate) fn cache_key_for(
        &self,
        provider: &dyn RpcTransport,
        method: &str,
        params: &[Value],
    ) -> Option<String> {
        if self.config.cache_ttl_ms == 0 {
            return None;
        }
        let key = cache_key(method, params);
        Some(match self.config.cache_scope {
            CacheScope::Client => key,
            CacheScope::Provider => format!("{}|{key}", provider.url()),
        })
    }

    pub(crate) async fn call_with_fallback(
        &self,
        primary: &dyn RpcTransport,
        method: &str,
        params: &[Value],
    ) -> Result<Value, TransportError> {
        match self
            .with_retry(primary, || primary.request(method, params.to_vec()))
            .await
        {
            Ok(value) => Ok(value),
            Err(err) => self.escalate(primary, method, params, err).await,
        }
    }

    /// Walk the fallback chain after `primary` gave up with `last_err`.
    pub(crate) async fn escalate(
        &self,
        primary: &dyn RpcTransport,
        method: &str,
        params: &[Value],
        mut last_err: TransportError,
    ) -> Result<Value, TransportError> {
        for (position, fallback) in self.fallbacks.snapshot().iter().enumerate() {
            StatsCounters::bump(&self.stats.fallbacks);
            tracing::warn!(
                method,
                position,
                provider = fallback.url(),
                error = %last_err,
                "escalating to fallback provider"
            );
            match self
                .with_retry(fallback.as_ref(), || fallback.request(method, params.to_vec()))
                .await
            {
                Ok(value) => return Ok(value),
                Err(err) => last_err = err,
            }
        }

        tracing::error!(
            method,
            provider = primary.url(),
            fallbacks = self.fallbacks.len(),
            error = %last_err,
            "all providers exhausted"
        );
        Err(last_err)
    }

    /// Run `call` against `provider` through the scheduler, retrying
    /// throttled attempts. Each attempt is admitted as a fresh call.
    pub(crate) async fn with_retry<F, Fut, T>(
        &self,
        provider: &dyn RpcTransport,
        mut call: F,
    ) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            StatsCounters::bump(&self.stats.provider_calls);
            let err = match self.scheduler.run(provider.url(), &mut call).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match self.retry.decide(&err, attempt) {
                RetryDecision::Retry(delay) => {
                    StatsCounters::bump(&self.stats.retries);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        provider = provider.url(),
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::Propagate => {
                    if err.is_retryable() {
                        tracing::warn!(
                            attempt,
                            error = %err,
                            provider = provider.url(),
                            "max retries exceeded"
                        );
                    } else {
                        tracing::debug!(
                            attempt,
                            kind = %err.kind(),
                            error = %err,
                            provider = provider.url(),
                            "non-retryable error"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    struct Counting {
        url: &'static str,
        calls: AtomicU32,
        result: Result<Value, TransportError>,
    }

    impl Counting {
        fn ok(url: &'static str, value: Value) -> Self {
            Self {
                url,
                calls: AtomicU32::new(0),
                result: Ok(value),
            }
        }

        fn failing(url: &'static str, err: TransportError) -> Self {
            Self {
                url,
                calls: AtomicU32::new(0),
                result: Err(err),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RpcTransport for Counting {
        async fn request(&self, _method: &str, _params: Vec<Value>) -> Result<Value, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }

        fn url(&self) -> &str {
            self.url
        }
    }

    fn fast_config() -> ClientConfig {
        ClientConfig {
            max_requests_per_second: 1_000,
            max_concurrent_requests: 4,
            retry_attempts: 2,
            retry_delay_ms: 1,
            ..Default::default()
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let err = RpcClient::new(ClientConfig {
            max_requests_per_second: 0,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let client = RpcClient::new(fast_config()).unwrap();
        let node = Counting::failing("a", TransportError::Http("503".into()));
        let err = client.make_request(&node, "eth_blockNumber", vec![]).await.unwrap_err();
        assert!(matches!(err, TransportError::Http(_)));
        assert_eq!(node.calls(), 1);
        assert_eq!(client.stats().failures, 1);
    }

    #[tokio::test]
    async fn caching_disabled_with_zero_ttl() {
        let client = RpcClient::new(ClientConfig {
            cache_ttl_ms: 0,
            ..fast_config()
        })
        .unwrap();
        let node = Counting::ok("a", json!("0x1"));
        client.make_request(&node, "eth_chainId", vec![]).await.unwrap();
        client.make_request(&node, "eth_chainId", vec![]).await.unwrap();
        assert_eq!(node.calls(), 2);
        assert!(client.cache.is_empty());
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let client = RpcClient::new(fast_config()).unwrap();
        let node = Counting::failing("a", TransportError::Http("down".into()));
        let _ = client.make_request(&node, "eth_chainId", vec![]).await;
        let _ = client.make_request(&node, "eth_chainId", vec![]).await;
        assert_eq!(node.calls(), 2);
        assert!(client.cache.is_empty());
    }

    #[tokio::test]
    async fn provider_scope_keeps_entries_apart() {
        let client = RpcClient::new(ClientConfig {
            cache_scope: CacheScope::Provider,
            ..fast_config()
        })
        .unwrap();
        let a = Counting::ok("https://a.example", json!("0xa"));
        let b = Counting::ok("https://b.example", json!("0xb"));
        assert_eq!(client.make_request(&a, "eth_chainId", vec![]).await.unwrap(), json!("0xa"));
        assert_eq!(client.make_request(&b, "eth_chainId", vec![]).await.unwrap(), json!("0xb"));
        assert_eq!(b.calls(), 1);
    }

    #[tokio::test]
    async fn client_scope_shares_entries() {
        let client = RpcClient::new(fast_config()).unwrap();
        let a = Counting::ok("https://a.example", json!("0xa"));
        let b = Counting::ok("https://b.example", json!("0xb"));
        client.make_request(&a, "eth_chainId", vec![]).await.unwrap();
        assert_eq!(client.make_request(&b, "eth_chainId", vec![]).await.unwrap(), json!("0xa"));
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn typed_call_deserializes() {
        let client = RpcClient::new(fast_config()).unwrap();
        let node = Counting::ok("a", json!({"number": "0x10"}));
        #[derive(serde::Deserialize)]
        struct Block {
            number: String,
        }
        let block: Block = client.call(&node, "eth_getBlockByNumber", vec![]).await.unwrap();
        assert_eq!(block.number, "0x10");

        let err = client
            .call::<u64>(&node, "eth_getBlockByNumber", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Deserialization(_)));
    }

    #[tokio::test]
    async fn instances_do_not_share_state() {
        let one = RpcClient::new(fast_config()).unwrap();
        let two = RpcClient::new(fast_config()).unwrap();
        let node = Counting::ok("a", json!("0x1"));
        one.make_request(&node, "eth_chainId", vec![]).await.unwrap();
        two.make_request(&node, "eth_chainId", vec![]).await.unwrap();
        assert_eq!(node.calls(), 2);

        one.add_fallback_provider(Arc::new(Counting::ok("b", json!("0x2"))));
        assert_eq!(one.fallback_count(), 1);
        assert_eq!(two.fallback_count(), 0);
    }
}
