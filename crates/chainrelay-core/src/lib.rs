//! chainrelay-core: resilient client layer between an application and its
//! blockchain node providers.
//!
//! # Overview
//!
//! Nodes throttle, fail, and answer slowly. [`RpcClient`] shields callers
//! from that while keeping round trips to a minimum:
//!
//! - [`RpcTransport`]: the provider trait every node connection implements
//! - [`ResponseCache`]: TTL cache keyed by method + canonical params
//! - [`Scheduler`]: token-bucket rate limit plus concurrency gate
//! - [`policy`] module: token bucket, concurrency gate, retry policy
//! - [`FallbackChain`]: ordered alternates tried once a provider gives up
//! - [`RpcClient::batch_requests`]: native batching or ordered fan-out
//! - [`TransportError`]: error taxonomy; throttling is the only retried kind

pub mod batch;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod fallback;
pub mod policy;
pub mod request;
pub mod scheduler;
pub mod transport;

pub use cache::{cache_key, ResponseCache};
pub use client::{ClientStats, RpcClient};
pub use config::{CacheScope, ClientConfig, ConfigError};
pub use error::{ErrorKind, TransportError};
pub use fallback::FallbackChain;
pub use request::{
    BatchRequest, BatchResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId, RpcParam,
};
pub use scheduler::Scheduler;
pub use transport::RpcTransport;
