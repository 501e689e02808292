//! Policy engine: the admission and retry building blocks.
//!
//! The policy stack (applied in order for every physical call):
//! ```text
//! Request → [ConcurrencyGate] → [TokenBucket] → [Transport] → [RetryPolicy]
//! ```

pub mod concurrency;
pub mod rate_limiter;
pub mod retry;

pub use concurrency::{ConcurrencyGate, GatePermit};
pub use rate_limiter::{RateLimiterConfig, TokenBucket};
pub use retry::{RetryConfig, RetryDecision, RetryPolicy};
