//! Transport-level error types and their classification.

use thiserror::Error;

use crate::request::JsonRpcError;

/// JSON-RPC error codes providers use to signal throttling.
const THROTTLE_CODES: &[i64] = &[-32005, -32029, 429];

/// Message fragments providers use to signal throttling when they reuse a
/// generic error code.
const THROTTLE_MARKERS: &[&str] = &[
    "rate limit",
    "too many requests",
    "rate exceeded",
    "compute units",
    "throttl",
];

/// How the retry policy treats an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The provider is temporarily rejecting calls; worth retrying.
    Throttled,
    /// Anything else; escalated straight to the fallback chain.
    Permanent,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Throttled => write!(f, "throttled"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// Errors that can occur during an RPC call.
///
/// The façade surfaces these unchanged, so callers can match on the variant
/// a provider produced.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, non-2xx status, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// The provider reported an over-rate condition.
    #[error("Rate limit exceeded (provider: {provider}): {message}")]
    RateLimited { provider: String, message: String },

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The provider has no batch entry point.
    #[error("Provider {provider} does not support batch requests")]
    BatchUnsupported { provider: String },

    /// A batch response carried no entry for this correlation id.
    #[error("No response for batch request id {id}")]
    MissingBatchResponse { id: u64 },

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// An unexpected error.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Deserialization(err.to_string())
    }
}

impl TransportError {
    /// Classify a JSON-RPC error object returned by `provider`.
    ///
    /// Nodes disagree on how they report throttling, so both the error code
    /// and the message are inspected.
    pub fn from_rpc(provider: &str, err: JsonRpcError) -> Self {
        let message = err.message.to_lowercase();
        let throttled = THROTTLE_CODES.contains(&err.code)
            || THROTTLE_MARKERS.iter().any(|m| message.contains(m));
        if throttled {
            Self::RateLimited {
                provider: provider.to_string(),
                message: err.message,
            }
        } else {
            Self::Rpc(err)
        }
    }

    /// Returns the retry classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited { .. } => ErrorKind::Throttled,
            _ => ErrorKind::Permanent,
        }
    }

    /// Returns `true` if this error is worth retrying against the same provider.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Throttled
    }

    /// Returns `true` if this is a node-side execution error.
    pub fn is_execution_error(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc_err(code: i64, message: &str) -> JsonRpcError {
        JsonRpcError {
            code,
            message: message.into(),
            data: None,
        }
    }

    #[test]
    fn throttle_code_is_rate_limited() {
        let err = TransportError::from_rpc("node-a", rpc_err(-32005, "limit"));
        assert_eq!(err.kind(), ErrorKind::Throttled);
        assert!(err.is_retryable());
    }

    #[test]
    fn throttle_message_is_rate_limited() {
        let err = TransportError::from_rpc("node-a", rpc_err(-32000, "Too Many Requests"));
        match err {
            TransportError::RateLimited { provider, .. } => assert_eq!(provider, "node-a"),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn execution_error_stays_rpc() {
        let err = TransportError::from_rpc("node-a", rpc_err(-32000, "execution reverted"));
        assert!(err.is_execution_error());
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }

    #[test]
    fn only_throttling_is_retryable() {
        assert!(!TransportError::Http("connection refused".into()).is_retryable());
        assert!(!TransportError::Timeout { ms: 100 }.is_retryable());
        assert!(TransportError::RateLimited {
            provider: "x".into(),
            message: "slow down".into(),
        }
        .is_retryable());
    }
}
