//! The `RpcTransport` trait: the provider abstraction every call goes through.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// A connection to one node.
///
/// Implementations own their connection handling; the client layer only
/// invokes calls and classifies the outcome.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` for use across Tokio tasks.
///
/// # Object Safety
/// The trait is object-safe and can be stored as `Arc<dyn RpcTransport>`.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Invoke `method` with `params` and return the raw result.
    ///
    /// Throttling must be reported as [`TransportError::RateLimited`] so the
    /// retry policy can recognise it; [`TransportError::from_rpc`] does this
    /// for JSON-RPC error objects.
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError>;

    /// Whether [`send_batch`](Self::send_batch) carries several calls in one
    /// round trip.
    fn supports_batch(&self) -> bool {
        false
    }

    /// Send several requests, tagged with correlation ids, in one round trip.
    ///
    /// Responses may come back in any order.
    async fn send_batch(
        &self,
        _reqs: Vec<JsonRpcRequest>,
    ) -> Result<Vec<JsonRpcResponse>, TransportError> {
        Err(TransportError::BatchUnsupported {
            provider: self.url().to_string(),
        })
    }

    /// Query the chain id of the network this provider is connected to.
    async fn chain_id(&self) -> Result<u64, TransportError> {
        let value = self.request("eth_chainId", vec![]).await?;
        match &value {
            Value::String(s) => u64::from_str_radix(s.trim_start_matches("0x"), 16)
                .map_err(|e| TransportError::Deserialization(format!("chain id {s}: {e}"))),
            Value::Number(n) => n.as_u64().ok_or_else(|| {
                TransportError::Deserialization(format!("chain id out of range: {n}"))
            }),
            other => Err(TransportError::Deserialization(format!(
                "unexpected chain id: {other}"
            ))),
        }
    }

    /// Return the transport's identifier (URL or name).
    fn url(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed(Value);

    #[async_trait]
    impl RpcTransport for Fixed {
        async fn request(&self, _method: &str, _params: Vec<Value>) -> Result<Value, TransportError> {
            Ok(self.0.clone())
        }

        fn url(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn chain_id_from_hex() {
        assert_eq!(Fixed(json!("0x89")).chain_id().await.unwrap(), 137);
    }

    #[tokio::test]
    async fn chain_id_from_number() {
        assert_eq!(Fixed(json!(1)).chain_id().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn chain_id_rejects_garbage() {
        let err = Fixed(json!({"x": 1})).chain_id().await.unwrap_err();
        assert!(matches!(err, TransportError::Deserialization(_)));
    }

    #[tokio::test]
    async fn batch_unsupported_by_default() {
        let provider = Fixed(json!(null));
        assert!(!provider.supports_batch());
        let err = provider.send_batch(vec![]).await.unwrap_err();
        assert!(matches!(err, TransportError::BatchUnsupported { .. }));
    }
}
