//! HTTP JSON-RPC provider backed by `reqwest`.
//!
//! This is a plain transport: it sends one request (or one JSON array for a
//! batch) and classifies the outcome. Rate limiting, retries, caching and
//! failover live in `chainrelay_core::RpcClient`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use chainrelay_core::error::TransportError;
use chainrelay_core::request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use chainrelay_core::transport::RpcTransport;

/// Configuration for `HttpRpcClient`.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Connection + response timeout enforced by reqwest.
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP JSON-RPC provider for one endpoint.
#[derive(Debug)]
pub struct HttpRpcClient {
    url: String,
    http: reqwest::Client,
    request_timeout: Duration,
    next_id: AtomicU64,
}

impl HttpRpcClient {
    /// Create a client for the given JSON-RPC endpoint URL.
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            http,
            request_timeout: config.request_timeout,
            next_id: AtomicU64::new(1),
        })
    }

    /// Create with default configuration.
    pub fn default_for(url: impl Into<String>) -> Result<Self, TransportError> {
        Self::new(url, HttpClientConfig::default())
    }

    async fn post<B, R>(&self, body: &B) -> Result<R, TransportError>
    where
        B: serde::Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let resp = self
            .http
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        ms: self.request_timeout.as_millis() as u64,
                    }
                } else {
                    TransportError::Http(e.to_string())
                }
            })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(&self.url, status, &body));
        }

        resp.json::<R>()
            .await
            .map_err(|e| TransportError::Deserialization(e.to_string()))
    }
}

/// Map a non-2xx HTTP status to a transport error.
pub(crate) fn status_error(url: &str, status: u16, body: &str) -> TransportError {
    if status == 429 {
        TransportError::RateLimited {
            provider: url.to_string(),
            message: format!("HTTP 429: {body}"),
        }
    } else {
        TransportError::Http(format!("HTTP {status}: {body}"))
    }
}

/// Turn a single JSON-RPC response into the call outcome.
pub(crate) fn response_outcome(url: &str, resp: JsonRpcResponse) -> Result<Value, TransportError> {
    resp.into_result()
        .map_err(|err| TransportError::from_rpc(url, err))
}

/// Decode a batch reply. Nodes that reject a whole batch answer with a single
/// error object instead of an array.
pub(crate) fn batch_outcome(url: &str, body: Value) -> Result<Vec<JsonRpcResponse>, TransportError> {
    match body {
        Value::Array(_) => Ok(serde_json::from_value(body)?),
        Value::Object(mut obj) => match obj.remove("error") {
            Some(err) => {
                let err: JsonRpcError = serde_json::from_value(err)?;
                Err(TransportError::from_rpc(url, err))
            }
            None => Err(TransportError::Deserialization(
                "batch reply is an object without an error".into(),
            )),
        },
        other => Err(TransportError::Deserialization(format!(
            "unexpected batch reply: {other}"
        ))),
    }
}

#[async_trait]
impl RpcTransport for HttpRpcClient {
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);
        tracing::trace!(url = %self.url, id, method, "POST");
        let resp: JsonRpcResponse = self.post(&req).await?;
        response_outcome(&self.url, resp)
    }

    fn supports_batch(&self) -> bool {
        true
    }

    /// True HTTP batch: send all requests as a JSON array in one HTTP call.
    async fn send_batch(
        &self,
        reqs: Vec<JsonRpcRequest>,
    ) -> Result<Vec<JsonRpcResponse>, TransportError> {
        if reqs.is_empty() {
            return Ok(vec![]);
        }
        tracing::trace!(url = %self.url, count = reqs.len(), "POST batch");
        let body: Value = self.post(&reqs).await?;
        batch_outcome(&self.url, body)
    }

    fn url(&self) -> &str {
        &self.url
    }
}
