//! Batch aggregator.
//!
//! Providers that support batching get one physical round trip carrying every
//! uncached request, tagged with its input position as the correlation id.
//! Other providers get one independent `make_request` per item, run
//! concurrently. Either way the output has one entry per input, in input
//! order.
//!
//! A native batch that fails as a whole sends each pending item down the
//! fallback chain. Items the node throttled are resent individually.

use std::collections::HashMap;

use futures::future::join_all;

use crate::client::{RpcClient, StatsCounters};
use crate::error::TransportError;
use crate::request::{BatchRequest, BatchResult, JsonRpcRequest, JsonRpcResponse};
use crate::transport::RpcTransport;

impl RpcClient {
    /// Perform several logical calls, returning outcomes at matching positions.
    pub async fn batch_requests(
        &self,
        provider: &dyn RpcTransport,
        requests: Vec<BatchRequest>,
    ) -> Vec<BatchResult> {
        if requests.is_empty() {
            return Vec::new();
        }
        if provider.supports_batch() {
            self.batch_native(provider, &requests).await
        } else {
            self.batch_fan_out(provider, &requests).await
        }
    }

    async fn batch_fan_out(
        &self,
        provider: &dyn RpcTransport,
        requests: &[BatchRequest],
    ) -> Vec<BatchResult> {
        tracing::debug!(
            provider = provider.url(),
            count = requests.len(),
            "provider lacks batch support, fanning out"
        );
        // join_all yields outputs in input order regardless of completion order
        join_all(
            requests
                .iter()
                .map(|req| self.make_request(provider, &req.method, req.params.clone())),
        )
        .await
    }

    async fn batch_native(
        &self,
        provider: &dyn RpcTransport,
        requests: &[BatchRequest],
    ) -> Vec<BatchResult> {
        let mut results: Vec<BatchResult> = (0..requests.len())
            .map(|i| Err(TransportError::MissingBatchResponse { id: i as u64 }))
            .collect();

        let mut pending: Vec<(usize, Option<String>)> = Vec::new();
        for (i, req) in requests.iter().enumerate() {
            StatsCounters::bump(&self.stats.requests);
            let key = self.cache_key_for(provider, &req.method, &req.params);
            match key.as_deref().and_then(|k| self.cache.get(k)) {
                Some(hit) => {
                    StatsCounters::bump(&self.stats.cache_hits);
                    results[i] = Ok(hit);
                }
                None => pending.push((i, key)),
            }
        }

        if pending.is_empty() {
            tracing::debug!(count = requests.len(), "batch served entirely from cache");
            return results;
        }

        let wire: Vec<JsonRpcRequest> = pending
            .iter()
            .map(|(i, _)| {
                let req = &requests[*i];
                JsonRpcRequest::new(*i as u64, req.method.clone(), req.params.clone())
            })
            .collect();
        tracing::debug!(
            provider = provider.url(),
            sent = wire.len(),
            cached = requests.len() - wire.len(),
            "sending native batch"
        );

        let settled = match self
            .with_retry(provider, || provider.send_batch(wire.clone()))
            .await
        {
            Ok(responses) => self.demux(provider, requests, pending, responses).await,
            Err(err) => {
                tracing::warn!(
                    provider = provider.url(),
                    count = pending.len(),
                    error = %err,
                    "batch call failed, escalating items to fallbacks"
                );
                let outcomes = join_all(pending.iter().map(|(i, _)| {
                    let req = &requests[*i];
                    self.escalate(provider, &req.method, &req.params, err.clone())
                }))
                .await;
                pending
                    .into_iter()
                    .zip(outcomes)
                    .map(|((i, key), outcome)| (i, key, outcome))
                    .collect()
            }
        };

        let ttl = self.config().cache_ttl();
        for (i, key, outcome) in settled {
            match (&outcome, key) {
                (Ok(value), Some(key)) => self.cache.set(key, value.clone(), ttl),
                (Err(err), _) => {
                    StatsCounters::bump(&self.stats.failures);
                    tracing::debug!(id = i, error = %err, "batch item failed");
                }
                (Ok(_), None) => {}
            }
            results[i] = outcome;
        }
        results
    }

    /// Match responses to pending positions by id. Throttled items are sent
    /// again on their own through retry and the fallback chain.
    async fn demux(
        &self,
        provider: &dyn RpcTransport,
        requests: &[BatchRequest],
        pending: Vec<(usize, Option<String>)>,
        responses: Vec<JsonRpcResponse>,
    ) -> Vec<(usize, Option<String>, BatchResult)> {
        let mut by_id: HashMap<u64, JsonRpcResponse> = responses
            .into_iter()
            .filter_map(|resp| resp.id.as_u64().map(|id| (id, resp)))
            .collect();

        let mut settled = Vec::with_capacity(pending.len());
        let mut throttled = Vec::new();
        for (i, key) in pending {
            let outcome = match by_id.remove(&(i as u64)) {
                Some(resp) => resp
                    .into_result()
                    .map_err(|err| TransportError::from_rpc(provider.url(), err)),
                None => Err(TransportError::MissingBatchResponse { id: i as u64 }),
            };
            match outcome {
                Err(err) if err.is_retryable() => {
                    tracing::debug!(id = i, error = %err, "batch item throttled, resending alone");
                    throttled.push((i, key));
                }
                outcome => settled.push((i, key, outcome)),
            }
        }

        let resent = join_all(throttled.iter().map(|(i, _)| {
            let req = &requests[*i];
            self.call_with_fallback(provider, &req.method, &req.params)
        }))
        .await;
        settled.extend(
            throttled
                .into_iter()
                .zip(resent)
                .map(|((i, key), outcome)| (i, key, outcome)),
        );
        settled
    }
}
