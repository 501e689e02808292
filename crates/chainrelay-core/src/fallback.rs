//! Ordered, append-only list of fallback providers.
//!
//! Fallbacks are tried strictly in registration order once the primary has
//! exhausted its retry budget. The list is flat: a fallback never has
//! fallbacks of its own, and nothing reorders it based on health.

use std::sync::{Arc, PoisonError, RwLock};

use crate::transport::RpcTransport;

#[derive(Default)]
pub struct FallbackChain {
    providers: RwLock<Vec<Arc<dyn RpcTransport>>>,
}

impl FallbackChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider to the end of the chain.
    pub fn push(&self, provider: Arc<dyn RpcTransport>) {
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(
            provider = provider.url(),
            position = providers.len(),
            "registered fallback provider"
        );
        providers.push(provider);
    }

    /// Copy of the current chain, in registration order.
    ///
    /// Each call works from its own snapshot, so a registration that lands
    /// mid-call only affects later calls.
    pub fn snapshot(&self) -> Vec<Arc<dyn RpcTransport>> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let urls: Vec<String> = self.snapshot().iter().map(|p| p.url().to_string()).collect();
        f.debug_struct("FallbackChain").field("providers", &urls).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use async_trait::async_trait;
    use serde_json::Value;

    struct Named(&'static str);

    #[async_trait]
    impl RpcTransport for Named {
        async fn request(&self, _method: &str, _params: Vec<Value>) -> Result<Value, TransportError> {
            Ok(Value::Null)
        }

        fn url(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn keeps_registration_order() {
        let chain = FallbackChain::new();
        assert!(chain.is_empty());
        chain.push(Arc::new(Named("https://b.example")));
        chain.push(Arc::new(Named("https://a.example")));
        chain.push(Arc::new(Named("https://c.example")));

        let urls: Vec<_> = chain.snapshot().iter().map(|p| p.url().to_string()).collect();
        assert_eq!(urls, ["https://b.example", "https://a.example", "https://c.example"]);
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn snapshot_is_detached() {
        let chain = FallbackChain::new();
        chain.push(Arc::new(Named("one")));
        let snap = chain.snapshot();
        chain.push(Arc::new(Named("two")));
        assert_eq!(snap.len(), 1);
        assert_eq!(chain.len(), 2);
    }
}
