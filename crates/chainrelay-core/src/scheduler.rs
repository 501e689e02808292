//! Request scheduler: rate + concurrency admission for every physical call.
//!
//! A call first takes a slot in the [`ConcurrencyGate`], then a token from the
//! [`TokenBucket`], and only then is the provider future created. Tokens are
//! consumed at admission and not refunded when the call fails. The slot is
//! released when the call settles, including when the per-call timeout fires.

use std::future::Future;
use std::time::Duration;

use crate::error::TransportError;
use crate::policy::{ConcurrencyGate, RateLimiterConfig, TokenBucket};

/// Admission control shared by all calls issued through one client.
#[derive(Debug)]
pub struct Scheduler {
    bucket: TokenBucket,
    gate: ConcurrencyGate,
    timeout: Option<Duration>,
}

impl Scheduler {
    pub fn new(rate: RateLimiterConfig, max_concurrent: usize, timeout: Option<Duration>) -> Self {
        Self {
            bucket: TokenBucket::new(rate),
            gate: ConcurrencyGate::new(max_concurrent),
            timeout,
        }
    }

    /// Admit one call and run it.
    ///
    /// `call` is only invoked after admission, so no provider work starts
    /// while the caller is queued.
    pub async fn run<F, Fut, T>(&self, provider: &str, call: F) -> Result<T, TransportError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let _permit = self.gate.acquire().await;
        let waited = self.bucket.acquire().await;
        if !waited.is_zero() {
            tracing::debug!(
                provider,
                waited_ms = waited.as_millis() as u64,
                "admitted after rate limit wait"
            );
        }

        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(provider, timeout_ms = limit.as_millis() as u64, "call timed out");
                    Err(TransportError::Timeout {
                        ms: limit.as_millis() as u64,
                    })
                }
            },
            None => call().await,
        }
    }

    /// Number of calls currently admitted and unsettled.
    pub fn in_flight(&self) -> usize {
        self.gate.active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn scheduler(rps: f64, max_concurrent: usize, timeout: Option<Duration>) -> Arc<Scheduler> {
        Arc::new(Scheduler::new(
            RateLimiterConfig {
                capacity: 1.0,
                refill_rate: rps,
            },
            max_concurrent,
            timeout,
        ))
    }

    #[tokio::test]
    async fn admissions_are_spaced_by_rate() {
        let sched = scheduler(20.0, 10, None);
        let start = Instant::now();
        for _ in 0..4 {
            sched.run("mock", || async { Ok::<_, TransportError>(()) }).await.unwrap();
        }
        // 4 calls at 20/s: at least 3 * 50ms
        assert!(start.elapsed() >= Duration::from_millis(145), "{:?}", start.elapsed());
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let sched = scheduler(1_000.0, 2, None);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let sched = sched.clone();
                let active = active.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    sched
                        .run("mock", || async {
                            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            active.fetch_sub(1, Ordering::SeqCst);
                            Ok::<_, TransportError>(())
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(sched.in_flight(), 0);
    }

    #[tokio::test]
    async fn failure_releases_permit() {
        let sched = scheduler(1_000.0, 1, None);
        let err = sched
            .run("mock", || async { Err::<(), _>(TransportError::Http("boom".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Http(_)));
        assert_eq!(sched.in_flight(), 0);
    }

    #[tokio::test]
    async fn timeout_releases_permit() {
        let sched = scheduler(1_000.0, 1, Some(Duration::from_millis(30)));
        let err = sched
            .run("mock", || async {
                std::future::pending::<()>().await;
                Ok::<_, TransportError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout { ms: 30 }));
        assert_eq!(sched.in_flight(), 0);

        // the gate is usable again
        sched.run("mock", || async { Ok::<_, TransportError>(()) }).await.unwrap();
    }
}
