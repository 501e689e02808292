//! Concurrency gate: bounds the number of unsettled provider calls.
//!
//! Backed by a fair Tokio semaphore, so contending callers are admitted in
//! arrival order. The permit is released when it is dropped, which happens on
//! every exit path of a call (success, error, timeout or cancellation).

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting semaphore with a fixed capacity.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    max: usize,
}

/// Proof of admission; dropping it frees the slot.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    pub fn new(max: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> GatePermit {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("concurrency gate semaphore is never closed");
        GatePermit { _permit: permit }
    }

    /// Number of calls currently holding a slot.
    pub fn active(&self) -> usize {
        self.max - self.semaphore.available_permits()
    }
}
