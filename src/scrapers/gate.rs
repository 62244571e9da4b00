//! Shared limit on simultaneous in-flight fetches.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Default number of concurrent fetches.
pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// Counting gate around a semaphore.
///
/// Clones share the same permits. Construct one per process (or per test)
/// and hand clones to every component that issues requests.
#[derive(Clone, Debug)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Permit held for the duration of one fetch. Released on drop.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot.
    ///
    /// Fails only after `close()` was called.
    pub async fn acquire(&self) -> Result<GatePermit, AcquireError> {
        let permit = self.semaphore.clone().acquire_owned().await?;
        Ok(GatePermit { _permit: permit })
    }

    /// Run a future while holding a permit.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, AcquireError>
    where
        F: Future<Output = T>,
    {
        let _permit = self.acquire().await?;
        Ok(fut.await)
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Refuse further acquisitions. Held permits stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT)
    }
}
