//! Bulkhead pattern for limiting concurrent operations
//!
//! At most `limit` guarded operations run at once. Asynchronous executions
//! that find the bulkhead full wait in a queue of at most `queue_size`;
//! synchronous executions never queue and are rejected immediately.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::debug;

use super::callback::Callbacks;
use super::error::{BoxError, ResilienceError, ResilienceResult};

/// Configuration for bulkhead behavior
#[derive(Debug, Clone)]
pub struct BulkheadConfig {
    /// Maximum number of concurrent operations allowed
    pub limit: usize,
    /// Maximum number of asynchronous operations waiting for a slot
    pub queue_size: usize,
    pub on_accepted: Callbacks,
    pub on_rejected: Callbacks,
    pub on_finished: Callbacks,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            queue_size: 10,
            on_accepted: Callbacks::new(),
            on_rejected: Callbacks::new(),
            on_finished: Callbacks::new(),
        }
    }
}

impl BulkheadConfig {
    pub fn builder() -> BulkheadConfigBuilder {
        BulkheadConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.limit == 0 {
            return Err(ResilienceError::invalid("bulkhead limit must be greater than 0"));
        }
        if self.limit > Semaphore::MAX_PERMITS {
            return Err(ResilienceError::invalid("bulkhead limit is too large"));
        }
        Ok(())
    }
}

/// Builder for BulkheadConfig
#[derive(Debug, Default)]
pub struct BulkheadConfigBuilder {
    config: BulkheadConfig,
}

impl BulkheadConfigBuilder {
    pub fn new() -> Self {
        Self { config: BulkheadConfig::default() }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.config.limit = limit;
        self
    }

    pub fn queue_size(mut self, size: usize) -> Self {
        self.config.queue_size = size;
        self
    }

    pub fn on_accepted(mut self, callback: super::Callback) -> Self {
        self.config.on_accepted.push_shared(callback);
        self
    }

    pub fn on_rejected(mut self, callback: super::Callback) -> Self {
        self.config.on_rejected.push_shared(callback);
        self
    }

    pub fn on_finished(mut self, callback: super::Callback) -> Self {
        self.config.on_finished.push_shared(callback);
        self
    }

    pub fn build(self) -> ResilienceResult<BulkheadConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Metrics for bulkhead monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkheadMetrics {
    pub limit: usize,
    pub in_flight: usize,
    pub queued: usize,
}

/// Bulkhead for limiting concurrent operations
pub struct Bulkhead {
    config: BulkheadConfig,
    semaphore: Arc<Semaphore>,
    queued: AtomicUsize,
}

impl fmt::Debug for Bulkhead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bulkhead").field("metrics", &self.metrics()).finish()
    }
}

/// Slot held while a guarded operation runs
struct Slot<'a> {
    _permit: OwnedSemaphorePermit,
    on_finished: &'a Callbacks,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.on_finished.fire();
    }
}

impl Bulkhead {
    pub fn new(config: BulkheadConfig) -> ResilienceResult<Self> {
        config.validate()?;
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.limit)),
            queued: AtomicUsize::new(0),
            config,
        })
    }

    pub fn metrics(&self) -> BulkheadMetrics {
        BulkheadMetrics {
            limit: self.config.limit,
            in_flight: self.config.limit - self.semaphore.available_permits(),
            queued: self.queued.load(Ordering::Acquire),
        }
    }

    fn rejected(&self) -> ResilienceError {
        debug!(limit = self.config.limit, queue = self.config.queue_size, "bulkhead rejecting call");
        self.config.on_rejected.fire();
        ResilienceError::BulkheadRejected { limit: self.config.limit, queue: self.config.queue_size }
    }

    fn accepted(&self, permit: OwnedSemaphorePermit) -> Slot<'_> {
        self.config.on_accepted.fire();
        Slot { _permit: permit, on_finished: &self.config.on_finished }
    }

    fn try_enter(&self) -> Result<Slot<'_>, TryAcquireError> {
        Arc::clone(&self.semaphore).try_acquire_owned().map(|permit| self.accepted(permit))
    }

    async fn enter(&self) -> ResilienceResult<Slot<'_>> {
        match self.try_enter() {
            Ok(slot) => return Ok(slot),
            Err(TryAcquireError::Closed) => return Err(self.rejected()),
            Err(TryAcquireError::NoPermits) => {}
        }

        let waiting = self.queued.fetch_add(1, Ordering::AcqRel);
        if waiting >= self.config.queue_size {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            return Err(self.rejected());
        }
        let permit = Arc::clone(&self.semaphore).acquire_owned().await;
        self.queued.fetch_sub(1, Ordering::AcqRel);
        match permit {
            Ok(permit) => Ok(self.accepted(permit)),
            Err(_) => Err(self.rejected()),
        }
    }

    /// Execute a synchronous operation; rejects immediately when full
    pub fn call<T, F>(&self, operation: F) -> Result<T, BoxError>
    where
        F: FnOnce() -> Result<T, BoxError>,
    {
        let _slot = self.try_enter().map_err(|_| self.rejected())?;
        operation()
    }

    /// Execute an asynchronous operation, queueing while a slot frees up
    pub async fn execute<T, Fut>(&self, operation: Fut) -> Result<T, BoxError>
    where
        Fut: Future<Output = Result<T, BoxError>>,
    {
        let _slot = self.enter().await?;
        operation.await
    }
}
