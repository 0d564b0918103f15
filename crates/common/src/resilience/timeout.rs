//! Timeout stage

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::debug;

use super::callback::Callbacks;
use super::error::{BoxError, ResilienceError, ResilienceResult};

#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub duration: Duration,
    pub on_timeout: Callbacks,
    pub on_finished: Callbacks,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { duration: Duration::from_secs(1), on_timeout: Callbacks::new(), on_finished: Callbacks::new() }
    }
}

impl TimeoutConfig {
    pub fn builder() -> TimeoutConfigBuilder {
        TimeoutConfigBuilder::default()
    }

    pub fn validate(&self) -> ResilienceResult<()> {
        if self.duration.is_zero() {
            return Err(ResilienceError::invalid("timeout duration must be greater than 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct TimeoutConfigBuilder {
    config: TimeoutConfig,
}

impl TimeoutConfigBuilder {
    pub fn duration(mut self, duration: Duration) -> Self {
        self.config.duration = duration;
        self
    }

    pub fn on_timeout(mut self, callback: super::Callback) -> Self {
        self.config.on_timeout.push_shared(callback);
        self
    }

    pub fn on_finished(mut self, callback: super::Callback) -> Self {
        self.config.on_finished.push_shared(callback);
        self
    }

    pub fn build(self) -> ResilienceResult<TimeoutConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Deadline enforcement for one compiled policy
#[derive(Debug, Clone)]
pub struct Timeout {
    config: TimeoutConfig,
}

impl Timeout {
    pub fn new(config: TimeoutConfig) -> ResilienceResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn duration(&self) -> Duration {
        self.config.duration
    }

    fn timed_out(&self) -> BoxError {
        debug!(timeout = ?self.config.duration, "operation timed out");
        self.config.on_timeout.fire();
        Box::new(ResilienceError::Timeout { timeout: self.config.duration })
    }

    /// Run a synchronous operation to completion
    ///
    /// The calling thread cannot be pre-empted, so an overrun is reported
    /// after the fact and the operation's own result is discarded.
    pub fn call<T, F>(&self, operation: F) -> Result<T, BoxError>
    where
        F: FnOnce() -> Result<T, BoxError>,
    {
        let started = Instant::now();
        let result = operation();
        if started.elapsed() > self.config.duration {
            return Err(self.timed_out());
        }
        self.config.on_finished.fire();
        result
    }

    /// Run an asynchronous operation, cancelling it at the deadline
    pub async fn execute<T, Fut>(&self, operation: Fut) -> Result<T, BoxError>
    where
        Fut: Future<Output = Result<T, BoxError>>,
    {
        match tokio::time::timeout(self.config.duration, operation).await {
            Ok(result) => {
                self.config.on_finished.fire();
                result
            }
            Err(_) => Err(self.timed_out()),
        }
    }
}
