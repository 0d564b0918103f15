//! Composed resilience policy
//!
//! A [`ResiliencePolicy`] nests its stages in a fixed order regardless of
//! the order they were configured in:
//!
//! ```text
//! Retry( CircuitBreaker( Timeout( Bulkhead( operation ))))
//! ```
//!
//! Every stage is optional. A policy with no stages runs the operation once.

use std::error::Error;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, instrument};

use super::bulkhead::{Bulkhead, BulkheadConfig};
use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, Clock};
use super::error::{BoxError, ResilienceError, ResilienceResult};
use super::retry::{RetryConfig, RetryContext, RetryDecision};
use super::timeout::{Timeout, TimeoutConfig};

/// Snapshot of one policy's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyMetrics {
    /// Guarded executions started
    pub calls: u64,
    /// Retries performed across all executions
    pub retries: u64,
    pub successes: u64,
    pub failures: u64,
    /// Attempts short-circuited by an open breaker
    pub prevented: u64,
    /// Attempts refused by a full bulkhead
    pub rejections: u64,
    pub timeouts: u64,
}

#[derive(Debug, Default)]
struct Counters {
    calls: AtomicU64,
    retries: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    prevented: AtomicU64,
    rejections: AtomicU64,
    timeouts: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PolicyMetrics {
        PolicyMetrics {
            calls: self.calls.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            prevented: self.prevented.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Builder accepting one configuration per stage kind
///
/// Configuring a stage kind again replaces the earlier configuration.
#[derive(Default)]
pub struct ResiliencePolicyBuilder {
    description: Option<String>,
    retry: Option<RetryConfig>,
    circuit_breaker: Option<CircuitBreakerConfig>,
    bulkhead: Option<BulkheadConfig>,
    timeout: Option<TimeoutConfig>,
    clock: Option<Arc<dyn Clock>>,
}

impl ResiliencePolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(config);
        self
    }

    pub fn bulkhead(mut self, config: BulkheadConfig) -> Self {
        self.bulkhead = Some(config);
        self
    }

    pub fn timeout(mut self, config: TimeoutConfig) -> Self {
        self.timeout = Some(config);
        self
    }

    /// Clock driving the circuit breaker's open delay
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> ResilienceResult<ResiliencePolicy> {
        let description = self.description.unwrap_or_default();

        if let Some(retry) = &self.retry {
            retry.validate()?;
        }
        let breaker = match self.circuit_breaker {
            Some(mut config) => {
                if config.name.is_none() && !description.is_empty() {
                    config.name = Some(description.clone());
                }
                Some(match self.clock {
                    Some(clock) => CircuitBreaker::with_clock(config, clock)?,
                    None => CircuitBreaker::new(config)?,
                })
            }
            None => None,
        };
        let bulkhead = self.bulkhead.map(Bulkhead::new).transpose()?;
        let timeout = self.timeout.map(Timeout::new).transpose()?;

        Ok(ResiliencePolicy {
            description,
            retry: self.retry,
            breaker,
            bulkhead,
            timeout,
            counters: Counters::default(),
        })
    }
}

/// Executable composition of resilience stages
///
/// Stage state (breaker window, bulkhead permits, counters) belongs to this
/// instance alone; retry progress belongs to each individual execution.
#[derive(Debug)]
pub struct ResiliencePolicy {
    description: String,
    retry: Option<RetryConfig>,
    breaker: Option<CircuitBreaker>,
    bulkhead: Option<Bulkhead>,
    timeout: Option<Timeout>,
    counters: Counters,
}

impl ResiliencePolicy {
    pub fn builder() -> ResiliencePolicyBuilder {
        ResiliencePolicyBuilder::new()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn metrics(&self) -> PolicyMetrics {
        self.counters.snapshot()
    }

    pub fn circuit_state(&self) -> Option<CircuitState> {
        self.breaker.as_ref().map(CircuitBreaker::state)
    }

    pub fn circuit_breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_ref()
    }

    /// Execute a synchronous operation under every configured stage
    ///
    /// The operation is invoked once per attempt. A failure that escapes the
    /// policy is returned exactly as the operation produced it.
    #[instrument(level = "debug", skip_all, fields(policy = %self.description))]
    pub fn call<T, F>(&self, mut operation: F) -> Result<T, BoxError>
    where
        F: FnMut() -> Result<T, BoxError>,
    {
        Counters::bump(&self.counters.calls);
        let mut retry = self.retry.as_ref().map(RetryConfig::start);
        loop {
            let error = match self.attempt(&mut operation) {
                Ok(value) => {
                    if let Some(context) = &retry {
                        context.on_success();
                    }
                    Counters::bump(&self.counters.successes);
                    return Ok(value);
                }
                Err(error) => error,
            };

            let decision = self.decide(retry.as_mut(), &error);
            match decision {
                RetryDecision::RetryAfter(delay) => {
                    Counters::bump(&self.counters.retries);
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
                RetryDecision::Stop => {
                    Counters::bump(&self.counters.failures);
                    return Err(error);
                }
            }
        }
    }

    /// Execute an asynchronous operation under every configured stage
    ///
    /// `operation` is a factory producing a fresh future per attempt.
    #[instrument(level = "debug", skip_all, fields(policy = %self.description))]
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, BoxError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        Counters::bump(&self.counters.calls);
        let mut retry = self.retry.as_ref().map(RetryConfig::start);
        loop {
            let error = match self.attempt_async(operation()).await {
                Ok(value) => {
                    if let Some(context) = &retry {
                        context.on_success();
                    }
                    Counters::bump(&self.counters.successes);
                    return Ok(value);
                }
                Err(error) => error,
            };

            let decision = self.decide(retry.as_mut(), &error);
            match decision {
                RetryDecision::RetryAfter(delay) => {
                    Counters::bump(&self.counters.retries);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                RetryDecision::Stop => {
                    Counters::bump(&self.counters.failures);
                    return Err(error);
                }
            }
        }
    }

    fn attempt<T, F>(&self, operation: &mut F) -> Result<T, BoxError>
    where
        F: FnMut() -> Result<T, BoxError>,
    {
        let mut bulkheaded = || match &self.bulkhead {
            Some(bulkhead) => bulkhead.call(&mut *operation),
            None => operation(),
        };
        let timed = || match &self.timeout {
            Some(timeout) => timeout.call(bulkheaded),
            None => bulkheaded(),
        };
        match &self.breaker {
            Some(breaker) => breaker.call(timed),
            None => timed(),
        }
    }

    async fn attempt_async<T, Fut>(&self, operation: Fut) -> Result<T, BoxError>
    where
        Fut: Future<Output = Result<T, BoxError>>,
    {
        let bulkheaded = async move {
            match &self.bulkhead {
                Some(bulkhead) => bulkhead.execute(operation).await,
                None => operation.await,
            }
        };
        let timed = async move {
            match &self.timeout {
                Some(timeout) => timeout.execute(bulkheaded).await,
                None => bulkheaded.await,
            }
        };
        match &self.breaker {
            Some(breaker) => breaker.execute(timed).await,
            None => timed.await,
        }
    }

    /// Count engine rejections and ask the retry stage what to do next
    fn decide(&self, retry: Option<&mut RetryContext<'_>>, error: &BoxError) -> RetryDecision {
        match error.downcast_ref::<ResilienceError>() {
            Some(ResilienceError::CircuitOpen { .. }) => Counters::bump(&self.counters.prevented),
            Some(ResilienceError::BulkheadRejected { .. }) => Counters::bump(&self.counters.rejections),
            Some(ResilienceError::Timeout { .. }) => Counters::bump(&self.counters.timeouts),
            _ => {}
        }
        let failure: &(dyn Error + 'static) = &**error;
        match retry {
            Some(context) => context.on_failure(failure),
            None => {
                debug!(error = %failure, "no retry stage, propagating failure");
                RetryDecision::Stop
            }
        }
    }
}
