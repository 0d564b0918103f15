//! Fluent builder for policy groups
//!
//! ```
//! use std::time::Duration;
//!
//! use callguard_core::policy::PolicyGroup;
//!
//! let group = PolicyGroup::builder()
//!     .description("catalog reads")
//!     .retry()
//!     .max_retries(3)
//!     .with_exponential_backoff()
//!     .factor(2)
//!     .done()
//!     .done()
//!     .timeout()
//!     .duration(Duration::from_millis(500))
//!     .done()
//!     .build();
//!
//! assert_eq!(group.stages().len(), 2);
//! ```
//!
//! Each stage builder records its options in call order and appends one
//! stage to the parent when `done()` is called.

use std::sync::Arc;
use std::time::Duration;

use callguard_common::resilience::{Callback, CircuitState, CustomBackoff, ErrorMatcher};

use super::descriptor::{
    BackoffSpec, BulkheadOption, CircuitBreakerOption, PolicyGroup, RetryOption, StageSpec,
    TimeoutOption,
};

fn callback<F>(f: F) -> Callback
where
    F: Fn() + Send + Sync + 'static,
{
    Arc::new(f)
}

impl PolicyGroup {
    pub fn builder() -> PolicyGroupBuilder {
        PolicyGroupBuilder::new()
    }
}

/// Top-level policy group builder
#[derive(Default)]
pub struct PolicyGroupBuilder {
    description: Option<String>,
    stages: Vec<StageSpec>,
}

impl PolicyGroupBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn retry(self) -> RetryBuilder {
        RetryBuilder { parent: self, options: Vec::new() }
    }

    pub fn circuit_breaker(self) -> CircuitBreakerBuilder {
        CircuitBreakerBuilder { parent: self, options: Vec::new() }
    }

    pub fn bulkhead(self) -> BulkheadBuilder {
        BulkheadBuilder { parent: self, options: Vec::new() }
    }

    pub fn timeout(self) -> TimeoutBuilder {
        TimeoutBuilder { parent: self, options: Vec::new() }
    }

    /// Append an already described stage
    pub fn stage(mut self, stage: StageSpec) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn build(self) -> PolicyGroup {
        PolicyGroup { description: self.description, stages: self.stages }
    }
}

/// Retry stage builder
pub struct RetryBuilder {
    parent: PolicyGroupBuilder,
    options: Vec<RetryOption>,
}

impl RetryBuilder {
    fn with(mut self, option: RetryOption) -> Self {
        self.options.push(option);
        self
    }

    /// Retries after the first attempt
    pub fn max_retries(self, retries: u32) -> Self {
        self.with(RetryOption::MaxRetries(retries))
    }

    pub fn delay(self, delay: Duration) -> Self {
        self.with(RetryOption::Delay(delay))
    }

    pub fn max_duration(self, duration: Duration) -> Self {
        self.with(RetryOption::MaxDuration(duration))
    }

    pub fn jitter(self, jitter: Duration) -> Self {
        self.with(RetryOption::Jitter(jitter))
    }

    pub fn retry_on(self, matcher: ErrorMatcher) -> Self {
        self.with(RetryOption::RetryOn(matcher))
    }

    pub fn abort_on(self, matcher: ErrorMatcher) -> Self {
        self.with(RetryOption::AbortOn(matcher))
    }

    pub fn on_retry<F: Fn() + Send + Sync + 'static>(self, f: F) -> Self {
        self.with(RetryOption::OnRetry(callback(f)))
    }

    pub fn on_success<F: Fn() + Send + Sync + 'static>(self, f: F) -> Self {
        self.with(RetryOption::OnSuccess(callback(f)))
    }

    pub fn on_failure<F: Fn() + Send + Sync + 'static>(self, f: F) -> Self {
        self.with(RetryOption::OnFailure(callback(f)))
    }

    pub fn with_exponential_backoff(self) -> ExponentialBackoffBuilder {
        ExponentialBackoffBuilder { parent: self, factor: None, max_delay: None }
    }

    pub fn with_fibonacci_backoff(self) -> FibonacciBackoffBuilder {
        FibonacciBackoffBuilder { parent: self, max_delay: None }
    }

    pub fn with_custom_backoff(self) -> CustomBackoffBuilder {
        CustomBackoffBuilder { parent: self, spec: None }
    }

    pub fn done(self) -> PolicyGroupBuilder {
        self.parent.stage(StageSpec::Retry(self.options))
    }
}

/// Exponential backoff builder nested in a retry stage
pub struct ExponentialBackoffBuilder {
    parent: RetryBuilder,
    factor: Option<u32>,
    max_delay: Option<Duration>,
}

impl ExponentialBackoffBuilder {
    pub fn factor(mut self, factor: u32) -> Self {
        self.factor = Some(factor);
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn done(self) -> RetryBuilder {
        let spec = BackoffSpec::Exponential { factor: self.factor, max_delay: self.max_delay };
        self.parent.with(RetryOption::Backoff(spec))
    }
}

/// Fibonacci backoff builder nested in a retry stage
pub struct FibonacciBackoffBuilder {
    parent: RetryBuilder,
    max_delay: Option<Duration>,
}

impl FibonacciBackoffBuilder {
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn done(self) -> RetryBuilder {
        self.parent.with(RetryOption::Backoff(BackoffSpec::Fibonacci { max_delay: self.max_delay }))
    }
}

/// Custom backoff builder nested in a retry stage
pub struct CustomBackoffBuilder {
    parent: RetryBuilder,
    spec: Option<BackoffSpec>,
}

impl CustomBackoffBuilder {
    /// Supplier creating one strategy per guarded execution
    pub fn strategy<F, B>(mut self, supplier: F) -> Self
    where
        F: Fn() -> B + Send + Sync + 'static,
        B: CustomBackoff + 'static,
    {
        self.spec = Some(BackoffSpec::Custom(Arc::new(move || Box::new(supplier()) as Box<dyn CustomBackoff>)));
        self
    }

    /// Without a strategy the retry stage keeps its previous backoff
    pub fn done(self) -> RetryBuilder {
        match self.spec {
            Some(spec) => self.parent.with(RetryOption::Backoff(spec)),
            None => self.parent,
        }
    }
}

/// Circuit-breaker stage builder
pub struct CircuitBreakerBuilder {
    parent: PolicyGroupBuilder,
    options: Vec<CircuitBreakerOption>,
}

impl CircuitBreakerBuilder {
    fn with(mut self, option: CircuitBreakerOption) -> Self {
        self.options.push(option);
        self
    }

    /// Failures counted against the circuit
    pub fn fail_on(self, matcher: ErrorMatcher) -> Self {
        self.with(CircuitBreakerOption::FailOn(matcher))
    }

    /// Failures counted as successes
    pub fn skip_on(self, matcher: ErrorMatcher) -> Self {
        self.with(CircuitBreakerOption::SkipOn(matcher))
    }

    /// Time the circuit stays open before admitting a probe
    pub fn delay(self, delay: Duration) -> Self {
        self.with(CircuitBreakerOption::Delay(delay))
    }

    pub fn request_volume_threshold(self, threshold: u32) -> Self {
        self.with(CircuitBreakerOption::RequestVolumeThreshold(threshold))
    }

    pub fn failure_ratio(self, ratio: f64) -> Self {
        self.with(CircuitBreakerOption::FailureRatio(ratio))
    }

    pub fn success_threshold(self, threshold: u32) -> Self {
        self.with(CircuitBreakerOption::SuccessThreshold(threshold))
    }

    pub fn name(self, name: impl Into<String>) -> Self {
        self.with(CircuitBreakerOption::Name(name.into()))
    }

    pub fn on_state_change<F>(self, f: F) -> Self
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        self.with(CircuitBreakerOption::OnStateChange(Arc::new(f)))
    }

    pub fn on_success<F: Fn() + Send + Sync + 'static>(self, f: F) -> Self {
        self.with(CircuitBreakerOption::OnSuccess(callback(f)))
    }

    pub fn on_failure<F: Fn() + Send + Sync + 'static>(self, f: F) -> Self {
        self.with(CircuitBreakerOption::OnFailure(callback(f)))
    }

    pub fn on_prevented<F: Fn() + Send + Sync + 'static>(self, f: F) -> Self {
        self.with(CircuitBreakerOption::OnPrevented(callback(f)))
    }

    pub fn done(self) -> PolicyGroupBuilder {
        self.parent.stage(StageSpec::CircuitBreaker(self.options))
    }
}

/// Bulkhead stage builder
pub struct BulkheadBuilder {
    parent: PolicyGroupBuilder,
    options: Vec<BulkheadOption>,
}

impl BulkheadBuilder {
    fn with(mut self, option: BulkheadOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn limit(self, limit: usize) -> Self {
        self.with(BulkheadOption::Limit(limit))
    }

    pub fn queue_size(self, size: usize) -> Self {
        self.with(BulkheadOption::QueueSize(size))
    }

    pub fn on_accepted<F: Fn() + Send + Sync + 'static>(self, f: F) -> Self {
        self.with(BulkheadOption::OnAccepted(callback(f)))
    }

    pub fn on_rejected<F: Fn() + Send + Sync + 'static>(self, f: F) -> Self {
        self.with(BulkheadOption::OnRejected(callback(f)))
    }

    pub fn on_finished<F: Fn() + Send + Sync + 'static>(self, f: F) -> Self {
        self.with(BulkheadOption::OnFinished(callback(f)))
    }

    pub fn done(self) -> PolicyGroupBuilder {
        self.parent.stage(StageSpec::Bulkhead(self.options))
    }
}

/// Timeout stage builder
pub struct TimeoutBuilder {
    parent: PolicyGroupBuilder,
    options: Vec<TimeoutOption>,
}

impl TimeoutBuilder {
    fn with(mut self, option: TimeoutOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn duration(self, duration: Duration) -> Self {
        self.with(TimeoutOption::Duration(duration))
    }

    pub fn on_timeout<F: Fn() + Send + Sync + 'static>(self, f: F) -> Self {
        self.with(TimeoutOption::OnTimeout(callback(f)))
    }

    pub fn on_finished<F: Fn() + Send + Sync + 'static>(self, f: F) -> Self {
        self.with(TimeoutOption::OnFinished(callback(f)))
    }

    pub fn done(self) -> PolicyGroupBuilder {
        self.parent.stage(StageSpec::Timeout(self.options))
    }
}
