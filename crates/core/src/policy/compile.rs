//! Compiling policy groups into executable policies
//!
//! Each stage's options are folded, in declaration order, onto a fresh
//! engine configuration builder. A later option of the same kind overwrites
//! an earlier one; a later stage of the same kind replaces the earlier stage.

use std::fmt;
use std::future::Future;

use callguard_common::resilience::{
    BackoffStrategy, BoxError, BulkheadConfig, CircuitBreakerConfig, CircuitState, PolicyMetrics,
    ResiliencePolicy, ResiliencePolicyBuilder, ResilienceResult, RetryConfig, TimeoutConfig,
};
use tracing::debug;

use super::descriptor::{
    BackoffSpec, BulkheadOption, CircuitBreakerOption, PolicyGroup, RetryOption, StageSpec,
    TimeoutOption,
};

/// Execution shape of a compiled policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Sync,
    Async,
}

impl Shape {
    pub fn from_async(is_async: bool) -> Self {
        if is_async {
            Self::Async
        } else {
            Self::Sync
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Async => "async",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One executable instance of a policy group
///
/// Owns its stage state. Two compilations of the same group share nothing
/// but the descriptor they were built from.
#[derive(Debug)]
pub struct CompiledPolicy {
    policy: ResiliencePolicy,
    shape: Shape,
    result_type: String,
}

impl CompiledPolicy {
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Declared result type the policy was compiled for
    pub fn result_type(&self) -> &str {
        &self.result_type
    }

    pub fn description(&self) -> &str {
        self.policy.description()
    }

    pub fn metrics(&self) -> PolicyMetrics {
        self.policy.metrics()
    }

    pub fn circuit_state(&self) -> Option<CircuitState> {
        self.policy.circuit_state()
    }

    /// Run a synchronous call under the policy
    pub fn call<T, F>(&self, operation: F) -> Result<T, BoxError>
    where
        F: FnMut() -> Result<T, BoxError>,
    {
        self.policy.call(operation)
    }

    /// Run an asynchronous call under the policy
    ///
    /// `operation` produces a fresh future per attempt.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, BoxError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        self.policy.execute(operation).await
    }
}

impl PolicyGroup {
    /// Compile a synchronous policy for `result_type`
    pub fn build(&self, result_type: impl Into<String>) -> ResilienceResult<CompiledPolicy> {
        self.compile(Shape::Sync, result_type)
    }

    /// Compile an asynchronous policy for `result_type`
    pub fn build_async(&self, result_type: impl Into<String>) -> ResilienceResult<CompiledPolicy> {
        self.compile(Shape::Async, result_type)
    }

    /// Replay every stage against a fresh engine builder
    pub fn compile(
        &self,
        shape: Shape,
        result_type: impl Into<String>,
    ) -> ResilienceResult<CompiledPolicy> {
        let result_type = result_type.into();
        let mut builder = ResiliencePolicy::builder();
        if let Some(description) = &self.description {
            builder = builder.description(description.clone());
        }
        for stage in &self.stages {
            builder = apply(builder, stage)?;
        }

        let policy = builder.build()?;
        debug!(
            policy = policy.description(),
            stages = self.stages.len(),
            %shape,
            result_type = %result_type,
            "policy group compiled"
        );
        Ok(CompiledPolicy { policy, shape, result_type })
    }
}

fn apply(builder: ResiliencePolicyBuilder, stage: &StageSpec) -> ResilienceResult<ResiliencePolicyBuilder> {
    Ok(match stage {
        StageSpec::Retry(options) => builder.retry(retry_config(options)?),
        StageSpec::CircuitBreaker(options) => builder.circuit_breaker(circuit_breaker_config(options)?),
        StageSpec::Bulkhead(options) => builder.bulkhead(bulkhead_config(options)?),
        StageSpec::Timeout(options) => builder.timeout(timeout_config(options)?),
    })
}

fn retry_config(options: &[RetryOption]) -> ResilienceResult<RetryConfig> {
    options
        .iter()
        .cloned()
        .fold(RetryConfig::builder(), |builder, option| match option {
            RetryOption::MaxRetries(retries) => builder.max_retries(retries),
            RetryOption::Delay(delay) => builder.delay(delay),
            RetryOption::MaxDuration(duration) => builder.max_duration(duration),
            RetryOption::Jitter(jitter) => builder.jitter(jitter),
            RetryOption::RetryOn(matcher) => builder.retry_on(matcher),
            RetryOption::AbortOn(matcher) => builder.abort_on(matcher),
            RetryOption::OnRetry(callback) => builder.on_retry(callback),
            RetryOption::OnSuccess(callback) => builder.on_success(callback),
            RetryOption::OnFailure(callback) => builder.on_failure(callback),
            RetryOption::Backoff(spec) => builder.backoff(backoff_strategy(spec)),
        })
        .build()
}

fn backoff_strategy(spec: BackoffSpec) -> BackoffStrategy {
    match spec {
        BackoffSpec::Exponential { factor, max_delay } => BackoffStrategy::Exponential {
            factor: factor.unwrap_or(BackoffStrategy::DEFAULT_FACTOR),
            max_delay: max_delay.unwrap_or(BackoffStrategy::DEFAULT_MAX_DELAY),
        },
        BackoffSpec::Fibonacci { max_delay } => BackoffStrategy::Fibonacci {
            max_delay: max_delay.unwrap_or(BackoffStrategy::DEFAULT_MAX_DELAY),
        },
        BackoffSpec::Custom(supplier) => BackoffStrategy::Custom(supplier),
    }
}

fn circuit_breaker_config(options: &[CircuitBreakerOption]) -> ResilienceResult<CircuitBreakerConfig> {
    options
        .iter()
        .cloned()
        .fold(CircuitBreakerConfig::builder(), |builder, option| match option {
            CircuitBreakerOption::FailOn(matcher) => builder.fail_on(matcher),
            CircuitBreakerOption::SkipOn(matcher) => builder.skip_on(matcher),
            CircuitBreakerOption::Delay(delay) => builder.delay(delay),
            CircuitBreakerOption::RequestVolumeThreshold(threshold) => {
                builder.request_volume_threshold(threshold)
            }
            CircuitBreakerOption::FailureRatio(ratio) => builder.failure_ratio(ratio),
            CircuitBreakerOption::SuccessThreshold(threshold) => builder.success_threshold(threshold),
            CircuitBreakerOption::Name(name) => builder.name(name),
            CircuitBreakerOption::OnStateChange(callback) => builder.on_state_change(callback),
            CircuitBreakerOption::OnSuccess(callback) => builder.on_success(callback),
            CircuitBreakerOption::OnFailure(callback) => builder.on_failure(callback),
            CircuitBreakerOption::OnPrevented(callback) => builder.on_prevented(callback),
        })
        .build()
}

fn bulkhead_config(options: &[BulkheadOption]) -> ResilienceResult<BulkheadConfig> {
    options
        .iter()
        .cloned()
        .fold(BulkheadConfig::builder(), |builder, option| match option {
            BulkheadOption::Limit(limit) => builder.limit(limit),
            BulkheadOption::QueueSize(size) => builder.queue_size(size),
            BulkheadOption::OnAccepted(callback) => builder.on_accepted(callback),
            BulkheadOption::OnRejected(callback) => builder.on_rejected(callback),
            BulkheadOption::OnFinished(callback) => builder.on_finished(callback),
        })
        .build()
}

fn timeout_config(options: &[TimeoutOption]) -> ResilienceResult<TimeoutConfig> {
    options
        .iter()
        .cloned()
        .fold(TimeoutConfig::builder(), |builder, option| match option {
            TimeoutOption::Duration(duration) => builder.duration(duration),
            TimeoutOption::OnTimeout(callback) => builder.on_timeout(callback),
            TimeoutOption::OnFinished(callback) => builder.on_finished(callback),
        })
        .build()
}
