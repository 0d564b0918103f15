//! Immutable policy-group descriptors
//!
//! A descriptor is an ordered list of tagged stage configurations. Each stage
//! carries the options it was configured with, in the order they were given;
//! nothing is applied until the descriptor is compiled.

use std::fmt;
use std::time::Duration;

use callguard_common::resilience::{Callback, CustomBackoffSupplier, ErrorMatcher, StateCallback};

/// Retry stage options
#[derive(Clone)]
pub enum RetryOption {
    MaxRetries(u32),
    Delay(Duration),
    MaxDuration(Duration),
    Jitter(Duration),
    RetryOn(ErrorMatcher),
    AbortOn(ErrorMatcher),
    OnRetry(Callback),
    OnSuccess(Callback),
    OnFailure(Callback),
    Backoff(BackoffSpec),
}

/// The single backoff choice of a retry stage
#[derive(Clone)]
pub enum BackoffSpec {
    Exponential { factor: Option<u32>, max_delay: Option<Duration> },
    Fibonacci { max_delay: Option<Duration> },
    Custom(CustomBackoffSupplier),
}

/// Circuit-breaker stage options
#[derive(Clone)]
pub enum CircuitBreakerOption {
    FailOn(ErrorMatcher),
    SkipOn(ErrorMatcher),
    Delay(Duration),
    RequestVolumeThreshold(u32),
    FailureRatio(f64),
    SuccessThreshold(u32),
    Name(String),
    OnStateChange(StateCallback),
    OnSuccess(Callback),
    OnFailure(Callback),
    OnPrevented(Callback),
}

/// Bulkhead stage options
#[derive(Clone)]
pub enum BulkheadOption {
    Limit(usize),
    QueueSize(usize),
    OnAccepted(Callback),
    OnRejected(Callback),
    OnFinished(Callback),
}

/// Timeout stage options
#[derive(Clone)]
pub enum TimeoutOption {
    Duration(Duration),
    OnTimeout(Callback),
    OnFinished(Callback),
}

/// One stage of a policy group with its ordered options
#[derive(Clone)]
pub enum StageSpec {
    Retry(Vec<RetryOption>),
    CircuitBreaker(Vec<CircuitBreakerOption>),
    Bulkhead(Vec<BulkheadOption>),
    Timeout(Vec<TimeoutOption>),
}

impl StageSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Retry(_) => "retry",
            Self::CircuitBreaker(_) => "circuit_breaker",
            Self::Bulkhead(_) => "bulkhead",
            Self::Timeout(_) => "timeout",
        }
    }

    fn option_count(&self) -> usize {
        match self {
            Self::Retry(options) => options.len(),
            Self::CircuitBreaker(options) => options.len(),
            Self::Bulkhead(options) => options.len(),
            Self::Timeout(options) => options.len(),
        }
    }
}

impl fmt::Debug for StageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({} options)", self.kind(), self.option_count())
    }
}

/// Replayable description of a named policy group
///
/// Built with [`PolicyGroup::builder`](super::PolicyGroupBuilder) and
/// compiled any number of times with [`PolicyGroup::build`] or
/// [`PolicyGroup::build_async`].
#[derive(Clone, Default)]
pub struct PolicyGroup {
    pub(crate) description: Option<String>,
    pub(crate) stages: Vec<StageSpec>,
}

impl PolicyGroup {
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// A group with no stages runs calls unguarded
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl fmt::Debug for PolicyGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyGroup")
            .field("description", &self.description)
            .field("stages", &self.stages)
            .finish()
    }
}
