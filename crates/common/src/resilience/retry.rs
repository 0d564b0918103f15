//! Retry stage with pluggable backoff and jitter
//!
//! A [`RetryConfig`] is immutable and shared by every execution of a
//! policy. Each guarded execution starts its own [`RetryContext`], which
//! owns the attempt counter and the backoff state, so two executions (or
//! two policies built from the same configuration) never share retry
//! progress.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, warn};

use super::callback::Callbacks;
use super::error::{ResilienceError, ResilienceResult};
use super::matcher::ErrorMatcher;

/// Pluggable backoff computing the delay before each retry
///
/// A fresh instance is created for every guarded execution.
pub trait CustomBackoff: Send {
    /// Called once with the configured base delay before the first retry
    fn init(&mut self, initial_delay: Duration);

    /// Delay before the next retry, given the failure that triggered it
    fn next_delay(&mut self, error: &(dyn Error + 'static)) -> Duration;
}

/// Factory creating one [`CustomBackoff`] per execution
pub type CustomBackoffSupplier = Arc<dyn Fn() -> Box<dyn CustomBackoff> + Send + Sync>;

/// Backoff strategy for calculating retry delays
#[derive(Clone, Default)]
pub enum BackoffStrategy {
    /// The base delay before every retry
    #[default]
    Constant,
    /// `delay`, `delay * factor`, `delay * factor^2`, ... capped at `max_delay`
    Exponential { factor: u32, max_delay: Duration },
    /// `delay * 1`, `delay * 2`, `delay * 3`, `delay * 5`, ... capped at `max_delay`
    Fibonacci { max_delay: Duration },
    /// Strategy objects produced by a supplier
    Custom(CustomBackoffSupplier),
}

impl BackoffStrategy {
    pub const DEFAULT_FACTOR: u32 = 2;
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

    pub fn exponential() -> Self {
        Self::Exponential { factor: Self::DEFAULT_FACTOR, max_delay: Self::DEFAULT_MAX_DELAY }
    }

    pub fn fibonacci() -> Self {
        Self::Fibonacci { max_delay: Self::DEFAULT_MAX_DELAY }
    }

    fn start(&self, delay: Duration) -> BackoffState {
        match self {
            Self::Constant => BackoffState::Constant { delay },
            Self::Exponential { factor, max_delay } => {
                BackoffState::Exponential { next: delay, factor: *factor, max_delay: *max_delay }
            }
            Self::Fibonacci { max_delay } => {
                BackoffState::Fibonacci { unit: delay, current: 1, following: 2, max_delay: *max_delay }
            }
            Self::Custom(supplier) => {
                let mut strategy = supplier();
                strategy.init(delay);
                BackoffState::Custom(strategy)
            }
        }
    }
}

impl fmt::Debug for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant => f.write_str("Constant"),
            Self::Exponential { factor, max_delay } => f
                .debug_struct("Exponential")
                .field("factor", factor)
                .field("max_delay", max_delay)
                .finish(),
            Self::Fibonacci { max_delay } => {
                f.debug_struct("Fibonacci").field("max_delay", max_delay).finish()
            }
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Per-execution backoff progress
enum BackoffState {
    Constant { delay: Duration },
    Exponential { next: Duration, factor: u32, max_delay: Duration },
    Fibonacci { unit: Duration, current: u32, following: u32, max_delay: Duration },
    Custom(Box<dyn CustomBackoff>),
}

impl BackoffState {
    fn next_delay(&mut self, error: &(dyn Error + 'static)) -> Duration {
        match self {
            Self::Constant { delay } => *delay,
            Self::Exponential { next, factor, max_delay } => {
                let delay = (*next).min(*max_delay);
                *next = next.saturating_mul(*factor).min(*max_delay);
                delay
            }
            Self::Fibonacci { unit, current, following, max_delay } => {
                let delay = unit.saturating_mul(*current).min(*max_delay);
                let sum = current.saturating_add(*following);
                *current = *following;
                *following = sum;
                delay
            }
            Self::Custom(strategy) => strategy.next_delay(error),
        }
    }
}

/// Configuration for retry behavior
#[derive(Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    pub max_retries: u32,
    /// Base delay between attempts, shaped by `backoff`
    pub delay: Duration,
    /// Upper bound on the time spent in one execution, retries included
    pub max_duration: Duration,
    /// Each delay is moved by a random offset in `[-jitter, +jitter]`
    pub jitter: Duration,
    pub backoff: BackoffStrategy,
    /// Failures that are retried
    pub retry_on: ErrorMatcher,
    /// Failures never retried (takes precedence over `retry_on`)
    pub abort_on: ErrorMatcher,
    pub on_retry: Callbacks,
    pub on_success: Callbacks,
    pub on_failure: Callbacks,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::ZERO,
            max_duration: Duration::from_secs(180),
            jitter: Duration::from_millis(200),
            backoff: BackoffStrategy::Constant,
            retry_on: ErrorMatcher::any(),
            abort_on: ErrorMatcher::none(),
            on_retry: Callbacks::new(),
            on_success: Callbacks::new(),
            on_failure: Callbacks::new(),
        }
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("delay", &self.delay)
            .field("max_duration", &self.max_duration)
            .field("jitter", &self.jitter)
            .field("backoff", &self.backoff)
            .field("retry_on", &self.retry_on)
            .field("abort_on", &self.abort_on)
            .finish_non_exhaustive()
    }
}

impl RetryConfig {
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ResilienceResult<()> {
        if !self.max_duration.is_zero() && self.max_duration <= self.delay {
            return Err(ResilienceError::invalid("max_duration must be greater than delay"));
        }
        match &self.backoff {
            BackoffStrategy::Exponential { factor, .. } if *factor < 1 => {
                Err(ResilienceError::invalid("exponential factor must be at least 1"))
            }
            BackoffStrategy::Exponential { max_delay, .. } | BackoffStrategy::Fibonacci { max_delay }
                if max_delay.is_zero() =>
            {
                Err(ResilienceError::invalid("backoff max_delay must be greater than 0"))
            }
            _ => Ok(()),
        }
    }

    /// Start the retry bookkeeping of one guarded execution
    pub fn start(&self) -> RetryContext<'_> {
        RetryContext {
            config: self,
            retries: 0,
            start_time: Instant::now(),
            backoff: self.backoff.start(self.delay),
            total_delay: Duration::ZERO,
        }
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.config.delay = delay;
        self
    }

    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.config.max_duration = duration;
        self
    }

    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.config.jitter = jitter;
        self
    }

    pub fn no_jitter(self) -> Self {
        self.jitter(Duration::ZERO)
    }

    pub fn backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.config.backoff = backoff;
        self
    }

    pub fn retry_on(mut self, matcher: ErrorMatcher) -> Self {
        self.config.retry_on = matcher;
        self
    }

    pub fn abort_on(mut self, matcher: ErrorMatcher) -> Self {
        self.config.abort_on = matcher;
        self
    }

    pub fn on_retry(mut self, callback: super::Callback) -> Self {
        self.config.on_retry.push_shared(callback);
        self
    }

    pub fn on_success(mut self, callback: super::Callback) -> Self {
        self.config.on_success.push_shared(callback);
        self
    }

    pub fn on_failure(mut self, callback: super::Callback) -> Self {
        self.config.on_failure.push_shared(callback);
        self
    }

    pub fn build(self) -> ResilienceResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation after the given delay
    RetryAfter(Duration),
    /// Don't retry the operation
    Stop,
}

/// Retry state of one guarded execution
pub struct RetryContext<'a> {
    config: &'a RetryConfig,
    retries: u32,
    start_time: Instant,
    backoff: BackoffState,
    total_delay: Duration,
}

impl RetryContext<'_> {
    /// Retries performed so far
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn total_delay(&self) -> Duration {
        self.total_delay
    }

    pub fn on_success(&self) {
        if self.retries > 0 {
            debug!(retries = self.retries, "operation succeeded after retries");
        }
        self.config.on_success.fire();
    }

    /// Decide what to do after a failed attempt
    pub fn on_failure(&mut self, error: &(dyn Error + 'static)) -> RetryDecision {
        let config = self.config;
        let attempt = self.retries + 1;

        if config.abort_on.matches(error) || !config.retry_on.matches(error) {
            debug!(attempt, error = %error, "failure is not retryable");
            config.on_failure.fire();
            return RetryDecision::Stop;
        }
        if self.retries >= config.max_retries {
            warn!(attempt, error = %error, "all retry attempts exhausted");
            config.on_failure.fire();
            return RetryDecision::Stop;
        }

        let delay = apply_jitter(self.backoff.next_delay(error), config.jitter);
        let elapsed = self.start_time.elapsed();
        if !config.max_duration.is_zero() && elapsed + delay >= config.max_duration {
            warn!(attempt, ?elapsed, "retry max duration exceeded");
            config.on_failure.fire();
            return RetryDecision::Stop;
        }

        self.retries += 1;
        self.total_delay += delay;
        debug!(attempt, ?delay, error = %error, "operation failed, retrying");
        config.on_retry.fire();
        RetryDecision::RetryAfter(delay)
    }
}

fn apply_jitter(delay: Duration, jitter: Duration) -> Duration {
    let jitter_ms = jitter.as_millis() as i64;
    if jitter_ms == 0 {
        return delay;
    }
    let offset = rand::thread_rng().gen_range(-jitter_ms..=jitter_ms);
    let millis = (delay.as_millis() as i64).saturating_add(offset).max(0);
    Duration::from_millis(millis as u64)
}

#[cfg(test)]
mod tests {
    //! Unit tests for retry decisions and backoff strategies

    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn failure() -> io::Error {
        io::Error::new(io::ErrorKind::ConnectionReset, "reset")
    }

    fn delays(config: &RetryConfig, count: usize) -> Vec<Duration> {
        let mut context = config.start();
        (0..count)
            .map(|_| match context.on_failure(&failure()) {
                RetryDecision::RetryAfter(delay) => delay,
                RetryDecision::Stop => Duration::MAX,
            })
            .collect()
    }

    #[test]
    fn test_retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.delay, Duration::ZERO);
        assert_eq!(config.max_duration, Duration::from_secs(180));
        assert_eq!(config.jitter, Duration::from_millis(200));
        assert!(matches!(config.backoff, BackoffStrategy::Constant));
    }

    /// Exactly `max_retries` retries are granted.
    #[test]
    fn test_stops_after_max_retries() {
        let config = RetryConfig::builder().max_retries(2).no_jitter().build().expect("valid");
        let mut context = config.start();
        assert_eq!(context.on_failure(&failure()), RetryDecision::RetryAfter(Duration::ZERO));
        assert_eq!(context.on_failure(&failure()), RetryDecision::RetryAfter(Duration::ZERO));
        assert_eq!(context.on_failure(&failure()), RetryDecision::Stop);
        assert_eq!(context.retries(), 2);
    }

    #[test]
    fn test_exponential_backoff_delays() {
        let config = RetryConfig::builder()
            .max_retries(5)
            .delay(Duration::from_millis(100))
            .no_jitter()
            .backoff(BackoffStrategy::Exponential { factor: 2, max_delay: Duration::from_millis(500) })
            .build()
            .expect("valid");
        let expected: Vec<_> = [100, 200, 400, 500, 500].into_iter().map(Duration::from_millis).collect();
        assert_eq!(delays(&config, 5), expected);
    }

    #[test]
    fn test_fibonacci_backoff_delays() {
        let config = RetryConfig::builder()
            .max_retries(5)
            .delay(Duration::from_millis(10))
            .no_jitter()
            .backoff(BackoffStrategy::Fibonacci { max_delay: Duration::from_millis(45) })
            .build()
            .expect("valid");
        let expected: Vec<_> = [10, 20, 30, 45, 45].into_iter().map(Duration::from_millis).collect();
        assert_eq!(delays(&config, 5), expected);
    }

    /// Every execution gets a fresh custom strategy initialised with the base delay.
    #[test]
    fn test_custom_backoff_fresh_per_execution() {
        struct Doubling(Duration);
        impl CustomBackoff for Doubling {
            fn init(&mut self, initial_delay: Duration) {
                self.0 = initial_delay;
            }
            fn next_delay(&mut self, _error: &(dyn Error + 'static)) -> Duration {
                self.0 *= 2;
                self.0
            }
        }

        let created = Arc::new(AtomicU32::new(0));
        let supplier: CustomBackoffSupplier = {
            let created = Arc::clone(&created);
            Arc::new(move || {
                created.fetch_add(1, Ordering::SeqCst);
                Box::new(Doubling(Duration::ZERO)) as Box<dyn CustomBackoff>
            })
        };
        let config = RetryConfig::builder()
            .max_retries(3)
            .delay(Duration::from_millis(5))
            .no_jitter()
            .backoff(BackoffStrategy::Custom(supplier))
            .build()
            .expect("valid");

        let expected: Vec<_> = [10, 20].into_iter().map(Duration::from_millis).collect();
        assert_eq!(delays(&config, 2), expected);
        assert_eq!(delays(&config, 2), expected);
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    /// abort_on wins over retry_on.
    #[test]
    fn test_abort_on_precedence() {
        let config = RetryConfig::builder()
            .retry_on(ErrorMatcher::of::<io::Error>())
            .abort_on(ErrorMatcher::of::<io::Error>())
            .build()
            .expect("valid");
        assert_eq!(config.start().on_failure(&failure()), RetryDecision::Stop);
    }

    #[test]
    fn test_unlisted_failure_not_retried() {
        #[derive(Debug, thiserror::Error)]
        #[error("conflict")]
        struct Conflict;

        let config =
            RetryConfig::builder().retry_on(ErrorMatcher::of::<io::Error>()).build().expect("valid");
        assert_eq!(config.start().on_failure(&Conflict), RetryDecision::Stop);
    }

    #[test]
    fn test_max_duration_stops_retrying() {
        let config = RetryConfig::builder()
            .delay(Duration::from_millis(50))
            .max_duration(Duration::from_millis(60))
            .no_jitter()
            .backoff(BackoffStrategy::exponential())
            .build()
            .expect("valid");
        let mut context = config.start();
        assert_eq!(context.on_failure(&failure()), RetryDecision::RetryAfter(Duration::from_millis(50)));
        // The next delay alone (100ms) is beyond the budget
        assert_eq!(context.on_failure(&failure()), RetryDecision::Stop);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        for _ in 0..100 {
            let delay = apply_jitter(Duration::from_millis(100), Duration::from_millis(20));
            assert!(delay >= Duration::from_millis(80) && delay <= Duration::from_millis(120));
        }
        assert!(apply_jitter(Duration::ZERO, Duration::from_millis(20)) <= Duration::from_millis(20));
    }

    #[test]
    fn test_validation() {
        assert!(RetryConfig::builder()
            .delay(Duration::from_secs(5))
            .max_duration(Duration::from_secs(1))
            .build()
            .is_err());
        assert!(RetryConfig::builder()
            .backoff(BackoffStrategy::Exponential { factor: 0, max_delay: Duration::from_secs(1) })
            .build()
            .is_err());
    }

    #[test]
    fn test_callbacks_fire() {
        let retries = Arc::new(AtomicU32::new(0));
        let failures = Arc::new(AtomicU32::new(0));
        let config = {
            let retries = Arc::clone(&retries);
            let failures = Arc::clone(&failures);
            RetryConfig::builder()
                .max_retries(1)
                .no_jitter()
                .on_retry(Arc::new(move || {
                    retries.fetch_add(1, Ordering::SeqCst);
                }))
                .on_failure(Arc::new(move || {
                    failures.fetch_add(1, Ordering::SeqCst);
                }))
                .build()
                .expect("valid")
        };
        let mut context = config.start();
        let _ = context.on_failure(&failure());
        let _ = context.on_failure(&failure());
        assert_eq!(retries.load(Ordering::SeqCst), 1);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }
}
