//! Rolling-window circuit breaker
//!
//! The breaker records the outcome of the last `request_volume_threshold`
//! calls. Once that window is full and its failure ratio reaches
//! `failure_ratio`, the circuit opens and rejects calls. After `delay` it
//! becomes half-open and admits up to `success_threshold` probe calls;
//! that many consecutive successes close it, any failure reopens it.

use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::callback::Callbacks;
use super::error::{BoxError, ResilienceError, ResilienceResult};
use super::matcher::ErrorMatcher;

//==============================================================================
// Time Abstraction for Testability
//==============================================================================

/// Trait for time operations to enable deterministic testing
///
/// Circuit breakers use real system time in production and controlled mock
/// time in tests, so delay-based transitions can be tested without sleeping.
pub trait Clock: Send + Sync + 'static {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get current system time (wall clock)
    fn system_time(&self) -> SystemTime;

    /// Get milliseconds since UNIX epoch
    fn millis_since_epoch(&self) -> u64 {
        self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }
}

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }
}

/// Mock clock for deterministic testing
///
/// Clones share the same elapsed time, so a test can keep one handle and
/// hand another to the breaker.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self { start: Instant::now(), elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        UNIX_EPOCH + self.elapsed()
    }
}

//==============================================================================
// Configuration
//==============================================================================

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, allowing probe requests to test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Callback invoked with the new state on every transition
pub type StateCallback = Arc<dyn Fn(CircuitState) + Send + Sync>;

/// Configuration for circuit breaker behavior
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    /// Name used in logs and in [`ResilienceError::CircuitOpen`]
    pub name: Option<String>,
    /// Time the circuit stays open before admitting probes
    pub delay: Duration,
    /// Size of the rolling window of recorded outcomes
    pub request_volume_threshold: u32,
    /// Failure ratio of a full window that trips the circuit
    pub failure_ratio: f64,
    /// Consecutive half-open successes needed to close the circuit
    pub success_threshold: u32,
    /// Failures counted against the circuit
    pub fail_on: ErrorMatcher,
    /// Failures recorded as successes (takes precedence over `fail_on`)
    pub skip_on: ErrorMatcher,
    pub on_state_change: Vec<StateCallback>,
    pub on_success: Callbacks,
    pub on_failure: Callbacks,
    pub on_prevented: Callbacks,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: None,
            delay: Duration::from_secs(5),
            request_volume_threshold: 20,
            failure_ratio: 0.5,
            success_threshold: 1,
            fail_on: ErrorMatcher::any(),
            skip_on: ErrorMatcher::none(),
            on_state_change: Vec::new(),
            on_success: Callbacks::new(),
            on_failure: Callbacks::new(),
            on_prevented: Callbacks::new(),
        }
    }
}

impl fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("name", &self.name)
            .field("delay", &self.delay)
            .field("request_volume_threshold", &self.request_volume_threshold)
            .field("failure_ratio", &self.failure_ratio)
            .field("success_threshold", &self.success_threshold)
            .field("fail_on", &self.fail_on)
            .field("skip_on", &self.skip_on)
            .finish_non_exhaustive()
    }
}

impl CircuitBreakerConfig {
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.request_volume_threshold == 0 {
            return Err(ResilienceError::invalid(
                "request_volume_threshold must be greater than 0",
            ));
        }
        if self.success_threshold == 0 {
            return Err(ResilienceError::invalid("success_threshold must be greater than 0"));
        }
        if !(self.failure_ratio > 0.0 && self.failure_ratio <= 1.0) {
            return Err(ResilienceError::invalid("failure_ratio must be in (0, 1]"));
        }
        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.config.delay = delay;
        self
    }

    pub fn request_volume_threshold(mut self, threshold: u32) -> Self {
        self.config.request_volume_threshold = threshold;
        self
    }

    pub fn failure_ratio(mut self, ratio: f64) -> Self {
        self.config.failure_ratio = ratio;
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    pub fn fail_on(mut self, matcher: ErrorMatcher) -> Self {
        self.config.fail_on = matcher;
        self
    }

    pub fn skip_on(mut self, matcher: ErrorMatcher) -> Self {
        self.config.skip_on = matcher;
        self
    }

    pub fn on_state_change(mut self, callback: StateCallback) -> Self {
        self.config.on_state_change.push(callback);
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

    pub fn on_prevented(mut self, callback: super::Callback) -> Self {
        self.config.on_prevented.push_shared(callback);
        self
    }

    pub fn build(self) -> ResilienceResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//==============================================================================
// Circuit Breaker
//==============================================================================

/// Snapshot of the breaker for monitoring
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub window_calls: usize,
    pub window_failures: usize,
    pub prevented: u64,
}

struct Window {
    state: CircuitState,
    /// `true` marks a failure
    outcomes: VecDeque<bool>,
    opened_at: Option<Instant>,
    half_open_successes: u32,
    half_open_in_flight: u32,
    prevented: u64,
}

impl Window {
    fn failures(&self) -> usize {
        self.outcomes.iter().filter(|failed| **failed).count()
    }

    fn transition(&mut self, to: CircuitState, now: Instant) -> Option<CircuitState> {
        if self.state == to {
            return None;
        }
        self.state = to;
        self.half_open_successes = 0;
        self.half_open_in_flight = 0;
        match to {
            CircuitState::Open => self.opened_at = Some(now),
            CircuitState::Closed => {
                self.opened_at = None;
                self.outcomes.clear();
            }
            CircuitState::HalfOpen => {}
        }
        Some(to)
    }
}

/// Circuit breaker guarding one compiled policy
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    name: String,
    window: Mutex<Window>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a circuit breaker using the system clock
    pub fn new(config: CircuitBreakerConfig) -> ResilienceResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a circuit breaker with a custom clock (useful for testing)
    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> ResilienceResult<Self> {
        config.validate()?;
        let name = config.name.clone().unwrap_or_else(|| "default".to_string());
        let capacity = config.request_volume_threshold as usize;
        Ok(Self {
            config,
            name,
            window: Mutex::new(Window {
                state: CircuitState::Closed,
                outcomes: VecDeque::with_capacity(capacity),
                opened_at: None,
                half_open_successes: 0,
                half_open_in_flight: 0,
                prevented: 0,
            }),
            clock,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.window.lock().state
    }

    /// Admit or reject one call
    ///
    /// An open circuit whose delay has elapsed moves to half-open and admits
    /// the caller as a probe.
    pub fn try_acquire(&self) -> ResilienceResult<()> {
        let now = self.clock.now();
        let (admitted, transition) = {
            let mut window = self.window.lock();
            match window.state {
                CircuitState::Closed => (true, None),
                CircuitState::Open => {
                    let elapsed = window.opened_at.map(|at| now.duration_since(at));
                    if elapsed.is_some_and(|e| e >= self.config.delay) {
                        let transition = window.transition(CircuitState::HalfOpen, now);
                        window.half_open_in_flight = 1;
                        (true, transition)
                    } else {
                        window.prevented += 1;
                        (false, None)
                    }
                }
                CircuitState::HalfOpen => {
                    if window.half_open_in_flight < self.config.success_threshold {
                        window.half_open_in_flight += 1;
                        (true, None)
                    } else {
                        window.prevented += 1;
                        (false, None)
                    }
                }
            }
        };

        self.notify(transition);
        if admitted {
            Ok(())
        } else {
            debug!(breaker = %self.name, "circuit breaker rejecting call");
            self.config.on_prevented.fire();
            Err(ResilienceError::CircuitOpen { name: self.name.clone() })
        }
    }

    /// Record the outcome of an admitted call
    pub fn record(&self, outcome: Result<(), &(dyn Error + 'static)>) {
        let failed = match outcome {
            Ok(()) => false,
            Err(error) => !self.config.skip_on.matches(error) && self.config.fail_on.matches(error),
        };
        if failed {
            self.record_failure();
        } else {
            self.record_success();
        }
    }

    pub fn record_success(&self) {
        self.config.on_success.fire();
        let now = self.clock.now();
        let transition = {
            let mut window = self.window.lock();
            match window.state {
                CircuitState::Closed => {
                    self.push_outcome(&mut window, false);
                    None
                }
                CircuitState::HalfOpen => {
                    window.half_open_in_flight = window.half_open_in_flight.saturating_sub(1);
                    window.half_open_successes += 1;
                    if window.half_open_successes >= self.config.success_threshold {
                        window.transition(CircuitState::Closed, now)
                    } else {
                        None
                    }
                }
                // Late result of a call admitted before the circuit opened
                CircuitState::Open => None,
            }
        };
        if transition.is_some() {
            info!(breaker = %self.name, "circuit breaker closed");
        }
        self.notify(transition);
    }

    pub fn record_failure(&self) {
        self.config.on_failure.fire();
        let now = self.clock.now();
        let transition = {
            let mut window = self.window.lock();
            match window.state {
                CircuitState::Closed => {
                    self.push_outcome(&mut window, true);
                    let calls = window.outcomes.len();
                    let failures = window.failures();
                    if calls >= self.config.request_volume_threshold as usize
                        && failures as f64 / calls as f64 >= self.config.failure_ratio
                    {
                        warn!(
                            breaker = %self.name,
                            failures,
                            calls,
                            "circuit breaker opened"
                        );
                        window.transition(CircuitState::Open, now)
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    warn!(breaker = %self.name, "circuit breaker reopened by half-open failure");
                    window.transition(CircuitState::Open, now)
                }
                CircuitState::Open => None,
            }
        };
        self.notify(transition);
    }

    /// Execute a synchronous operation with circuit breaker protection
    pub fn call<T, F>(&self, operation: F) -> Result<T, BoxError>
    where
        F: FnOnce() -> Result<T, BoxError>,
    {
        self.try_acquire()?;
        let result = operation();
        self.record(result.as_ref().map(|_| ()).map_err(|e| &**e as &(dyn Error + 'static)));
        result
    }

    /// Execute an asynchronous operation with circuit breaker protection
    pub async fn execute<T, Fut>(&self, operation: Fut) -> Result<T, BoxError>
    where
        Fut: Future<Output = Result<T, BoxError>>,
    {
        self.try_acquire()?;
        let result = operation.await;
        self.record(result.as_ref().map(|_| ()).map_err(|e| &**e as &(dyn Error + 'static)));
        result
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let window = self.window.lock();
        CircuitBreakerMetrics {
            state: window.state,
            window_calls: window.outcomes.len(),
            window_failures: window.failures(),
            prevented: window.prevented,
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let now = self.clock.now();
        let transition = {
            let mut window = self.window.lock();
            window.outcomes.clear();
            window.transition(CircuitState::Closed, now)
        };
        self.notify(transition);
        info!(breaker = %self.name, "circuit breaker manually reset to closed state");
    }

    fn push_outcome(&self, window: &mut Window, failed: bool) {
        if window.outcomes.len() >= self.config.request_volume_threshold as usize {
            window.outcomes.pop_front();
        }
        window.outcomes.push_back(failed);
    }

    fn notify(&self, transition: Option<CircuitState>) {
        if let Some(state) = transition {
            debug!(breaker = %self.name, %state, "circuit breaker state changed");
            for callback in &self.config.on_state_change {
                callback(state);
            }
        }
    }
}
