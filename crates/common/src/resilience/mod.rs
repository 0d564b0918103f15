//! Resilience patterns for guarded calls
//!
//! This module is the execution engine behind compiled policy groups:
//! - **Retry**: bounded re-execution with constant, exponential, Fibonacci
//!   or custom backoff plus jitter
//! - **Circuit Breaker**: rolling failure-ratio window that short-circuits
//!   calls while open
//! - **Bulkhead**: concurrency limit with an asynchronous wait queue
//! - **Timeout**: per-attempt deadline
//!
//! [`ResiliencePolicy`] composes them in a fixed nesting order. Each stage
//! can also be used on its own.
//!
//! A failure produced by the guarded operation travels through every stage
//! as the original [`BoxError`]. Only rejections originating in the engine
//! are new errors ([`ResilienceError`]).

pub mod bulkhead;
pub mod callback;
pub mod circuit_breaker;
pub mod error;
pub mod matcher;
pub mod policy;
pub mod retry;
pub mod timeout;

pub use bulkhead::{Bulkhead, BulkheadConfig, BulkheadConfigBuilder, BulkheadMetrics};
pub use callback::{Callback, Callbacks};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerMetrics,
    CircuitState, Clock, MockClock, StateCallback, SystemClock,
};
pub use error::{BoxError, ResilienceError, ResilienceResult};
pub use matcher::ErrorMatcher;
pub use policy::{PolicyMetrics, ResiliencePolicy, ResiliencePolicyBuilder};
pub use retry::{
    BackoffStrategy, CustomBackoff, CustomBackoffSupplier, RetryConfig, RetryConfigBuilder,
    RetryContext, RetryDecision,
};
pub use timeout::{Timeout, TimeoutConfig, TimeoutConfigBuilder};
