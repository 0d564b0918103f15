//! Policy groups: descriptors, the fluent builder, and compilation
//!
//! A [`PolicyGroup`] is an immutable, replayable list of tagged stage
//! configurations. Compiling it yields a [`CompiledPolicy`] whose stage state
//! belongs to that compilation alone.

pub mod builder;
pub mod compile;
pub mod descriptor;

pub use builder::{
    BulkheadBuilder, CircuitBreakerBuilder, CustomBackoffBuilder, ExponentialBackoffBuilder,
    FibonacciBackoffBuilder, PolicyGroupBuilder, RetryBuilder, TimeoutBuilder,
};
pub use compile::{CompiledPolicy, Shape};
pub use descriptor::{
    BackoffSpec, BulkheadOption, CircuitBreakerOption, PolicyGroup, RetryOption, StageSpec,
    TimeoutOption,
};
