//! Error types used throughout the static phase and the dispatcher

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for callguard
///
/// Every variant is a configuration or resolution problem detected while
/// classifying operations, attaching markers or wiring the dispatch table.
/// Runtime call failures never use this type; they travel as the original
/// boxed error (see `callguard_common::resilience::ResilienceError`).
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CallGuardError {
    #[error("Conflicting idempotency overrides on {interface}::{method}: both Idempotent and NonIdempotent are declared")]
    ConflictingOverrides { interface: String, method: String },

    #[error("Operation {interface}::{method} references unknown policy group '{group}'")]
    UnknownGroup { interface: String, method: String, group: String },

    #[error("Adapter method {method} inherits conflicting classifications: {first} and {second}")]
    ConflictingClassifications { method: String, first: String, second: String },

    #[error("Unknown interface: {0}")]
    UnknownInterface(String),

    #[error("No call adapter implements {interface} (classified operation {method} left unguarded)")]
    NoAdapter { interface: String, method: String },

    #[error("Method {method} is marked {expected} but was invoked {actual}")]
    ShapeMismatch { method: String, expected: String, actual: String },

    #[error("Invalid policy group '{group}': {message}")]
    InvalidPolicy { group: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CallGuardError {
    /// Whether this error aborts the static phase
    ///
    /// `ShapeMismatch` is the only error raised per call; everything else
    /// is raised before interception becomes active.
    pub fn is_static(&self) -> bool {
        !matches!(self, Self::ShapeMismatch { .. })
    }
}

/// Result type alias for callguard operations
pub type Result<T> = std::result::Result<T, CallGuardError>;
