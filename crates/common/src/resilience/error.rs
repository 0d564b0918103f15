//! Errors produced by the resilience engine

use std::time::Duration;

use thiserror::Error;

use crate::error::{ErrorClassification, ErrorSeverity};

/// Boxed failure travelling through guarded calls
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for resilience operations
pub type ResilienceResult<T> = Result<T, ResilienceError>;

/// Errors that can occur in resilience operations
///
/// Only the rejection variants originate in the engine. A failure of the
/// guarded operation itself is returned as the very box the operation
/// produced; [`ResilienceError::Failed`] exists for callers that want a
/// single typed view over both (see [`ResilienceError::from_boxed`]).
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// Circuit breaker is open, rejecting calls
    #[error("Circuit breaker '{name}' is open, rejecting calls")]
    CircuitOpen { name: String },

    /// Operation exceeded its deadline
    #[error("Operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Bulkhead capacity and queue are exhausted
    #[error("Bulkhead capacity exceeded: {limit} concurrent operations, {queue} queued")]
    BulkheadRejected { limit: usize, queue: usize },

    /// The underlying operation failed
    #[error(transparent)]
    Failed(BoxError),

    /// Configuration error
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl ResilienceError {
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfiguration { message: message.into() }
    }

    /// View a boxed failure as a typed resilience error
    ///
    /// Engine rejections are unboxed back into their variant; any other
    /// failure becomes [`ResilienceError::Failed`] carrying the original box.
    pub fn from_boxed(error: BoxError) -> Self {
        match error.downcast::<ResilienceError>() {
            Ok(engine) => *engine,
            Err(other) => Self::Failed(other),
        }
    }

    /// Whether the engine refused to run the operation (or cut it short)
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. } | Self::Timeout { .. } | Self::BulkheadRejected { .. })
    }

    /// Box this error for propagation through a guarded call
    pub fn boxed(self) -> BoxError {
        match self {
            Self::Failed(original) => original,
            other => Box::new(other),
        }
    }
}

impl ErrorClassification for ResilienceError {
    fn is_retryable(&self) -> bool {
        self.is_rejection()
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::CircuitOpen { .. } | Self::Timeout { .. } | Self::BulkheadRejected { .. } => {
                ErrorSeverity::Warning
            }
            Self::Failed(_) | Self::InvalidConfiguration { .. } => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_from_boxed_unwraps_engine_rejection() {
        let boxed: BoxError = Box::new(ResilienceError::Timeout { timeout: Duration::from_secs(1) });
        let typed = ResilienceError::from_boxed(boxed);
        assert!(matches!(typed, ResilienceError::Timeout { .. }));
        assert!(typed.is_rejection());
    }

    /// Operation failures keep their identity through `Failed`.
    #[test]
    fn test_failed_is_transparent() {
        let boxed: BoxError = Box::new(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        let typed = ResilienceError::from_boxed(boxed);
        assert_eq!(typed.to_string(), "reset");
        assert!(!typed.is_rejection());

        let back = typed.boxed();
        let io_err = back.downcast_ref::<io::Error>().expect("original error preserved");
        assert_eq!(io_err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[test]
    fn test_rejections_are_retryable_warnings() {
        let err = ResilienceError::BulkheadRejected { limit: 2, queue: 0 };
        assert!(err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Warning);
        assert!(err.to_string().contains("2 concurrent"));
    }
}
