//! Tracing bootstrap
//!
//! Library code only emits `tracing` events; binaries and test harnesses
//! call [`init_tracing`] (or [`try_init_tracing`]) once to install a fmt
//! subscriber filtered by the `CALLGUARD_LOG` environment variable.

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directives
pub const ENV_LOG_FILTER: &str = "CALLGUARD_LOG";

/// Filter used when `CALLGUARD_LOG` is unset or invalid
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Build the env filter from `CALLGUARD_LOG`, falling back to `info`
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(ENV_LOG_FILTER).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Install the global fmt subscriber
///
/// # Errors
/// Returns an error if a global subscriber is already installed.
pub fn try_init_tracing() -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry().with(env_filter()).with(fmt::layer().with_target(true)).try_init()
}

/// Install the global fmt subscriber, ignoring an already-installed one
pub fn init_tracing() {
    if try_init_tracing().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
