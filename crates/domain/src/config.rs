//! Configuration structures
//!
//! Loaded by `callguard_core::config` from environment variables and
//! TOML/JSON files. Every field is optional in the file; omitted stage
//! options fall back to the policy engine defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level callguard configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Fail the static phase when a classified interface has no adapter
    pub strict_adapters: bool,
    /// Interfaces skipped by the metadata attacher, in addition to the
    /// built-in resource-disposal contracts
    pub infrastructure_interfaces: Vec<String>,
    /// Declaratively configured policy groups, by name
    pub groups: BTreeMap<String, GroupConfig>,
}

/// One configured policy group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    pub priority: Option<i32>,
    pub description: Option<String>,
    pub retry: Option<RetrySettings>,
    pub circuit_breaker: Option<CircuitBreakerSettings>,
    pub bulkhead: Option<BulkheadSettings>,
    pub timeout: Option<TimeoutSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: Option<u32>,
    pub delay_ms: Option<u64>,
    pub max_duration_ms: Option<u64>,
    pub jitter_ms: Option<u64>,
    pub backoff: Option<BackoffSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffSettings {
    Exponential {
        #[serde(default)]
        factor: Option<u32>,
        #[serde(default)]
        max_delay_ms: Option<u64>,
    },
    Fibonacci {
        #[serde(default)]
        max_delay_ms: Option<u64>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub delay_ms: Option<u64>,
    pub request_volume_threshold: Option<u32>,
    pub failure_ratio: Option<f64>,
    pub success_threshold: Option<u32>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkheadSettings {
    pub limit: Option<usize>,
    pub queue_size: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub duration_ms: Option<u64>,
}
