//! Domain constants
//!
//! Centralized location for group names, marker keys and environment
//! variable names used throughout callguard.

// Built-in policy group names
pub const IDEMPOTENT_GROUP: &str = "idempotent";
pub const NON_IDEMPOTENT_GROUP: &str = "nonIdempotent";

/// Priority assigned to producers that do not declare one
pub const DEFAULT_PRODUCER_PRIORITY: i32 = 10;

/// Resource-disposal contracts the metadata attacher never matches against
pub const INFRASTRUCTURE_INTERFACES: &[&str] = &["Closeable", "AutoCloseable", "Drop"];

/// Separator between adapter name and method signature in a group key
pub const GROUP_KEY_SEPARATOR: char = '#';

// Environment variables
pub const ENV_CONFIG_PATH: &str = "CALLGUARD_CONFIG";
pub const ENV_STRICT_ADAPTERS: &str = "CALLGUARD_STRICT_ADAPTERS";
