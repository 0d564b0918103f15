//! # callguard domain
//!
//! Data model for idempotency classification and policy-group dispatch.
//!
//! This crate contains:
//! - Verbs, classifications and explicit override markers
//! - The call-interface graph arena and call-adapter descriptions
//! - Policy-group markers attached to adapter methods
//! - Configuration structures
//! - Domain error types and Result definitions
//!
//! ## Architecture
//! - No dependencies on other callguard crates
//! - Only external dependencies allowed
//! - Pure data structures, no I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
