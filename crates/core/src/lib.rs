//! # CallGuard Core
//!
//! Idempotency classification and policy-group dispatch.
//!
//! This crate contains:
//! - The static phase: operation classifier, classification propagator and
//!   metadata attacher (ports in [`classification::ports`])
//! - Policy groups: descriptors, the fluent builder and compilation
//! - The policy group registry and its producers
//! - The invocation interceptor (per-call-site dispatch table)
//! - Configuration loading and the [`CallGuard`] orchestrator
//!
//! ## Architecture Principles
//! - Depends on `callguard-domain` for data and `callguard-common` for the
//!   resilience engine
//! - Metadata is read and written through port traits
//! - The static phase runs once; the dispatch table is frozen afterwards

pub mod classification;
pub mod config;
pub mod guard;
pub mod interceptor;
pub mod policy;
pub mod registry;

pub use classification::{
    AdapterClassification, Classifications, ClassificationPropagator, MetadataAttacher,
    OperationClassifier, Propagation,
};
pub use config::ConfiguredGroupProducer;
pub use guard::{CallGuard, CallGuardBuilder};
pub use interceptor::Interceptor;
pub use policy::{CompiledPolicy, PolicyGroup, PolicyGroupBuilder, Shape};
pub use registry::{
    IdempotentGroupProducer, PolicyGroupProducer, PolicyGroupRegistry, RegistryBuilder,
    StaticGroupProducer,
};
