//! Static classification phase
//!
//! Runs once, before any call is intercepted:
//! 1. [`OperationClassifier`] derives a classification per interface operation
//! 2. [`ClassificationPropagator`] maps it onto call-adapter methods
//! 3. [`MetadataAttacher`] records a policy-group marker per adapter method

pub mod attacher;
pub mod classifier;
pub mod ports;
pub mod propagator;

pub use attacher::MetadataAttacher;
pub use classifier::{Classifications, OperationClassifier};
pub use ports::{AdapterCatalog, InterfaceGraphSource, MarkerStore};
pub use propagator::{AdapterClassification, ClassificationPropagator, Propagation};
