//! Domain types and models
//!
//! The static phase works over three kinds of data: the interface graph
//! (what callers declare), the call adapters (what actually runs), and the
//! markers tying each adapter method to a named policy group.

pub mod adapter;
pub mod graph;
pub mod marker;
pub mod operation;

pub use adapter::{AdapterSet, CallAdapter, MethodKey};
pub use graph::{InterfaceGraph, InterfaceId, InterfaceNode, MethodDecl};
pub use marker::{GroupMarker, MarkerTable};
pub use operation::{Classification, IdempotencyOverride, MethodSignature, OperationId, Verb};
