//! Shared test helpers for `callguard-core` integration tests.
//!
//! Fixtures build a small interface graph with a matching call adapter, and
//! `FlakyBackend` counts the calls that actually reach the backend.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use callguard_common::resilience::BoxError;
use callguard_domain::{
    AdapterSet, CallAdapter, InterfaceGraph, InterfaceNode, MethodDecl, MethodKey, MethodSignature,
};

/// Failure returned by [`FlakyBackend`] before it recovers
#[derive(Debug, thiserror::Error)]
#[error("backend unavailable (attempt {attempt})")]
pub struct BackendError {
    pub attempt: u32,
}

/// Backend that fails a fixed number of times, then succeeds
#[derive(Clone, Default)]
pub struct FlakyBackend {
    calls: Arc<AtomicU32>,
    failures: u32,
}

impl FlakyBackend {
    pub fn failing_times(failures: u32) -> Self {
        Self { calls: Arc::new(AtomicU32::new(0)), failures }
    }

    pub fn always_failing() -> Self {
        Self::failing_times(u32::MAX)
    }

    /// Calls that reached the backend
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call(&self) -> Result<String, BoxError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            Err(Box::new(BackendError { attempt }))
        } else {
            Ok(format!("ok after {attempt}"))
        }
    }

    pub async fn call_async(&self) -> Result<String, BoxError> {
        tokio::task::yield_now().await;
        self.call()
    }
}

/// One interface implemented by one adapter exposing every declared method
pub fn single_interface(
    interface: &str,
    adapter: &str,
    methods: impl IntoIterator<Item = MethodDecl>,
) -> (InterfaceGraph, AdapterSet) {
    let mut node = InterfaceNode::new(interface);
    let mut call_adapter = CallAdapter::new(adapter).implementing(interface);
    for method in methods {
        call_adapter = call_adapter.method(method.signature.clone());
        node = node.method(method);
    }
    (InterfaceGraph::from_nodes([node]), AdapterSet::from_adapters([call_adapter]))
}

pub fn key(adapter: &str, method: &str) -> MethodKey {
    MethodKey::new(adapter, MethodSignature::new(method))
}

pub fn init_tracing() {
    callguard_common::observability::init_tracing();
}
