//! Invocation interceptor
//!
//! The dispatch table maps every marked adapter method to either a
//! pass-through slot or a guarded slot. It is built once from the marker
//! table and the registry; afterwards the only mutation is the one-time
//! compilation of each guarded slot's policy on its first call.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use callguard_common::resilience::BoxError;
use callguard_domain::{CallGuardError, GroupMarker, MarkerTable, MethodKey};
use once_cell::sync::OnceCell;
use tracing::{debug, instrument, trace, warn};

use crate::policy::{CompiledPolicy, PolicyGroup, Shape};
use crate::registry::PolicyGroupRegistry;

enum Slot {
    /// No policy group of the marker's name exists
    PassThrough,
    Guarded(Guarded),
}

struct Guarded {
    marker: GroupMarker,
    group: PolicyGroup,
    compiled: OnceCell<Arc<CompiledPolicy>>,
}

impl Guarded {
    fn shape(&self) -> Shape {
        Shape::from_async(self.marker.is_async)
    }

    /// Policy for this call site, compiled on first use
    ///
    /// Concurrent first calls block on a single initialization, so every
    /// caller sees the same instance.
    fn policy(&self, invoked: Shape) -> Result<&Arc<CompiledPolicy>, BoxError> {
        let expected = self.shape();
        if invoked != expected {
            return Err(Box::new(CallGuardError::ShapeMismatch {
                method: self.marker.group_key.clone(),
                expected: expected.to_string(),
                actual: invoked.to_string(),
            }));
        }

        self.compiled
            .get_or_try_init(|| {
                let compiled = self
                    .group
                    .compile(expected, self.marker.result_type.clone())
                    .map_err(|err| CallGuardError::InvalidPolicy {
                        group: self.marker.group_name.clone(),
                        message: err.to_string(),
                    })?;
                debug!(
                    method = %self.marker.group_key,
                    group = %self.marker.group_name,
                    shape = %expected,
                    "policy compiled for call site"
                );
                Ok::<_, CallGuardError>(Arc::new(compiled))
            })
            .map_err(|err| Box::new(err) as BoxError)
    }
}

/// Per-call-site dispatcher applying policy groups to adapter calls
pub struct Interceptor {
    slots: HashMap<MethodKey, Slot>,
}

impl Interceptor {
    /// Build the dispatch table
    ///
    /// A method carrying several markers uses the first one. Markers naming
    /// a group the registry does not know become pass-through slots.
    #[instrument(skip_all, fields(methods = markers.len(), groups = registry.len()))]
    pub fn new(markers: &MarkerTable, registry: &PolicyGroupRegistry) -> Self {
        let mut slots = HashMap::with_capacity(markers.len());
        let mut guarded = 0usize;

        for (method, active) in markers.iter() {
            let Some(marker) = active.first() else { continue };
            if active.len() > 1 {
                warn!(method = %method, markers = active.len(), "several policy markers, using the first");
            }

            let slot = match registry.get(&marker.group_name) {
                Some(group) => {
                    guarded += 1;
                    Slot::Guarded(Guarded { marker: marker.clone(), group, compiled: OnceCell::new() })
                }
                None => {
                    trace!(method = %method, group = %marker.group_name, "no such policy group, passing through");
                    Slot::PassThrough
                }
            };
            slots.insert(method.clone(), slot);
        }

        debug!(slots = slots.len(), guarded, "dispatch table built");
        Self { slots }
    }

    /// Invoke a synchronous adapter method
    ///
    /// Unguarded methods run `operation` exactly once and return its result
    /// unchanged. Guarded methods run it under their compiled policy; a
    /// failure escaping the policy is the box the operation returned.
    pub fn invoke<T, F>(&self, method: &MethodKey, mut operation: F) -> Result<T, BoxError>
    where
        F: FnMut() -> Result<T, BoxError>,
    {
        match self.slots.get(method) {
            Some(Slot::Guarded(guarded)) => guarded.policy(Shape::Sync)?.call(operation),
            Some(Slot::PassThrough) | None => operation(),
        }
    }

    /// Invoke an asynchronous adapter method
    ///
    /// `operation` produces a fresh future per attempt.
    pub async fn invoke_async<T, F, Fut>(&self, method: &MethodKey, mut operation: F) -> Result<T, BoxError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        match self.slots.get(method) {
            Some(Slot::Guarded(guarded)) => {
                let policy = guarded.policy(Shape::Async)?;
                policy.execute(operation).await
            }
            Some(Slot::PassThrough) | None => operation().await,
        }
    }

    /// Whether calls to `method` run under a policy
    pub fn is_guarded(&self, method: &MethodKey) -> bool {
        matches!(self.slots.get(method), Some(Slot::Guarded(_)))
    }

    /// Marker a guarded method dispatches on
    pub fn marker(&self, method: &MethodKey) -> Option<&GroupMarker> {
        match self.slots.get(method)? {
            Slot::Guarded(guarded) => Some(&guarded.marker),
            Slot::PassThrough => None,
        }
    }

    /// Policy already compiled for `method`, if its first call happened
    pub fn compiled(&self, method: &MethodKey) -> Option<Arc<CompiledPolicy>> {
        match self.slots.get(method)? {
            Slot::Guarded(guarded) => guarded.compiled.get().cloned(),
            Slot::PassThrough => None,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guarded = self.slots.values().filter(|slot| matches!(slot, Slot::Guarded(_))).count();
        f.debug_struct("Interceptor")
            .field("slots", &self.slots.len())
            .field("guarded", &guarded)
            .finish()
    }
}
