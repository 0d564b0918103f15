//! Static-phase orchestrator
//!
//! [`CallGuard::builder`] runs classification, propagation, marker
//! attachment and dispatch-table construction exactly once. The resulting
//! [`CallGuard`] is frozen: nothing in it changes after `build` returns
//! except the lazily compiled policies inside the interceptor.

use callguard_domain::constants::{IDEMPOTENT_GROUP, NON_IDEMPOTENT_GROUP};
use callguard_domain::{
    AdapterSet, CallGuardError, GuardConfig, InterfaceGraph, MarkerTable, Result,
};
use tracing::{info, instrument};

use crate::classification::{
    Classifications, ClassificationPropagator, MetadataAttacher, OperationClassifier, Propagation,
};
use crate::interceptor::Interceptor;
use crate::registry::PolicyGroupRegistry;

/// Frozen result of the static phase
#[derive(Debug)]
pub struct CallGuard {
    classification: Classifications,
    propagation: Propagation,
    markers: MarkerTable,
    interceptor: Interceptor,
}

impl CallGuard {
    pub fn builder() -> CallGuardBuilder {
        CallGuardBuilder::default()
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    pub fn classification(&self) -> &Classifications {
        &self.classification
    }

    pub fn propagation(&self) -> &Propagation {
        &self.propagation
    }

    pub fn markers(&self) -> &MarkerTable {
        &self.markers
    }
}

/// Inputs of the static phase
#[derive(Default)]
pub struct CallGuardBuilder {
    graph: InterfaceGraph,
    roots: Vec<String>,
    adapters: AdapterSet,
    registry: Option<PolicyGroupRegistry>,
    config: GuardConfig,
}

impl CallGuardBuilder {
    pub fn graph(mut self, graph: InterfaceGraph) -> Self {
        self.graph = graph;
        self
    }

    /// Interfaces traversal starts from
    pub fn roots<I, S>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roots.extend(roots.into_iter().map(Into::into));
        self
    }

    pub fn adapters(mut self, adapters: AdapterSet) -> Self {
        self.adapters = adapters;
        self
    }

    /// Registry to resolve group names against (built-ins when unset)
    pub fn registry(mut self, registry: PolicyGroupRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(mut self, config: GuardConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the static phase
    ///
    /// # Errors
    /// - [`CallGuardError::UnknownInterface`] for an undeclared root
    /// - [`CallGuardError::ConflictingOverrides`] for a method carrying
    ///   both override markers
    /// - [`CallGuardError::ConflictingClassifications`] when an adapter
    ///   method is declared by two interfaces that classify it differently
    /// - [`CallGuardError::NoAdapter`] in strict mode
    /// - [`CallGuardError::UnknownGroup`] when a method names a group no
    ///   producer provides
    #[instrument(skip_all, fields(roots = self.roots.len(), adapters = self.adapters.len()))]
    pub fn build(self) -> Result<CallGuard> {
        let registry = self.registry.unwrap_or_else(PolicyGroupRegistry::with_builtins);

        let classification = OperationClassifier::new(&self.graph).classify(&self.roots)?;
        let propagation = ClassificationPropagator::new(&self.adapters)
            .strict(self.config.strict_adapters)
            .skip_interfaces(self.config.infrastructure_interfaces.iter().cloned())
            .propagate(&classification)?;

        check_group_names(&classification, &self.graph, &registry)?;

        let mut markers = MarkerTable::new();
        let attached = MetadataAttacher::new(&self.graph, &self.adapters)
            .skip_interfaces(self.config.infrastructure_interfaces.iter().cloned())
            .attach(&propagation, &mut markers);

        let interceptor = Interceptor::new(&markers, &registry);
        info!(
            operations = classification.len(),
            adapter_methods = propagation.len(),
            markers = attached,
            unguarded = propagation.unguarded().len(),
            "call guard ready"
        );

        Ok(CallGuard { classification, propagation, markers, interceptor })
    }
}

/// Explicit group names must resolve; the built-in names may stay unbound
fn check_group_names(
    classification: &Classifications,
    graph: &InterfaceGraph,
    registry: &PolicyGroupRegistry,
) -> Result<()> {
    for (operation, _) in classification.iter() {
        let Some(decl) = graph.by_name(&operation.interface).and_then(|node| node.find_method(&operation.signature))
        else {
            continue;
        };
        let Some(group) = &decl.group else { continue };
        if group == IDEMPOTENT_GROUP || group == NON_IDEMPOTENT_GROUP || registry.contains(group) {
            continue;
        }
        return Err(CallGuardError::UnknownGroup {
            interface: operation.interface.clone(),
            method: operation.signature.to_string(),
            group: group.clone(),
        });
    }
    Ok(())
}
