//! Classification propagator
//!
//! Maps interface-level classifications onto the call-adapter methods that
//! calls are actually intercepted on.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};

use callguard_domain::constants::INFRASTRUCTURE_INTERFACES;
use callguard_domain::{CallGuardError, Classification, MethodKey, OperationId, Result};
use tracing::{debug, instrument, warn};

use super::classifier::Classifications;
use super::ports::AdapterCatalog;

/// Classification resolved for one adapter method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterClassification {
    /// Interface operation the classification was derived from
    pub operation: OperationId,
    pub classification: Classification,
}

/// Adapter method → classification, the map consulted at call time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Propagation {
    by_method: BTreeMap<MethodKey, AdapterClassification>,
    unguarded: Vec<OperationId>,
}

impl Propagation {
    pub fn get(&self, method: &MethodKey) -> Option<&AdapterClassification> {
        self.by_method.get(method)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MethodKey, &AdapterClassification)> {
        self.by_method.iter()
    }

    pub fn len(&self) -> usize {
        self.by_method.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_method.is_empty()
    }

    /// Classified operations whose interface has no call adapter
    pub fn unguarded(&self) -> &[OperationId] {
        &self.unguarded
    }
}

/// Copies classifications from interface operations to adapter methods
pub struct ClassificationPropagator<'a, A: ?Sized> {
    adapters: &'a A,
    strict: bool,
    skipped: HashSet<String>,
}

impl<'a, A> ClassificationPropagator<'a, A>
where
    A: AdapterCatalog + ?Sized,
{
    pub fn new(adapters: &'a A) -> Self {
        Self {
            adapters,
            strict: false,
            skipped: INFRASTRUCTURE_INTERFACES.iter().map(|name| (*name).to_string()).collect(),
        }
    }

    /// Treat a classified interface without adapters as an error
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Skip additional infrastructure-only interfaces
    pub fn skip_interfaces<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skipped.extend(names.into_iter().map(Into::into));
        self
    }

    /// Resolve every classified operation to its adapter methods
    ///
    /// An operation whose interface no adapter implements stays unguarded.
    /// That is logged, or returned as [`CallGuardError::NoAdapter`] in
    /// strict mode. Operations of infrastructure interfaces are never
    /// propagated.
    ///
    /// # Errors
    /// [`CallGuardError::ConflictingClassifications`] when one adapter
    /// method is declared by two interfaces with different classifications.
    #[instrument(skip_all, fields(operations = classifications.len(), strict = self.strict))]
    pub fn propagate(&self, classifications: &Classifications) -> Result<Propagation> {
        let mut propagation = Propagation::default();

        for (operation, classification) in classifications.iter() {
            if self.skipped.contains(operation.interface.as_str()) {
                debug!(operation = %operation, "infrastructure interface, not propagated");
                continue;
            }

            let mut implemented = false;
            for adapter in self.adapters.implementing(&operation.interface) {
                implemented = true;
                match adapter.method_key(&operation.signature) {
                    Some(key) => record(&mut propagation.by_method, key, operation, classification)?,
                    None => debug!(
                        adapter = %adapter.name,
                        operation = %operation,
                        "adapter has no method with this signature"
                    ),
                }
            }

            if !implemented {
                if self.strict {
                    return Err(CallGuardError::NoAdapter {
                        interface: operation.interface.clone(),
                        method: operation.signature.to_string(),
                    });
                }
                warn!(operation = %operation, "no call adapter implements interface, operation left unguarded");
                propagation.unguarded.push(operation.clone());
            }
        }

        Ok(propagation)
    }
}

/// Insert one adapter method's classification
///
/// The first operation to reach a method keeps it when a second one agrees.
fn record(
    by_method: &mut BTreeMap<MethodKey, AdapterClassification>,
    key: MethodKey,
    operation: &OperationId,
    classification: Classification,
) -> Result<()> {
    match by_method.entry(key) {
        Entry::Vacant(slot) => {
            debug!(method = %slot.key(), %classification, "classification propagated");
            slot.insert(AdapterClassification { operation: operation.clone(), classification });
        }
        Entry::Occupied(existing) if existing.get().classification == classification => {
            debug!(
                method = %existing.key(),
                kept = %existing.get().operation,
                ignored = %operation,
                "method declared by several interfaces with one classification"
            );
        }
        Entry::Occupied(existing) => {
            let first = existing.get();
            return Err(CallGuardError::ConflictingClassifications {
                method: existing.key().to_string(),
                first: format!("{} ({})", first.operation, first.classification),
                second: format!("{operation} ({classification})"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use callguard_domain::{
        AdapterSet, CallAdapter, InterfaceGraph, InterfaceNode, MethodDecl, MethodSignature, Verb,
    };

    use super::super::classifier::OperationClassifier;
    use super::*;

    fn classified() -> Classifications {
        let graph = InterfaceGraph::from_nodes([
            InterfaceNode::new("Orders")
                .method(MethodDecl::new("list").verb(Verb::Get))
                .method(MethodDecl::new("create").verb(Verb::Post).param("Order")),
            InterfaceNode::new("Audit").method(MethodDecl::new("record").verb(Verb::Post)),
        ]);
        OperationClassifier::new(&graph).classify(&["Orders", "Audit"]).expect("classify")
    }

    fn adapters() -> AdapterSet {
        AdapterSet::from_adapters([
            CallAdapter::new("OrdersClient")
                .implementing("Orders")
                .method(MethodSignature::new("list"))
                .method(MethodSignature::with_params("create", ["Order"])),
            CallAdapter::new("OrdersMirror").implementing("Orders").method(MethodSignature::new("list")),
        ])
    }

    #[test]
    fn test_every_implementing_adapter_receives_classification() {
        let propagation = ClassificationPropagator::new(&adapters()).propagate(&classified()).expect("ok");

        let primary = MethodKey::new("OrdersClient", MethodSignature::new("list"));
        let mirror = MethodKey::new("OrdersMirror", MethodSignature::new("list"));
        assert_eq!(propagation.get(&primary).map(|c| c.classification), Some(Classification::Idempotent));
        assert_eq!(propagation.get(&mirror).map(|c| c.classification), Some(Classification::Idempotent));

        let create = MethodKey::new("OrdersClient", MethodSignature::with_params("create", ["Order"]));
        assert_eq!(propagation.get(&create).map(|c| c.classification), Some(Classification::NonIdempotent));
        assert_eq!(propagation.len(), 3);
    }

    /// Interfaces without adapters fail open.
    #[test]
    fn test_missing_adapter_left_unguarded() {
        let propagation = ClassificationPropagator::new(&adapters()).propagate(&classified()).expect("ok");
        assert_eq!(propagation.unguarded().len(), 1);
        assert_eq!(propagation.unguarded()[0].interface, "Audit");
    }

    #[test]
    fn test_missing_adapter_rejected_in_strict_mode() {
        let err = ClassificationPropagator::new(&adapters())
            .strict(true)
            .propagate(&classified())
            .expect_err("strict");
        assert!(matches!(err, CallGuardError::NoAdapter { interface, .. } if interface == "Audit"));
    }

    fn shared_signature(beta_verb: Verb) -> (Classifications, AdapterSet) {
        let graph = InterfaceGraph::from_nodes([
            InterfaceNode::new("Alpha")
                .method(MethodDecl::new("sync").verb(Verb::Get).returns("String").asynchronous()),
            InterfaceNode::new("Beta").method(MethodDecl::new("sync").verb(beta_verb).returns("u64")),
        ]);
        let classified = OperationClassifier::new(&graph).classify(&["Alpha", "Beta"]).expect("classify");
        let adapters = AdapterSet::from_adapters([CallAdapter::new("Client")
            .implementing("Alpha")
            .implementing("Beta")
            .method(MethodSignature::new("sync"))]);
        (classified, adapters)
    }

    #[test]
    fn test_method_shared_by_disagreeing_interfaces_rejected() {
        let (classified, adapters) = shared_signature(Verb::Post);

        let err = ClassificationPropagator::new(&adapters).propagate(&classified).expect_err("conflict");

        match err {
            CallGuardError::ConflictingClassifications { method, first, second } => {
                assert_eq!(method, "Client#sync()");
                assert!(first.starts_with("Alpha::sync()"));
                assert!(second.starts_with("Beta::sync()"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_method_shared_by_agreeing_interfaces_keeps_first_operation() {
        let (classified, adapters) = shared_signature(Verb::Put);

        let propagation = ClassificationPropagator::new(&adapters).propagate(&classified).expect("ok");

        let resolved = propagation.get(&MethodKey::new("Client", MethodSignature::new("sync"))).expect("resolved");
        assert_eq!(resolved.operation.interface, "Alpha");
        assert_eq!(resolved.classification, Classification::Idempotent);
        assert_eq!(propagation.len(), 1);
    }

    #[test]
    fn test_infrastructure_operations_not_propagated() {
        let graph = InterfaceGraph::from_nodes([
            InterfaceNode::new("Closeable").method(MethodDecl::new("close").verb(Verb::Delete)),
            InterfaceNode::new("Session").method(MethodDecl::new("close").verb(Verb::Post)),
        ]);
        let classified =
            OperationClassifier::new(&graph).classify(&["Closeable", "Session"]).expect("classify");
        let adapters = AdapterSet::from_adapters([CallAdapter::new("SessionClient")
            .implementing("Closeable")
            .implementing("Session")
            .method(MethodSignature::new("close"))]);

        let propagation = ClassificationPropagator::new(&adapters).propagate(&classified).expect("ok");

        let close = propagation.get(&MethodKey::new("SessionClient", MethodSignature::new("close"))).expect("close");
        assert_eq!(close.operation.interface, "Session");
        assert_eq!(close.classification, Classification::NonIdempotent);
        assert!(propagation.unguarded().is_empty());
    }
}
