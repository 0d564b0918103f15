//! Metadata attacher
//!
//! Records each adapter method's classification as exactly one policy-group
//! marker that the dispatcher can query per call.

use std::collections::HashSet;

use callguard_domain::constants::INFRASTRUCTURE_INTERFACES;
use callguard_domain::{GroupMarker, MethodDecl, OperationId};
use tracing::{debug, instrument, warn};

use super::ports::{AdapterCatalog, InterfaceGraphSource, MarkerStore};
use super::propagator::Propagation;

/// Attaches policy-group markers to classified adapter methods
pub struct MetadataAttacher<'a, G: ?Sized, A: ?Sized> {
    graph: &'a G,
    adapters: &'a A,
    skipped: HashSet<String>,
}

impl<'a, G, A> MetadataAttacher<'a, G, A>
where
    G: InterfaceGraphSource + ?Sized,
    A: AdapterCatalog + ?Sized,
{
    pub fn new(graph: &'a G, adapters: &'a A) -> Self {
        Self {
            graph,
            adapters,
            skipped: INFRASTRUCTURE_INTERFACES.iter().map(|name| (*name).to_string()).collect(),
        }
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

    /// Attach one marker per classified adapter method
    ///
    /// Group, shape and result type all come from the interface operation
    /// the classification was propagated from. The marker names that
    /// operation's explicit group when it declares one, otherwise the
    /// default group of its classification. Returns the number of markers
    /// attached.
    #[instrument(skip_all, fields(classified = propagation.len()))]
    pub fn attach<M>(&self, propagation: &Propagation, store: &mut M) -> usize
    where
        M: MarkerStore + ?Sized,
    {
        let mut attached = 0;
        for adapter in self.adapters.adapters() {
            for signature in &adapter.methods {
                let Some(key) = adapter.method_key(signature) else { continue };
                let Some(resolved) = propagation.get(&key) else { continue };
                if self.skipped.contains(resolved.operation.interface.as_str()) {
                    debug!(method = %key, operation = %resolved.operation, "infrastructure interface, no marker");
                    continue;
                }
                let Some(decl) = self.declaration(&resolved.operation) else {
                    warn!(
                        method = %key,
                        operation = %resolved.operation,
                        "classified method has no declaration, no marker attached"
                    );
                    continue;
                };
                let group = match &decl.group {
                    Some(group) => group.clone(),
                    None => match GroupMarker::group_for(resolved.classification) {
                        Some(group) => group.to_string(),
                        None => {
                            warn!(method = %key, "classified method has no policy group, no marker attached");
                            continue;
                        }
                    },
                };

                let marker = GroupMarker {
                    group_name: group,
                    group_key: key.group_key(),
                    is_async: decl.is_async,
                    result_type: decl.return_type.clone(),
                };
                debug!(
                    method = %key,
                    group = %marker.group_name,
                    shape = marker.shape(),
                    "policy group marker attached"
                );
                store.attach(key, marker);
                attached += 1;
            }
        }
        attached
    }

    /// Declaration of the operation the method's classification came from
    fn declaration(&self, operation: &OperationId) -> Option<&'a MethodDecl> {
        let graph: &'a G = self.graph;
        graph.interface(&operation.interface).and_then(|node| node.find_method(&operation.signature))
    }
}

#[cfg(test)]
mod tests {
    use callguard_domain::constants::{IDEMPOTENT_GROUP, NON_IDEMPOTENT_GROUP};
    use callguard_domain::{
        AdapterSet, CallAdapter, IdempotencyOverride, InterfaceGraph, InterfaceNode, MarkerTable,
        MethodKey, MethodSignature, Verb,
    };

    use super::super::classifier::OperationClassifier;
    use super::super::propagator::ClassificationPropagator;
    use super::*;

    fn run(graph: &InterfaceGraph, adapters: &AdapterSet, roots: &[&str], extra_skip: &[&str]) -> MarkerTable {
        let classified = OperationClassifier::new(graph).classify(roots).expect("classify");
        let propagation = ClassificationPropagator::new(adapters).propagate(&classified).expect("propagate");
        let mut markers = MarkerTable::new();
        MetadataAttacher::new(graph, adapters)
            .skip_interfaces(extra_skip.iter().copied())
            .attach(&propagation, &mut markers);
        markers
    }

    #[test]
    fn test_markers_carry_group_shape_and_result_type() {
        let graph = InterfaceGraph::from_nodes([InterfaceNode::new("Orders")
            .method(MethodDecl::new("list").verb(Verb::Get).returns("Vec<Order>").asynchronous())
            .method(MethodDecl::new("create").verb(Verb::Post).returns("Order"))]);
        let adapters = AdapterSet::from_adapters([CallAdapter::new("OrdersClient")
            .implementing("Orders")
            .method(MethodSignature::new("list"))
            .method(MethodSignature::new("create"))]);

        let markers = run(&graph, &adapters, &["Orders"], &[]);

        let list = markers.markers(&MethodKey::new("OrdersClient", MethodSignature::new("list")));
        assert_eq!(
            list,
            [GroupMarker {
                group_name: IDEMPOTENT_GROUP.to_string(),
                group_key: "OrdersClient#list()".to_string(),
                is_async: true,
                result_type: "Vec<Order>".to_string(),
            }]
        );
        let create = markers.markers(&MethodKey::new("OrdersClient", MethodSignature::new("create")));
        assert_eq!(create[0].group_name, NON_IDEMPOTENT_GROUP);
        assert!(!create[0].is_async);
    }

    #[test]
    fn test_explicit_group_replaces_default_name() {
        let graph = InterfaceGraph::from_nodes([InterfaceNode::new("Payments").method(
            MethodDecl::new("charge")
                .verb(Verb::Post)
                .overriding(IdempotencyOverride::Idempotent)
                .group("payments-critical"),
        )]);
        let adapters = AdapterSet::from_adapters([CallAdapter::new("PaymentsClient")
            .implementing("Payments")
            .method(MethodSignature::new("charge"))]);

        let markers = run(&graph, &adapters, &["Payments"], &[]);
        let charge = markers.markers(&MethodKey::new("PaymentsClient", MethodSignature::new("charge")));
        assert_eq!(charge.len(), 1);
        assert_eq!(charge[0].group_name, "payments-critical");
    }

    /// Infrastructure interfaces never supply the declaration.
    #[test]
    fn test_infrastructure_interfaces_skipped() {
        let graph = InterfaceGraph::from_nodes([
            InterfaceNode::new("Closeable").method(MethodDecl::new("close").verb(Verb::Delete)),
            InterfaceNode::new("Session").method(MethodDecl::new("ping").verb(Verb::Get)),
            InterfaceNode::new("Orders").method(MethodDecl::new("list").verb(Verb::Get)),
        ]);
        let adapters = AdapterSet::from_adapters([CallAdapter::new("OrdersClient")
            .implementing("Closeable")
            .implementing("Session")
            .implementing("Orders")
            .method(MethodSignature::new("close"))
            .method(MethodSignature::new("ping"))
            .method(MethodSignature::new("list"))]);

        let markers = run(&graph, &adapters, &["Closeable", "Session", "Orders"], &["Session"]);
        assert!(markers.markers(&MethodKey::new("OrdersClient", MethodSignature::new("close"))).is_empty());
        assert!(markers.markers(&MethodKey::new("OrdersClient", MethodSignature::new("ping"))).is_empty());
        assert_eq!(markers.markers(&MethodKey::new("OrdersClient", MethodSignature::new("list"))).len(), 1);
    }

    /// The marker describes the same operation its classification came from,
    /// whatever order the adapter lists its interfaces in.
    #[test]
    fn test_marker_built_from_propagated_operation() {
        let graph = InterfaceGraph::from_nodes([
            InterfaceNode::new("Alpha")
                .method(MethodDecl::new("sync").verb(Verb::Get).returns("String").asynchronous()),
            InterfaceNode::new("Beta")
                .method(MethodDecl::new("sync").verb(Verb::Put).returns("u64").group("beta-writes")),
        ]);
        let adapters = AdapterSet::from_adapters([CallAdapter::new("Client")
            .implementing("Beta")
            .implementing("Alpha")
            .method(MethodSignature::new("sync"))]);

        let markers = run(&graph, &adapters, &["Alpha", "Beta"], &[]);

        let sync = markers.markers(&MethodKey::new("Client", MethodSignature::new("sync")));
        assert_eq!(
            sync,
            [GroupMarker {
                group_name: IDEMPOTENT_GROUP.to_string(),
                group_key: "Client#sync()".to_string(),
                is_async: true,
                result_type: "String".to_string(),
            }]
        );
    }
}
