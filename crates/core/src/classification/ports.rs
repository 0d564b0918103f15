//! Port interfaces for the static classification phase
//!
//! The classifier, propagator and attacher never own metadata. They read the
//! call-interface graph and the call adapters through these traits and write
//! markers through [`MarkerStore`], so any metadata facility can back them.

use callguard_domain::{
    AdapterSet, CallAdapter, GroupMarker, InterfaceGraph, InterfaceNode, MarkerTable, MethodKey,
};

/// Read access to declared call interfaces
pub trait InterfaceGraphSource {
    /// Look up an interface by name
    fn interface(&self, name: &str) -> Option<&InterfaceNode>;

    /// The interface a method returns, if that return type is a traversable
    /// graph node
    ///
    /// Built-in and undeclared types are terminal and yield `None`.
    fn sub_resource(&self, return_type: &str) -> Option<&InterfaceNode>;
}

/// Enumerates the concrete call adapters that calls are intercepted on
pub trait AdapterCatalog {
    /// Adapters implementing the given interface, in registration order
    fn implementing<'a>(&'a self, interface: &str) -> Box<dyn Iterator<Item = &'a CallAdapter> + 'a>;

    /// Every adapter, in registration order
    fn adapters<'a>(&'a self) -> Box<dyn Iterator<Item = &'a CallAdapter> + 'a>;
}

/// Attach and query policy-group markers on adapter methods
pub trait MarkerStore {
    fn attach(&mut self, method: MethodKey, marker: GroupMarker);

    /// Active markers on a method, in attachment order
    fn markers(&self, method: &MethodKey) -> &[GroupMarker];
}

impl InterfaceGraphSource for InterfaceGraph {
    fn interface(&self, name: &str) -> Option<&InterfaceNode> {
        self.by_name(name)
    }

    fn sub_resource(&self, return_type: &str) -> Option<&InterfaceNode> {
        self.node_for_return(return_type).and_then(|id| self.get(id))
    }
}

impl AdapterCatalog for AdapterSet {
    fn implementing<'a>(&'a self, interface: &str) -> Box<dyn Iterator<Item = &'a CallAdapter> + 'a> {
        Box::new(AdapterSet::implementing(self, interface))
    }

    fn adapters<'a>(&'a self) -> Box<dyn Iterator<Item = &'a CallAdapter> + 'a> {
        Box::new(self.iter())
    }
}

impl MarkerStore for MarkerTable {
    fn attach(&mut self, method: MethodKey, marker: GroupMarker) {
        MarkerTable::attach(self, method, marker);
    }

    fn markers(&self, method: &MethodKey) -> &[GroupMarker] {
        MarkerTable::markers(self, method)
    }
}
