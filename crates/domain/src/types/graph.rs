//! Call-interface graph
//!
//! Interfaces are stored in an arena and referenced by [`InterfaceId`].
//! Edges are implicit: a method whose return type names another declared
//! interface is a sub-resource edge. The graph may contain cycles.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::operation::{IdempotencyOverride, MethodSignature, OperationId, Verb};

/// Type names that are never graph nodes, even if an interface of the same
/// name was declared.
const BUILTIN_TYPES: &[&str] = &[
    "()", "bool", "char", "str", "String", "i8", "i16", "i32", "i64", "i128", "isize", "u8",
    "u16", "u32", "u64", "u128", "usize", "f32", "f64", "Vec", "Option", "Bytes", "Value",
];

/// Arena index of an interface node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceId(usize);

impl InterfaceId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A method declared on a call interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub signature: MethodSignature,
    #[serde(default)]
    pub verb: Option<Verb>,
    /// Explicit idempotency markers, in declaration order
    #[serde(default)]
    pub overrides: Vec<IdempotencyOverride>,
    /// Explicit policy group name replacing the classification default
    #[serde(default)]
    pub group: Option<String>,
    pub return_type: String,
    #[serde(default)]
    pub is_async: bool,
}

impl MethodDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            signature: MethodSignature::new(name),
            verb: None,
            overrides: Vec::new(),
            group: None,
            return_type: "()".to_string(),
            is_async: false,
        }
    }

    pub fn param(mut self, type_name: impl Into<String>) -> Self {
        self.signature.params.push(type_name.into());
        self
    }

    pub fn verb(mut self, verb: Verb) -> Self {
        self.verb = Some(verb);
        self
    }

    pub fn overriding(mut self, marker: IdempotencyOverride) -> Self {
        self.overrides.push(marker);
        self
    }

    pub fn group(mut self, name: impl Into<String>) -> Self {
        self.group = Some(name.into());
        self
    }

    pub fn returns(mut self, type_name: impl Into<String>) -> Self {
        self.return_type = type_name.into();
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }
}

/// An interface type with its declared methods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceNode {
    pub name: String,
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
}

impl InterfaceNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), methods: Vec::new() }
    }

    pub fn method(mut self, method: MethodDecl) -> Self {
        self.methods.push(method);
        self
    }

    pub fn find_method(&self, signature: &MethodSignature) -> Option<&MethodDecl> {
        self.methods.iter().find(|m| &m.signature == signature)
    }

    pub fn operation_id(&self, method: &MethodDecl) -> OperationId {
        OperationId::new(self.name.clone(), method.signature.clone())
    }
}

/// Arena of interface nodes indexed by name
#[derive(Debug, Clone, Default)]
pub struct InterfaceGraph {
    nodes: Vec<InterfaceNode>,
    index: HashMap<String, InterfaceId>,
}

impl InterfaceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a list of nodes (later duplicates replace earlier)
    pub fn from_nodes(nodes: impl IntoIterator<Item = InterfaceNode>) -> Self {
        let mut graph = Self::new();
        for node in nodes {
            graph.insert(node);
        }
        graph
    }

    /// Insert a node, replacing any node already declared under that name
    pub fn insert(&mut self, node: InterfaceNode) -> InterfaceId {
        if let Some(&id) = self.index.get(&node.name) {
            self.nodes[id.0] = node;
            return id;
        }
        let id = InterfaceId(self.nodes.len());
        self.index.insert(node.name.clone(), id);
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: InterfaceId) -> Option<&InterfaceNode> {
        self.nodes.get(id.0)
    }

    pub fn id_of(&self, name: &str) -> Option<InterfaceId> {
        self.index.get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<&InterfaceNode> {
        self.id_of(name).and_then(|id| self.get(id))
    }

    /// Resolve a return type to a traversable node
    ///
    /// Returns `None` for built-in types and for names that were never
    /// declared as interfaces (terminal types).
    pub fn node_for_return(&self, type_name: &str) -> Option<InterfaceId> {
        if is_builtin(type_name) {
            return None;
        }
        self.id_of(type_name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (InterfaceId, &InterfaceNode)> {
        self.nodes.iter().enumerate().map(|(i, node)| (InterfaceId(i), node))
    }
}

fn is_builtin(type_name: &str) -> bool {
    let base = type_name.split('<').next().unwrap_or(type_name).trim();
    BUILTIN_TYPES.contains(&base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let mut graph = InterfaceGraph::new();
        let id = graph.insert(InterfaceNode::new("Orders"));
        assert_eq!(graph.id_of("Orders"), Some(id));
        assert_eq!(graph.get(id).map(|n| n.name.as_str()), Some("Orders"));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_insert_same_name_replaces_node() {
        let mut graph = InterfaceGraph::new();
        let first = graph.insert(InterfaceNode::new("Orders"));
        let second = graph.insert(
            InterfaceNode::new("Orders").method(MethodDecl::new("list").verb(Verb::Get)),
        );
        assert_eq!(first, second);
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.by_name("Orders").map(|n| n.methods.len()), Some(1));
    }

    #[test]
    fn test_builtin_return_types_are_terminal() {
        let graph = InterfaceGraph::from_nodes([InterfaceNode::new("String")]);
        assert_eq!(graph.node_for_return("String"), None);
        assert_eq!(graph.node_for_return("Vec<Order>"), None);
        assert_eq!(graph.node_for_return("Undeclared"), None);
    }

    #[test]
    fn test_declared_interface_return_is_traversable() {
        let graph = InterfaceGraph::from_nodes([InterfaceNode::new("Items")]);
        assert_eq!(graph.node_for_return("Items"), graph.id_of("Items"));
    }

    #[test]
    fn test_method_builder() {
        let method = MethodDecl::new("update")
            .param("u64")
            .verb(Verb::Put)
            .overriding(IdempotencyOverride::NonIdempotent)
            .returns("Order")
            .asynchronous();
        assert_eq!(method.signature.to_string(), "update(u64)");
        assert_eq!(method.overrides, vec![IdempotencyOverride::NonIdempotent]);
        assert!(method.is_async);
    }

    #[test]
    fn test_node_deserializes_from_json() {
        let json = r#"{
            "name": "Orders",
            "methods": [
                { "signature": { "name": "list" }, "verb": "GET", "return_type": "String" },
                { "signature": { "name": "create", "params": ["Order"] }, "verb": "POST",
                  "overrides": ["idempotent"], "return_type": "String", "is_async": true }
            ]
        }"#;
        let node: InterfaceNode = serde_json::from_str(json).expect("node should deserialize");
        assert_eq!(node.methods[0].verb, Some(Verb::Get));
        assert_eq!(node.methods[1].overrides, vec![IdempotencyOverride::Idempotent]);
        assert!(node.methods[1].is_async);
    }
}
