//! Operation classifier
//!
//! Walks every interface reachable from the root interfaces and classifies
//! each verb operation as idempotent or not.

use std::collections::{BTreeMap, HashSet, VecDeque};

use callguard_domain::{
    CallGuardError, Classification, IdempotencyOverride, InterfaceNode, MethodDecl, OperationId,
    Result, Verb,
};
use tracing::{debug, instrument, trace};

use super::ports::InterfaceGraphSource;

/// Classification of every verb operation reachable from the roots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classifications {
    operations: BTreeMap<OperationId, Classification>,
    visited: Vec<String>,
}

impl Classifications {
    pub fn get(&self, operation: &OperationId) -> Option<Classification> {
        self.operations.get(operation).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OperationId, Classification)> {
        self.operations.iter().map(|(op, class)| (op, *class))
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Interfaces visited, in traversal order (each exactly once)
    pub fn visited(&self) -> &[String] {
        &self.visited
    }
}

/// Derives idempotency classifications from the call-interface graph
pub struct OperationClassifier<'a, G: ?Sized> {
    graph: &'a G,
}

impl<'a, G> OperationClassifier<'a, G>
where
    G: InterfaceGraphSource + ?Sized,
{
    pub fn new(graph: &'a G) -> Self {
        Self { graph }
    }

    /// Classify every operation reachable from `roots`
    ///
    /// Traversal uses a worklist and a visited set, so an interface reached
    /// through several sub-resource paths, or through a return-type cycle,
    /// is classified once.
    ///
    /// # Errors
    /// - [`CallGuardError::UnknownInterface`] if a root is not declared
    /// - [`CallGuardError::ConflictingOverrides`] if a method carries both
    ///   explicit markers
    #[instrument(skip_all, fields(roots = roots.len()))]
    pub fn classify<S: AsRef<str>>(&self, roots: &[S]) -> Result<Classifications> {
        let mut worklist: VecDeque<&InterfaceNode> = VecDeque::new();
        let mut queued: HashSet<&str> = HashSet::new();

        for root in roots {
            let root = root.as_ref();
            let node = self
                .graph
                .interface(root)
                .ok_or_else(|| CallGuardError::UnknownInterface(root.to_string()))?;
            if queued.insert(node.name.as_str()) {
                worklist.push_back(node);
            }
        }

        let mut result = Classifications::default();
        while let Some(node) = worklist.pop_front() {
            trace!(interface = %node.name, "classifying interface");
            result.visited.push(node.name.clone());

            for method in &node.methods {
                if let Some(verb) = method.verb {
                    let classification = classify_method(node, method, verb)?;
                    debug!(
                        interface = %node.name,
                        method = %method.signature,
                        %verb,
                        %classification,
                        "operation classified"
                    );
                    result.operations.insert(node.operation_id(method), classification);
                } else if let Some(next) = self.graph.sub_resource(&method.return_type) {
                    if queued.insert(next.name.as_str()) {
                        worklist.push_back(next);
                    }
                }
            }
        }

        debug!(
            interfaces = result.visited.len(),
            operations = result.operations.len(),
            "classification complete"
        );
        Ok(result)
    }
}

/// Explicit override if present, else the verb default
fn classify_method(node: &InterfaceNode, method: &MethodDecl, verb: Verb) -> Result<Classification> {
    let idempotent = method.overrides.contains(&IdempotencyOverride::Idempotent);
    let non_idempotent = method.overrides.contains(&IdempotencyOverride::NonIdempotent);
    match (idempotent, non_idempotent) {
        (true, true) => Err(CallGuardError::ConflictingOverrides {
            interface: node.name.clone(),
            method: method.signature.to_string(),
        }),
        (true, false) => Ok(Classification::Idempotent),
        (false, true) => Ok(Classification::NonIdempotent),
        (false, false) => Ok(verb.default_classification()),
    }
}
