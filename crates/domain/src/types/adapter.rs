//! Call adapters: the concrete, intercepted implementations of interfaces

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::operation::MethodSignature;
use crate::constants::GROUP_KEY_SEPARATOR;

/// A generated wrapper implementing one or more call interfaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallAdapter {
    pub name: String,
    /// Implemented interfaces, in declaration order
    pub implements: Vec<String>,
    pub methods: Vec<MethodSignature>,
}

impl CallAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), implements: Vec::new(), methods: Vec::new() }
    }

    pub fn implementing(mut self, interface: impl Into<String>) -> Self {
        self.implements.push(interface.into());
        self
    }

    pub fn method(mut self, signature: MethodSignature) -> Self {
        self.methods.push(signature);
        self
    }

    pub fn implements(&self, interface: &str) -> bool {
        self.implements.iter().any(|i| i == interface)
    }

    pub fn method_key(&self, signature: &MethodSignature) -> Option<MethodKey> {
        self.methods
            .iter()
            .find(|m| *m == signature)
            .map(|m| MethodKey::new(self.name.clone(), m.clone()))
    }
}

/// Stable identity of one adapter method (one call site)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodKey {
    pub adapter: String,
    pub signature: MethodSignature,
}

impl MethodKey {
    pub fn new(adapter: impl Into<String>, signature: MethodSignature) -> Self {
        Self { adapter: adapter.into(), signature }
    }

    /// Group key recorded in markers: `<adapter>#<signature>`
    pub fn group_key(&self) -> String {
        format!("{}{}{}", self.adapter, GROUP_KEY_SEPARATOR, self.signature)
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.group_key())
    }
}

/// In-memory adapter catalog indexed by implemented interface
#[derive(Debug, Clone, Default)]
pub struct AdapterSet {
    adapters: Vec<CallAdapter>,
    by_interface: HashMap<String, Vec<usize>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_adapters(adapters: impl IntoIterator<Item = CallAdapter>) -> Self {
        let mut set = Self::new();
        for adapter in adapters {
            set.insert(adapter);
        }
        set
    }

    pub fn insert(&mut self, adapter: CallAdapter) {
        let position = self.adapters.len();
        for interface in &adapter.implements {
            self.by_interface.entry(interface.clone()).or_default().push(position);
        }
        self.adapters.push(adapter);
    }

    /// Adapters implementing `interface`, in registration order
    pub fn implementing(&self, interface: &str) -> impl Iterator<Item = &CallAdapter> {
        self.by_interface
            .get(interface)
            .into_iter()
            .flatten()
            .filter_map(|&position| self.adapters.get(position))
    }

    pub fn get(&self, name: &str) -> Option<&CallAdapter> {
        self.adapters.iter().find(|a| a.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CallAdapter> {
        self.adapters.iter()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
