//! Policy group registry
//!
//! Producers are registered during setup, then frozen into a name-indexed
//! table. Lookups never cache: every [`PolicyGroupRegistry::get`] asks the
//! winning producer for a fresh descriptor.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use callguard_domain::constants::{DEFAULT_PRODUCER_PRIORITY, IDEMPOTENT_GROUP};
use tracing::{debug, instrument};

use crate::policy::PolicyGroup;

/// Factory for one named policy group
///
/// Implement this to add custom named groups without touching the
/// dispatcher. When several producers share a name, the one with the
/// highest priority wins; among equal priorities the later registration
/// wins.
pub trait PolicyGroupProducer: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        DEFAULT_PRODUCER_PRIORITY
    }

    /// Describe the group; called once per lookup
    fn create(&self) -> PolicyGroup;
}

/// Built-in `idempotent` group: a single retry stage with engine defaults
#[derive(Debug, Default, Clone, Copy)]
pub struct IdempotentGroupProducer;

impl PolicyGroupProducer for IdempotentGroupProducer {
    fn name(&self) -> &str {
        IDEMPOTENT_GROUP
    }

    fn create(&self) -> PolicyGroup {
        PolicyGroup::builder().description(IDEMPOTENT_GROUP).retry().done().build()
    }
}

/// Producer backed by a fixed descriptor
pub struct StaticGroupProducer {
    name: String,
    priority: i32,
    group: PolicyGroup,
}

impl StaticGroupProducer {
    pub fn new(name: impl Into<String>, group: PolicyGroup) -> Self {
        Self { name: name.into(), priority: DEFAULT_PRODUCER_PRIORITY, group }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PolicyGroupProducer for StaticGroupProducer {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn create(&self) -> PolicyGroup {
        self.group.clone()
    }
}

/// Collects producers before the registry is frozen
#[derive(Default)]
pub struct RegistryBuilder {
    producers: Vec<Arc<dyn PolicyGroupProducer>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P>(mut self, producer: P) -> Self
    where
        P: PolicyGroupProducer + 'static,
    {
        self.producers.push(Arc::new(producer));
        self
    }

    pub fn register_shared(mut self, producer: Arc<dyn PolicyGroupProducer>) -> Self {
        self.producers.push(producer);
        self
    }

    /// Register the built-in producers
    pub fn with_builtins(self) -> Self {
        self.register(IdempotentGroupProducer)
    }

    /// Index producers by name, resolving duplicates by priority
    #[instrument(skip_all, fields(producers = self.producers.len()))]
    pub fn freeze(mut self) -> PolicyGroupRegistry {
        // Stable sort keeps registration order among equal priorities
        self.producers.sort_by_key(|producer| producer.priority());

        let mut producers: HashMap<String, Arc<dyn PolicyGroupProducer>> = HashMap::new();
        for producer in self.producers {
            let name = producer.name().to_string();
            if let Some(previous) = producers.insert(name.clone(), producer) {
                debug!(group = %name, replaced_priority = previous.priority(), "policy group producer replaced");
            }
        }

        debug!(groups = producers.len(), "policy group registry frozen");
        PolicyGroupRegistry { producers }
    }
}

/// Frozen name → producer table
#[derive(Clone, Default)]
pub struct PolicyGroupRegistry {
    producers: HashMap<String, Arc<dyn PolicyGroupProducer>>,
}

impl PolicyGroupRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Registry holding only the built-in producers
    pub fn with_builtins() -> Self {
        RegistryBuilder::new().with_builtins().freeze()
    }

    /// Fresh descriptor from the winning producer, `None` if unknown
    pub fn get(&self, name: &str) -> Option<PolicyGroup> {
        self.producers.get(name).map(|producer| producer.create())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.producers.contains_key(name)
    }

    /// Priority of the winning producer for `name`
    pub fn priority(&self, name: &str) -> Option<i32> {
        self.producers.get(name).map(|producer| producer.priority())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.producers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }
}

impl fmt::Debug for PolicyGroupRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("PolicyGroupRegistry").field("groups", &names).finish()
    }
}
