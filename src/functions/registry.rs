//! Typed, versioned function registry.
//!
//! Read-heavy, write-rare: a `parking_lot::RwLock` serializes registration
//! against concurrent lookups. Ids are unique across all four variants;
//! absence on lookup is `None`, never an error.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

use super::metadata::{FunctionKind, FunctionMetadata};
use super::traits::{
    ConditionFunction, FunctionError, NodeFunction, RoutingFunction, TriggerFunction,
};
use crate::context::ExecutionContext;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Function already registered: {id}")]
    AlreadyRegistered { id: String },
}

/// A registered function of any variant.
#[derive(Clone)]
pub enum RegisteredFunction {
    Condition(Arc<dyn ConditionFunction>),
    Node(Arc<dyn NodeFunction>),
    Routing(Arc<dyn RoutingFunction>),
    Trigger(Arc<dyn TriggerFunction>),
}

impl RegisteredFunction {
    pub fn metadata(&self) -> &FunctionMetadata {
        match self {
            RegisteredFunction::Condition(f) => f.metadata(),
            RegisteredFunction::Node(f) => f.metadata(),
            RegisteredFunction::Routing(f) => f.metadata(),
            RegisteredFunction::Trigger(f) => f.metadata(),
        }
    }

    pub fn kind(&self) -> FunctionKind {
        match self {
            RegisteredFunction::Condition(_) => FunctionKind::Condition,
            RegisteredFunction::Node(_) => FunctionKind::Node,
            RegisteredFunction::Routing(_) => FunctionKind::Routing,
            RegisteredFunction::Trigger(_) => FunctionKind::Trigger,
        }
    }
}

#[derive(Default)]
struct Inner {
    functions: std::collections::HashMap<String, RegisteredFunction>,
}

/// Registry of condition/node/routing/trigger functions keyed by id.
#[derive(Default)]
pub struct FunctionRegistry {
    inner: parking_lot::RwLock<Inner>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, function: RegisteredFunction) -> Result<(), RegistryError> {
        let id = function.metadata().id.clone();
        let mut inner = self.inner.write();
        if inner.functions.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered { id });
        }
        inner.functions.insert(id, function);
        Ok(())
    }

    pub fn register_condition(
        &self,
        function: Arc<dyn ConditionFunction>,
    ) -> Result<(), RegistryError> {
        self.insert(RegisteredFunction::Condition(function))
    }

    pub fn register_node(&self, function: Arc<dyn NodeFunction>) -> Result<(), RegistryError> {
        self.insert(RegisteredFunction::Node(function))
    }

    pub fn register_routing(
        &self,
        function: Arc<dyn RoutingFunction>,
    ) -> Result<(), RegistryError> {
        self.insert(RegisteredFunction::Routing(function))
    }

    pub fn register_trigger(
        &self,
        function: Arc<dyn TriggerFunction>,
    ) -> Result<(), RegistryError> {
        self.insert(RegisteredFunction::Trigger(function))
    }

    /// Look up any variant by id.
    pub fn get(&self, id: &str) -> Option<RegisteredFunction> {
        self.inner.read().functions.get(id).cloned()
    }

    /// First function whose metadata name matches.
    pub fn get_by_name(&self, name: &str) -> Option<RegisteredFunction> {
        self.inner
            .read()
            .functions
            .values()
            .find(|f| f.metadata().name == name)
            .cloned()
    }

    pub fn condition(&self, id: &str) -> Option<Arc<dyn ConditionFunction>> {
        match self.get(id) {
            Some(RegisteredFunction::Condition(f)) => Some(f),
            _ => None,
        }
    }

    pub fn node(&self, id: &str) -> Option<Arc<dyn NodeFunction>> {
        match self.get(id) {
            Some(RegisteredFunction::Node(f)) => Some(f),
            _ => None,
        }
    }

    pub fn routing(&self, id: &str) -> Option<Arc<dyn RoutingFunction>> {
        match self.get(id) {
            Some(RegisteredFunction::Routing(f)) => Some(f),
            _ => None,
        }
    }

    pub fn trigger(&self, id: &str) -> Option<Arc<dyn TriggerFunction>> {
        match self.get(id) {
            Some(RegisteredFunction::Trigger(f)) => Some(f),
            _ => None,
        }
    }

    /// Metadata of every function of one variant.
    pub fn list_by_kind(&self, kind: FunctionKind) -> Vec<FunctionMetadata> {
        self.inner
            .read()
            .functions
            .values()
            .filter(|f| f.kind() == kind)
            .map(|f| f.metadata().clone())
            .collect()
    }

    /// Remove a function; reports whether anything was removed.
    pub fn unregister(&self, id: &str) -> bool {
        self.inner.write().functions.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().functions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().functions.is_empty()
    }

    /// All registered ids — feeds the graph validator's reference check.
    pub fn known_ids(&self) -> HashSet<String> {
        self.inner.read().functions.keys().cloned().collect()
    }

    /// Evaluate every registered trigger against the context, returning the
    /// ids of those that fired.
    pub async fn evaluate_triggers(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<Vec<String>, FunctionError> {
        let triggers: Vec<Arc<dyn TriggerFunction>> = {
            let inner = self.inner.read();
            inner
                .functions
                .values()
                .filter_map(|f| match f {
                    RegisteredFunction::Trigger(t) => Some(t.clone()),
                    _ => None,
                })
                .collect()
        };
        let mut fired = Vec::new();
        for trigger in triggers {
            if trigger.should_trigger(ctx).await? {
                fired.push(trigger.metadata().id.clone());
            }
        }
        Ok(fired)
    }
}
