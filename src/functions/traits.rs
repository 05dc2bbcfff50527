use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::metadata::FunctionMetadata;
use crate::context::ExecutionContext;
use crate::graph::{Edge, Node};

/// Errors raised inside pluggable function implementations.
#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("Function failed: {0}")]
    Failed(String),
    #[error("Invalid function config: {0}")]
    InvalidConfig(String),
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),
}

/// What a node function hands back to the executor. The executor applies the
/// outcome — it stores `output` as the node result and writes `variables`
/// into the context (the function never mutates the context directly, so
/// parallel branches can share it read-only).
#[derive(Debug, Clone, Default)]
pub struct NodeOutcome {
    pub output: Value,
    pub variables: HashMap<String, Value>,
}

impl NodeOutcome {
    pub fn output(output: Value) -> Self {
        Self {
            output,
            variables: HashMap::new(),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }
}

/// Boolean gate over execution state, evaluated per guarded edge.
#[async_trait]
pub trait ConditionFunction: Send + Sync {
    fn metadata(&self) -> &FunctionMetadata;

    async fn evaluate(&self, edge: &Edge, ctx: &ExecutionContext) -> Result<bool, FunctionError>;
}

/// Behavior of a task node.
#[async_trait]
pub trait NodeFunction: Send + Sync {
    fn metadata(&self) -> &FunctionMetadata;

    /// Gate checked before `execute`; a `false` fails the run with
    /// `NodeCannotExecute`.
    async fn can_execute(
        &self,
        _node: &Node,
        _ctx: &ExecutionContext,
    ) -> Result<bool, FunctionError> {
        Ok(true)
    }

    async fn execute(
        &self,
        node: &Node,
        ctx: &ExecutionContext,
    ) -> Result<NodeOutcome, FunctionError>;
}

/// Chooses the next node(s) for a decision node. `None` means no outgoing
/// edge is followed and the branch ends.
#[async_trait]
pub trait RoutingFunction: Send + Sync {
    fn metadata(&self) -> &FunctionMetadata;

    async fn route(
        &self,
        node: &Node,
        ctx: &ExecutionContext,
    ) -> Result<Option<Vec<String>>, FunctionError>;
}

/// Decides whether an external trigger should fire for the given state.
#[async_trait]
pub trait TriggerFunction: Send + Sync {
    fn metadata(&self) -> &FunctionMetadata;

    async fn should_trigger(&self, ctx: &ExecutionContext) -> Result<bool, FunctionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_outcome_builder() {
        let outcome = NodeOutcome::output(json!(42))
            .with_variable("answer", json!(42))
            .with_variable("done", json!(true));
        assert_eq!(outcome.output, json!(42));
        assert_eq!(outcome.variables.len(), 2);
        assert_eq!(outcome.variables["done"], json!(true));
    }

    #[test]
    fn test_default_outcome_is_null() {
        let outcome = NodeOutcome::default();
        assert!(outcome.output.is_null());
        assert!(outcome.variables.is_empty());
    }
}
