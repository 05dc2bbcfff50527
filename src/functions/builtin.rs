//! Builtin node functions, enough to run a workflow without user code.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::metadata::{FunctionKind, FunctionMetadata};
use super::registry::{FunctionRegistry, RegistryError};
use super::traits::{FunctionError, NodeFunction, NodeOutcome};
use crate::context::ExecutionContext;
use crate::graph::Node;

/// Emits the node's `config.output` (or null) unchanged. The default
/// behavior for start/end/parallel/merge nodes that carry no function.
pub struct PassthroughFunction {
    meta: FunctionMetadata,
}

impl PassthroughFunction {
    pub fn new() -> Self {
        Self {
            meta: FunctionMetadata::new("passthrough", "Passthrough", FunctionKind::Node)
                .with_description("emits config.output unchanged"),
        }
    }
}

impl Default for PassthroughFunction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeFunction for PassthroughFunction {
    fn metadata(&self) -> &FunctionMetadata {
        &self.meta
    }

    async fn execute(
        &self,
        node: &Node,
        _ctx: &ExecutionContext,
    ) -> Result<NodeOutcome, FunctionError> {
        let output = node.config.get("output").cloned().unwrap_or(Value::Null);
        Ok(NodeOutcome::output(output))
    }
}

/// Writes the key/value pairs under `config.variables` into the context.
pub struct VariableSetterFunction {
    meta: FunctionMetadata,
}

impl VariableSetterFunction {
    pub fn new() -> Self {
        Self {
            meta: FunctionMetadata::new("set-variables", "Set Variables", FunctionKind::Node)
                .with_description("writes config.variables into the execution context"),
        }
    }
}

impl Default for VariableSetterFunction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeFunction for VariableSetterFunction {
    fn metadata(&self) -> &FunctionMetadata {
        &self.meta
    }

    async fn execute(
        &self,
        node: &Node,
        _ctx: &ExecutionContext,
    ) -> Result<NodeOutcome, FunctionError> {
        let Some(vars) = node.config.get("variables") else {
            return Ok(NodeOutcome::default());
        };
        let map = vars.as_object().ok_or_else(|| {
            FunctionError::InvalidConfig(format!(
                "node {}: 'variables' must be an object",
                node.id
            ))
        })?;
        let mut outcome = NodeOutcome::output(Value::Object(map.clone()));
        for (key, value) in map {
            outcome.variables.insert(key.clone(), value.clone());
        }
        Ok(outcome)
    }
}

/// Register the builtin functions under their well-known ids.
pub fn register_builtins(registry: &FunctionRegistry) -> Result<(), RegistryError> {
    registry.register_node(Arc::new(PassthroughFunction::new()))?;
    registry.register_node(Arc::new(VariableSetterFunction::new()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CompileMode, GraphDefinition, Node, NodeKind, WorkflowGraph};
    use serde_json::json;

    fn test_ctx() -> ExecutionContext {
        let def = GraphDefinition::new("g").add_node(Node::new("only", NodeKind::Start));
        let graph = WorkflowGraph::compile(def, CompileMode::Lenient, &[]).unwrap();
        ExecutionContext::new("exec-1", Arc::new(graph), json!(null))
    }

    #[tokio::test]
    async fn test_passthrough_emits_config_output() {
        let f = PassthroughFunction::new();
        let node = Node::new("n", NodeKind::Task).with_config(json!({"output": {"ok": true}}));
        let outcome = f.execute(&node, &test_ctx()).await.unwrap();
        assert_eq!(outcome.output, json!({"ok": true}));

        let bare = Node::new("n2", NodeKind::Task);
        let outcome = f.execute(&bare, &test_ctx()).await.unwrap();
        assert!(outcome.output.is_null());
    }

    #[tokio::test]
    async fn test_variable_setter() {
        let f = VariableSetterFunction::new();
        let node = Node::new("n", NodeKind::Task)
            .with_config(json!({"variables": {"a": 1, "b": "two"}}));
        let outcome = f.execute(&node, &test_ctx()).await.unwrap();
        assert_eq!(outcome.variables["a"], json!(1));
        assert_eq!(outcome.variables["b"], json!("two"));
    }

    #[tokio::test]
    async fn test_variable_setter_rejects_non_object() {
        let f = VariableSetterFunction::new();
        let node = Node::new("n", NodeKind::Task).with_config(json!({"variables": [1, 2]}));
        let err = f.execute(&node, &test_ctx()).await.unwrap_err();
        assert!(matches!(err, FunctionError::InvalidConfig(_)));
    }

    #[test]
    fn test_register_builtins() {
        let registry = FunctionRegistry::new();
        register_builtins(&registry).unwrap();
        assert!(registry.node("passthrough").is_some());
        assert!(registry.node("set-variables").is_some());
        // Registering twice collides on ids.
        assert!(register_builtins(&registry).is_err());
    }
}
