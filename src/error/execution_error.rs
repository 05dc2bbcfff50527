use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where in the traversal a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    NodeExecution,
    EdgeEvaluation,
    MergeJoin,
    Hook,
    Checkpoint,
}

/// The failing node/edge and the phase, attached to `Failed` events so a
/// failure can be diagnosed without re-running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailurePoint {
    pub node_id: Option<String>,
    pub edge_id: Option<String>,
    pub phase: ExecutionPhase,
}

impl FailurePoint {
    pub fn node(node_id: impl Into<String>, phase: ExecutionPhase) -> Self {
        Self {
            node_id: Some(node_id.into()),
            edge_id: None,
            phase,
        }
    }

    pub fn edge(edge_id: impl Into<String>, phase: ExecutionPhase) -> Self {
        Self {
            node_id: None,
            edge_id: Some(edge_id.into()),
            phase,
        }
    }
}

/// Errors raised while driving a run. These abort the current run but leave
/// the registry and checkpoint manager usable for other runs.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Execution timed out{}", .node_id.as_ref().map(|n| format!(" at node {}", n)).unwrap_or_default())]
    Timeout { node_id: Option<String> },
    #[error("Execution cancelled{}", .last_node.as_ref().map(|n| format!(" after node {}", n)).unwrap_or_default())]
    Cancelled { last_node: Option<String> },
    #[error("Node cannot execute: {node_id}")]
    NodeCannotExecute { node_id: String },
    #[error("Node execution failed: node={node_id}, error={message}")]
    NodeFailed { node_id: String, message: String },
    #[error("Edge evaluation failed: edge={edge_id}, error={message}")]
    EdgeFailed { edge_id: String, message: String },
    #[error("Merge join timed out at node {node_id}, missing predecessors: {}", .missing.join(", "))]
    MergeTimeout {
        node_id: String,
        missing: Vec<String>,
    },
    #[error("Function not found: {function_id} (referenced by node {node_id})")]
    FunctionNotFound {
        node_id: String,
        function_id: String,
    },
    #[error("Graph has no entry nodes")]
    NoEntryNodes,
}
