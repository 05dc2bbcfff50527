//! Per-run mutable execution state.
//!
//! A context is exclusively owned by one run: the executor (and the
//! functions it invokes, via returned outcomes) are the only mutators, so
//! every operation is plain in-place `&mut self` with no internal locking.
//! Marking a node executed twice is legal and overwrites the prior result —
//! that is how nodes re-entered via a cycle behave.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::WorkflowGraph;

/// The serializable mutable portion of a context, used for checkpointing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub input: Value,
    pub executed: Vec<String>,
    pub node_results: HashMap<String, Value>,
    pub edge_results: HashMap<String, bool>,
    pub variables: HashMap<String, Value>,
    pub metadata: HashMap<String, String>,
}

/// Per-run execution state.
pub struct ExecutionContext {
    execution_id: String,
    graph: Arc<WorkflowGraph>,
    input: Value,
    started_at: DateTime<Utc>,
    executed: HashSet<String>,
    node_results: HashMap<String, Value>,
    edge_results: HashMap<String, bool>,
    variables: HashMap<String, Value>,
    metadata: HashMap<String, String>,
}

impl ExecutionContext {
    pub fn new(execution_id: impl Into<String>, graph: Arc<WorkflowGraph>, input: Value) -> Self {
        Self {
            execution_id: execution_id.into(),
            graph,
            input,
            started_at: Utc::now(),
            executed: HashSet::new(),
            node_results: HashMap::new(),
            edge_results: HashMap::new(),
            variables: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn graph_arc(&self) -> Arc<WorkflowGraph> {
        self.graph.clone()
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }

    // --- variables ---

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn get_variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn remove_variable(&mut self, name: &str) -> bool {
        self.variables.remove(name).is_some()
    }

    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    // --- metadata ---

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn has_metadata(&self, key: &str) -> bool {
        self.metadata.contains_key(key)
    }

    pub fn remove_metadata(&mut self, key: &str) -> bool {
        self.metadata.remove(key).is_some()
    }

    // --- node results ---

    /// Idempotent: re-marking is legal (cycle re-entry) and keeps the set
    /// membership a no-op.
    pub fn mark_executed(&mut self, node_id: impl Into<String>) {
        self.executed.insert(node_id.into());
    }

    pub fn is_executed(&self, node_id: &str) -> bool {
        self.executed.contains(node_id)
    }

    pub fn executed_count(&self) -> usize {
        self.executed.len()
    }

    pub fn executed_nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self.executed.iter().cloned().collect();
        nodes.sort_unstable();
        nodes
    }

    /// Overwrites any prior result for the node.
    pub fn set_node_result(&mut self, node_id: impl Into<String>, result: Value) {
        self.node_results.insert(node_id.into(), result);
    }

    pub fn get_node_result(&self, node_id: &str) -> Option<&Value> {
        self.node_results.get(node_id)
    }

    // --- edge results ---

    pub fn set_edge_result(&mut self, edge_id: impl Into<String>, followed: bool) {
        self.edge_results.insert(edge_id.into(), followed);
    }

    pub fn get_edge_result(&self, edge_id: &str) -> Option<bool> {
        self.edge_results.get(edge_id).copied()
    }

    pub fn edge_results(&self) -> &HashMap<String, bool> {
        &self.edge_results
    }

    // --- checkpointing ---

    /// Deep copy of the mutable state as a JSON value.
    pub fn snapshot(&self) -> Value {
        let snapshot = ContextSnapshot {
            input: self.input.clone(),
            executed: self.executed.iter().cloned().collect(),
            node_results: self.node_results.clone(),
            edge_results: self.edge_results.clone(),
            variables: self.variables.clone(),
            metadata: self.metadata.clone(),
        };
        // ContextSnapshot has no non-serializable fields.
        serde_json::to_value(snapshot).unwrap_or(Value::Null)
    }

    /// Replace the mutable state with a previously captured snapshot.
    pub fn apply_snapshot(&mut self, snapshot: Value) -> Result<(), serde_json::Error> {
        let snapshot: ContextSnapshot = serde_json::from_value(snapshot)?;
        self.input = snapshot.input;
        self.executed = snapshot.executed.into_iter().collect();
        self.node_results = snapshot.node_results;
        self.edge_results = snapshot.edge_results;
        self.variables = snapshot.variables;
        self.metadata = snapshot.metadata;
        Ok(())
    }
}
