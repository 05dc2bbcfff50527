//! Graph compilation: raw definition → immutable [`WorkflowGraph`].

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::Direction;

use super::types::{Edge, GraphDefinition, Node, NodeKind, SubworkflowStandard};
use super::validator::{validate, ValidationRule};
use crate::error::EngineError;

/// How error-level diagnostics are treated during compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompileMode {
    /// Any error-level diagnostic is fatal.
    #[default]
    Strict,
    /// Proceed past errors, surfacing everything as warnings.
    Lenient,
}

/// A compiled, immutable workflow graph.
///
/// Backed by a petgraph `StableDiGraph` with an id → index map for O(1)
/// lookup by node id. All structural queries the executor needs live here.
pub struct WorkflowGraph {
    id: String,
    name: String,
    standard: SubworkflowStandard,
    graph: StableDiGraph<Node, Edge>,
    node_index: HashMap<String, NodeIndex>,
    edge_index: HashMap<String, EdgeIndex>,
}

impl WorkflowGraph {
    /// Validate and compile a graph definition.
    ///
    /// Strict mode fails with [`EngineError::ValidationFailed`] on any
    /// error-level diagnostic; lenient mode logs diagnostics and proceeds.
    /// Either way, dangling edge endpoints cannot be represented and abort
    /// the build.
    pub fn compile(
        def: GraphDefinition,
        mode: CompileMode,
        rules: &[Box<dyn ValidationRule>],
    ) -> Result<Self, EngineError> {
        let report = validate(&def, rules);
        match mode {
            CompileMode::Strict => {
                if !report.is_valid {
                    return Err(EngineError::ValidationFailed(Box::new(report)));
                }
                for warning in report.warnings() {
                    tracing::warn!(code = %warning.code, "graph validation: {}", warning.message);
                }
            }
            CompileMode::Lenient => {
                for diagnostic in &report.diagnostics {
                    tracing::warn!(
                        code = %diagnostic.code,
                        "graph validation (lenient): {}",
                        diagnostic.message
                    );
                }
            }
        }
        Self::build(def)
    }

    fn build(def: GraphDefinition) -> Result<Self, EngineError> {
        let mut graph = StableDiGraph::new();
        let mut node_index = HashMap::with_capacity(def.nodes.len());
        let mut edge_index = HashMap::with_capacity(def.edges.len());

        for node in def.nodes {
            let id = node.id.clone();
            if node_index.contains_key(&id) {
                return Err(EngineError::GraphBuild(format!("duplicate node id: {}", id)));
            }
            let idx = graph.add_node(node);
            node_index.insert(id, idx);
        }
        for edge in def.edges {
            let source = *node_index.get(&edge.source).ok_or_else(|| {
                EngineError::GraphBuild(format!(
                    "edge {} references unknown node: {}",
                    edge.id, edge.source
                ))
            })?;
            let target = *node_index.get(&edge.target).ok_or_else(|| {
                EngineError::GraphBuild(format!(
                    "edge {} references unknown node: {}",
                    edge.id, edge.target
                ))
            })?;
            let id = edge.id.clone();
            if edge_index.contains_key(&id) {
                return Err(EngineError::GraphBuild(format!("duplicate edge id: {}", id)));
            }
            let idx = graph.add_edge(source, target, edge);
            edge_index.insert(id, idx);
        }

        Ok(Self {
            id: def.id,
            name: def.name,
            standard: def.standard,
            graph,
            node_index,
            edge_index,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn standard(&self) -> SubworkflowStandard {
        self.standard
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.node_index
            .get(id)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edge_index
            .get(id)
            .and_then(|&idx| self.graph.edge_weight(idx))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// Outgoing edges of a node, in insertion order.
    pub fn outgoing(&self, id: &str) -> Vec<&Edge> {
        self.directed_edges(id, Direction::Outgoing)
    }

    /// Incoming edges of a node, in insertion order.
    pub fn incoming(&self, id: &str) -> Vec<&Edge> {
        self.directed_edges(id, Direction::Incoming)
    }

    fn directed_edges(&self, id: &str, dir: Direction) -> Vec<&Edge> {
        let Some(&idx) = self.node_index.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<&Edge> = self
            .graph
            .edges_directed(idx, dir)
            .map(|e| e.weight())
            .collect();
        // petgraph yields most-recently-added first; callers expect
        // definition order.
        edges.reverse();
        edges
    }

    /// Entry nodes: explicit start nodes under the feature standard,
    /// in-degree-0 nodes under the base standard.
    pub fn entry_nodes(&self) -> Vec<&Node> {
        match self.standard {
            SubworkflowStandard::Feature => self
                .nodes()
                .filter(|n| n.kind == NodeKind::Start)
                .collect(),
            SubworkflowStandard::Base => self
                .graph
                .node_indices()
                .filter(|&idx| {
                    self.graph
                        .neighbors_directed(idx, Direction::Incoming)
                        .next()
                        .is_none()
                })
                .filter_map(|idx| self.graph.node_weight(idx))
                .collect(),
        }
    }

    /// Exit nodes: explicit end nodes under the feature standard,
    /// out-degree-0 nodes under the base standard.
    pub fn exit_nodes(&self) -> Vec<&Node> {
        match self.standard {
            SubworkflowStandard::Feature => {
                self.nodes().filter(|n| n.kind == NodeKind::End).collect()
            }
            SubworkflowStandard::Base => self
                .graph
                .node_indices()
                .filter(|&idx| {
                    self.graph
                        .neighbors_directed(idx, Direction::Outgoing)
                        .next()
                        .is_none()
                })
                .filter_map(|idx| self.graph.node_weight(idx))
                .collect(),
        }
    }

    /// Node ids reachable from the entry nodes (entries included). Drives
    /// the executor's progress reporting.
    pub fn reachable_from_entries(&self) -> HashSet<String> {
        let mut reachable = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = self
            .entry_nodes()
            .iter()
            .filter_map(|n| self.node_index.get(&n.id).copied())
            .collect();
        while let Some(idx) = queue.pop_front() {
            let Some(node) = self.graph.node_weight(idx) else {
                continue;
            };
            if !reachable.insert(node.id.clone()) {
                continue;
            }
            queue.extend(self.graph.neighbors_directed(idx, Direction::Outgoing));
        }
        reachable
    }
}

impl std::fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowGraph")
            .field("id", &self.id)
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .field("standard", &self.standard)
            .finish()
    }
}
