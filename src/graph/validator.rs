//! Structural validation rules.
//!
//! Each rule is a pure predicate over a [`GraphDefinition`] producing zero or
//! more diagnostics. Rules compose: [`validate`] runs a rule set and
//! aggregates the findings into a [`ValidationReport`]. Cycle detection only
//! *reports* cycles; whether a cycle is fatal is the compiler's choice
//! (strict vs. lenient mode).

use std::collections::{HashMap, HashSet};

use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};

use super::types::{GraphDefinition, NodeKind, SubworkflowStandard};

/// Severity level of a validation diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

/// A single validation finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub code: String,
    pub message: String,
    pub node_id: Option<String>,
    pub edge_id: Option<String>,
}

impl Diagnostic {
    fn error(code: &str, message: String) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            code: code.to_string(),
            message,
            node_id: None,
            edge_id: None,
        }
    }

    fn warning(code: &str, message: String) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            code: code.to_string(),
            message,
            node_id: None,
            edge_id: None,
        }
    }

    fn at_node(mut self, node_id: &str) -> Self {
        self.node_id = Some(node_id.to_string());
        self
    }

    fn at_edge(mut self, edge_id: &str) -> Self {
        self.edge_id = Some(edge_id.to_string());
        self
    }
}

/// Aggregated result of graph validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warning)
            .collect()
    }
}

/// A composable structural check over a graph definition.
pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, def: &GraphDefinition) -> Vec<Diagnostic>;
}

/// Run a rule set and aggregate the findings.
pub fn validate(def: &GraphDefinition, rules: &[Box<dyn ValidationRule>]) -> ValidationReport {
    let mut diagnostics = Vec::new();
    for rule in rules {
        diagnostics.extend(rule.check(def));
    }
    let is_valid = diagnostics
        .iter()
        .all(|d| d.level != DiagnosticLevel::Error);
    ValidationReport {
        is_valid,
        diagnostics,
    }
}

/// The minimum rule set. `known_functions` feeds the reference-membership
/// rule and normally comes from [`FunctionRegistry::known_ids`](crate::functions::FunctionRegistry::known_ids).
pub fn default_rules(known_functions: HashSet<String>) -> Vec<Box<dyn ValidationRule>> {
    vec![
        Box::new(StructuralIntegrityRule),
        Box::new(CycleDetectionRule),
        Box::new(IsolatedNodeRule),
        Box::new(StandardBoundsRule),
        Box::new(KnownFunctionsRule::new(known_functions)),
        Box::new(ConfigCompletenessRule),
    ]
}

/// Every edge endpoint must name an existing node; node and edge ids must be
/// unique.
pub struct StructuralIntegrityRule;

impl ValidationRule for StructuralIntegrityRule {
    fn name(&self) -> &'static str {
        "structural-integrity"
    }

    fn check(&self, def: &GraphDefinition) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let node_ids: HashSet<&str> = def.nodes.iter().map(|n| n.id.as_str()).collect();

        let mut seen_nodes = HashSet::new();
        for node in &def.nodes {
            if !seen_nodes.insert(node.id.as_str()) {
                diagnostics.push(
                    Diagnostic::error("E002", format!("Duplicate node id: {}", node.id))
                        .at_node(&node.id),
                );
            }
        }

        let mut seen_edges = HashSet::new();
        for edge in &def.edges {
            if !seen_edges.insert(edge.id.as_str()) {
                diagnostics.push(
                    Diagnostic::error("E002", format!("Duplicate edge id: {}", edge.id))
                        .at_edge(&edge.id),
                );
            }
            for endpoint in [&edge.source, &edge.target] {
                if !node_ids.contains(endpoint.as_str()) {
                    diagnostics.push(
                        Diagnostic::error(
                            "E001",
                            format!("Edge {} references unknown node: {}", edge.id, endpoint),
                        )
                        .at_edge(&edge.id),
                    );
                }
            }
        }
        diagnostics
    }
}

/// Report each cycle with its member nodes. Reporting only — strict
/// compilation turns it fatal, lenient compilation proceeds.
pub struct CycleDetectionRule;

impl ValidationRule for CycleDetectionRule {
    fn name(&self) -> &'static str {
        "cycle-detection"
    }

    fn check(&self, def: &GraphDefinition) -> Vec<Diagnostic> {
        let mut graph = DiGraph::<&str, ()>::new();
        let mut index = HashMap::new();
        for node in &def.nodes {
            index
                .entry(node.id.as_str())
                .or_insert_with(|| graph.add_node(node.id.as_str()));
        }
        for edge in &def.edges {
            // Dangling endpoints are E001's concern.
            if let (Some(&s), Some(&t)) =
                (index.get(edge.source.as_str()), index.get(edge.target.as_str()))
            {
                graph.add_edge(s, t, ());
            }
        }

        let mut diagnostics = Vec::new();
        for scc in petgraph::algo::tarjan_scc(&graph) {
            let is_cycle = scc.len() > 1
                || (scc.len() == 1 && graph.find_edge(scc[0], scc[0]).is_some());
            if is_cycle {
                let mut members: Vec<&str> = scc.iter().map(|&idx| graph[idx]).collect();
                members.sort_unstable();
                diagnostics.push(Diagnostic::error(
                    "E101",
                    format!("Cycle detected involving nodes: {}", members.join(" -> ")),
                ));
            }
        }
        diagnostics
    }
}

/// A node with neither incoming nor outgoing edges is unreachable dead
/// weight — unless the graph consists of that single node.
pub struct IsolatedNodeRule;

impl ValidationRule for IsolatedNodeRule {
    fn name(&self) -> &'static str {
        "isolated-nodes"
    }

    fn check(&self, def: &GraphDefinition) -> Vec<Diagnostic> {
        if def.nodes.len() <= 1 {
            return Vec::new();
        }
        let mut connected: HashSet<&str> = HashSet::new();
        for edge in &def.edges {
            connected.insert(edge.source.as_str());
            connected.insert(edge.target.as_str());
        }
        def.nodes
            .iter()
            .filter(|n| !connected.contains(n.id.as_str()))
            .map(|n| {
                Diagnostic::error("E102", format!("Isolated node detected: {}", n.id))
                    .at_node(&n.id)
            })
            .collect()
    }
}

/// Entry/exit degree checks against the declared subworkflow standard.
pub struct StandardBoundsRule;

impl ValidationRule for StandardBoundsRule {
    fn name(&self) -> &'static str {
        "standard-bounds"
    }

    fn check(&self, def: &GraphDefinition) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        match def.standard {
            SubworkflowStandard::Feature => {
                let starts: Vec<_> = def
                    .nodes
                    .iter()
                    .filter(|n| n.kind == NodeKind::Start)
                    .collect();
                if starts.is_empty() {
                    diagnostics.push(Diagnostic::error(
                        "E103",
                        "Feature standard requires an explicit start node".to_string(),
                    ));
                } else if starts.len() > 1 {
                    diagnostics.push(Diagnostic::error(
                        "E104",
                        format!("Feature standard permits one start node, found {}", starts.len()),
                    ));
                }
                if !def.nodes.iter().any(|n| n.kind == NodeKind::End) {
                    diagnostics.push(Diagnostic::error(
                        "E105",
                        "Feature standard requires at least one end node".to_string(),
                    ));
                }
            }
            SubworkflowStandard::Base => {
                // Degree-determined entries are fine, but there must be one.
                let mut has_incoming: HashSet<&str> = HashSet::new();
                for edge in &def.edges {
                    has_incoming.insert(edge.target.as_str());
                }
                let has_entry = def
                    .nodes
                    .iter()
                    .any(|n| !has_incoming.contains(n.id.as_str()));
                if !def.nodes.is_empty() && !has_entry {
                    diagnostics.push(Diagnostic::error(
                        "E106",
                        "Base standard requires at least one entry node (in-degree 0)".to_string(),
                    ));
                }
            }
        }
        diagnostics
    }
}

/// Node `config.function` and edge `condition` references must be registered.
pub struct KnownFunctionsRule {
    known: HashSet<String>,
}

impl KnownFunctionsRule {
    pub fn new(known: HashSet<String>) -> Self {
        Self { known }
    }
}

impl ValidationRule for KnownFunctionsRule {
    fn name(&self) -> &'static str {
        "known-functions"
    }

    fn check(&self, def: &GraphDefinition) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for node in &def.nodes {
            if let Some(function_id) = node.function_ref() {
                if !self.known.contains(function_id) {
                    diagnostics.push(
                        Diagnostic::error(
                            "E201",
                            format!(
                                "Node {} references unregistered function: {}",
                                node.id, function_id
                            ),
                        )
                        .at_node(&node.id),
                    );
                }
            }
        }
        for edge in &def.edges {
            if let Some(condition) = &edge.condition {
                if !self.known.contains(condition) {
                    diagnostics.push(
                        Diagnostic::error(
                            "E202",
                            format!(
                                "Edge {} references unregistered condition: {}",
                                edge.id, condition
                            ),
                        )
                        .at_edge(&edge.id),
                    );
                }
            }
        }
        diagnostics
    }
}

/// Required config keys per node kind.
pub struct ConfigCompletenessRule;

impl ValidationRule for ConfigCompletenessRule {
    fn name(&self) -> &'static str {
        "config-completeness"
    }

    fn check(&self, def: &GraphDefinition) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for node in &def.nodes {
            if node.kind.requires_function() && node.function_ref().is_none() {
                diagnostics.push(
                    Diagnostic::error(
                        "E301",
                        format!(
                            "Node {} ({:?}) requires a 'function' config entry",
                            node.id, node.kind
                        ),
                    )
                    .at_node(&node.id),
                );
            }
            if node.kind == NodeKind::Subworkflow && node.config_str("workflow").is_none() {
                diagnostics.push(
                    Diagnostic::error(
                        "E302",
                        format!("Subworkflow node {} requires a 'workflow' config entry", node.id),
                    )
                    .at_node(&node.id),
                );
            }
            if node.kind == NodeKind::Merge {
                if let Some(value) = node.config.get("join_timeout_ms") {
                    if !value.is_u64() {
                        diagnostics.push(
                            Diagnostic::warning(
                                "W301",
                                format!(
                                    "Merge node {}: join_timeout_ms must be a non-negative integer",
                                    node.id
                                ),
                            )
                            .at_node(&node.id),
                        );
                    }
                }
            }
        }
        diagnostics
    }
}
