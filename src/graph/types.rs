use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Node type tag driving executor behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    End,
    Task,
    Decision,
    Parallel,
    Merge,
    Subworkflow,
}

impl NodeKind {
    /// Kinds whose config must name a registered function.
    pub fn requires_function(&self) -> bool {
        matches!(
            self,
            NodeKind::Task | NodeKind::Decision | NodeKind::Subworkflow
        )
    }
}

/// Presentation-only canvas position. Never consulted by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A graph node. Immutable after compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            title: String::new(),
            config: Value::Null,
            position: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// The function id this node's config references, if any.
    pub fn function_ref(&self) -> Option<&str> {
        self.config.get("function").and_then(Value::as_str)
    }

    /// A string config entry by key.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// A numeric config entry by key.
    pub fn config_u64(&self, key: &str) -> Option<u64> {
        self.config.get(key).and_then(Value::as_u64)
    }
}

/// A directed edge. Immutable after compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    /// Condition function id guarding this edge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default)]
    pub config: Value,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            condition: None,
            weight: None,
            config: Value::Null,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// Declared entry/exit contract for a (sub)workflow graph.
///
/// `Base` permits degree-determined entry/exit nodes without explicit
/// start/end nodes; `Feature` requires exactly one explicit start node and at
/// least one end node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubworkflowStandard {
    #[default]
    Base,
    Feature,
}

/// Raw, serde-friendly graph form fed to validation and compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub standard: SubworkflowStandard,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl GraphDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            standard: SubworkflowStandard::default(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn with_standard(mut self, standard: SubworkflowStandard) -> Self {
        self.standard = standard;
        self
    }

    pub fn add_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn add_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_function_ref() {
        let node =
            Node::new("n1", NodeKind::Task).with_config(json!({"function": "fn-1", "retries": 3}));
        assert_eq!(node.function_ref(), Some("fn-1"));
        assert_eq!(node.config_u64("retries"), Some(3));
        assert_eq!(node.config_str("missing"), None);

        let bare = Node::new("n2", NodeKind::Start);
        assert_eq!(bare.function_ref(), None);
    }

    #[test]
    fn test_requires_function() {
        assert!(NodeKind::Task.requires_function());
        assert!(NodeKind::Decision.requires_function());
        assert!(NodeKind::Subworkflow.requires_function());
        assert!(!NodeKind::Start.requires_function());
        assert!(!NodeKind::Merge.requires_function());
    }

    #[test]
    fn test_definition_deserialize() {
        let json = r#"{
            "id": "wf-1",
            "name": "demo",
            "standard": "feature",
            "nodes": [
                {"id": "start", "kind": "start"},
                {"id": "end", "kind": "end", "position": {"x": 10.0, "y": 20.0}}
            ],
            "edges": [
                {"id": "e1", "source": "start", "target": "end", "weight": 1.5}
            ]
        }"#;
        let def: GraphDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.standard, SubworkflowStandard::Feature);
        assert_eq!(def.nodes.len(), 2);
        assert_eq!(def.edges[0].weight, Some(1.5));
        assert_eq!(def.node("end").unwrap().position.unwrap().x, 10.0);
    }

    #[test]
    fn test_standard_defaults_to_base() {
        let json = r#"{"id": "wf", "nodes": [], "edges": []}"#;
        let def: GraphDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.standard, SubworkflowStandard::Base);
    }
}
