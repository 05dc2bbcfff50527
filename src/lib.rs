//! # Flowgraph — A Workflow Graph Execution Engine
//!
//! `flowgraph` compiles declarative workflow definitions into validated
//! directed graphs and drives them asynchronously:
//!
//! - **Typed node graph**: Start, End, Task, Decision, Parallel, Merge, and
//!   Subworkflow nodes over `petgraph`, with strict or lenient compilation
//!   backed by pluggable validation rules and coded diagnostics.
//! - **Function registry**: conditions, node behaviors, routing, and triggers
//!   registered as trait objects under unique ids.
//! - **Concurrent execution**: frontier-batch scheduling runs independent
//!   branches in parallel, joins them at merge nodes, and honors pause,
//!   resume, and cancel at step boundaries.
//! - **Hook chains**: sequential, parallel, or pipelined side-effect chains
//!   at lifecycle points, with retry, timeout, and error strategies.
//! - **Checkpoints**: bounded per-thread and global snapshot retention with
//!   optional durable stores.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use flowgraph::{
//!     CompileMode, FunctionRegistry, GraphDefinition, GraphExecutor, Node,
//!     NodeKind, WorkflowGraph,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let def = GraphDefinition::new("wf-1")
//!         .add_node(Node::new("start", NodeKind::Start))
//!         .add_node(Node::new("end", NodeKind::End))
//!         .add_edge(flowgraph::Edge::new("e1", "start", "end"));
//!
//!     let registry = Arc::new(FunctionRegistry::new());
//!     let rules = flowgraph::default_rules(registry.known_ids());
//!     let graph = WorkflowGraph::compile(def, CompileMode::Strict, &rules).unwrap();
//!
//!     let executor = GraphExecutor::new(Arc::new(graph), registry);
//!     let report = executor.run(json!({"answer": 42})).await.unwrap();
//!     println!("{}", report.output);
//! }
//! ```

pub mod checkpoint;
pub mod context;
pub mod error;
pub mod executor;
pub mod functions;
pub mod graph;
pub mod hooks;

pub use checkpoint::{
    Checkpoint, CheckpointError, CheckpointManager, CheckpointManagerConfig, CheckpointStore,
    FileCheckpointStore, MemoryCheckpointStore,
};
pub use context::{ContextSnapshot, ExecutionContext};
pub use error::{EngineError, EngineResult, ExecutionError, ExecutionPhase, FailurePoint};
pub use executor::{
    Command, EventEnvelope, ExecutionEvent, ExecutionState, ExecutorConfig, ExecutorHandle,
    GraphExecutor, RunReport, StateError,
};
pub use functions::{
    register_builtins, ConditionFunction, FunctionError, FunctionKind, FunctionMetadata,
    FunctionRegistry, NodeFunction, NodeOutcome, ParameterSpec, RegistryError, ReturnType,
    RoutingFunction, TriggerFunction,
};
pub use graph::{
    default_rules, validate, CompileMode, Diagnostic, DiagnosticLevel, Edge, GraphDefinition,
    Node, NodeKind, Position, SubworkflowStandard, ValidationReport, ValidationRule,
    WorkflowGraph,
};
pub use hooks::{
    ChainOutcome, ErrorStrategy, ExecutionMode, Hook, HookChain, HookChainConfig, HookError,
    HookInput, HookPoint, HookRegistry, HookResult,
};
