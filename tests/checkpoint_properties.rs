//! Retention and restore behavior of the checkpoint manager, including the
//! executor-driven checkpoint interval.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use flowgraph::{
    Checkpoint, CheckpointManager, CheckpointManagerConfig, CheckpointStore, CompileMode,
    Edge, ExecutionContext, ExecutorConfig, FileCheckpointStore, FunctionError, FunctionKind,
    FunctionMetadata, FunctionRegistry, GraphDefinition, GraphExecutor, Node, NodeFunction,
    NodeKind, NodeOutcome, WorkflowGraph,
};

fn manager(thread_limit: usize, global_limit: usize) -> CheckpointManager {
    CheckpointManager::new(CheckpointManagerConfig {
        thread_limit,
        global_limit,
    })
}

#[tokio::test]
async fn test_thread_bound_retains_five_newest_of_ten() {
    let mgr = manager(5, 100);
    for step in 0..10u64 {
        mgr.create("thread-1", "wf-1", &format!("node-{step}"), json!({ "step": step }))
            .await
            .unwrap();
    }

    assert_eq!(mgr.thread_checkpoint_count("thread-1").await, 5);
    let newest = mgr.latest_checkpoint("thread-1").await.unwrap();
    assert_eq!(newest.state_data["step"], json!(9));
}

#[tokio::test]
async fn test_global_bound_caps_across_ten_threads() {
    let mgr = manager(10, 5);
    for t in 0..10 {
        mgr.create(&format!("thread-{t}"), "wf-1", "node-1", json!({ "thread": t }))
            .await
            .unwrap();
    }

    assert_eq!(mgr.checkpoint_count().await, 5);
    // Only the five newest threads keep their checkpoint.
    assert_eq!(
        mgr.thread_ids().await,
        vec!["thread-5", "thread-6", "thread-7", "thread-8", "thread-9"]
    );
}

#[tokio::test]
async fn test_thread_listing_is_newest_first() {
    let mgr = manager(10, 100);
    for step in 0..3u64 {
        mgr.create("t", "wf", &format!("n{step}"), json!(step)).await.unwrap();
    }

    let nodes: Vec<String> = mgr
        .thread_checkpoints("t")
        .await
        .into_iter()
        .map(|c| c.node_id)
        .collect();
    assert_eq!(nodes, vec!["n2", "n1", "n0"]);
}

#[tokio::test]
async fn test_repeated_restore_is_allowed() {
    let mgr = manager(10, 100);
    let cp = mgr.create("t", "wf", "n", json!({"v": 7})).await.unwrap();

    for expected in 1..=3u64 {
        let restored = mgr.restore(&cp.id).await.unwrap().unwrap();
        assert_eq!(restored.restore_count, expected);
        assert_eq!(restored.state_data, json!({"v": 7}));
    }
}

#[tokio::test]
async fn test_file_store_persists_across_managers() {
    let dir = tempfile::tempdir().unwrap();
    let first_id;
    {
        let store = Arc::new(FileCheckpointStore::new(dir.path()).unwrap());
        let mgr = manager(10, 100).with_store(store);
        first_id = mgr.create("t", "wf", "n0", json!(0)).await.unwrap().id;
        mgr.create("t", "wf", "n1", json!(1)).await.unwrap();
    }

    let store = Arc::new(FileCheckpointStore::new(dir.path()).unwrap());
    let mgr = manager(10, 100).with_store(store);
    assert_eq!(mgr.hydrate().await.unwrap(), 2);
    assert!(mgr.has_checkpoint(&first_id).await);
    assert_eq!(mgr.latest_checkpoint("t").await.unwrap().node_id, "n1");
}

/// Store that remembers every checkpoint ever saved, for asserting mirror
/// traffic.
#[derive(Default)]
struct RecordingStore {
    saved: parking_lot::Mutex<Vec<String>>,
    deleted: parking_lot::Mutex<Vec<String>>,
}

#[async_trait]
impl CheckpointStore for RecordingStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), flowgraph::CheckpointError> {
        self.saved.lock().push(checkpoint.id.clone());
        Ok(())
    }

    async fn load(&self, _id: &str) -> Result<Option<Checkpoint>, flowgraph::CheckpointError> {
        Ok(None)
    }

    async fn delete(&self, id: &str) -> Result<(), flowgraph::CheckpointError> {
        self.deleted.lock().push(id.to_string());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Checkpoint>, flowgraph::CheckpointError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_eviction_mirrors_deletes_to_store() {
    let store = Arc::new(RecordingStore::default());
    let mgr = manager(2, 100).with_store(store.clone());

    let first = mgr.create("t", "wf", "n0", Value::Null).await.unwrap();
    mgr.create("t", "wf", "n1", Value::Null).await.unwrap();
    mgr.create("t", "wf", "n2", Value::Null).await.unwrap();

    assert_eq!(store.saved.lock().len(), 3);
    assert_eq!(*store.deleted.lock(), vec![first.id]);
}

struct CountingTask {
    metadata: FunctionMetadata,
}

#[async_trait]
impl NodeFunction for CountingTask {
    fn metadata(&self) -> &FunctionMetadata {
        &self.metadata
    }

    async fn execute(
        &self,
        node: &Node,
        _ctx: &ExecutionContext,
    ) -> Result<NodeOutcome, FunctionError> {
        Ok(NodeOutcome::output(json!({ "ran": node.id })))
    }
}

#[tokio::test]
async fn test_executor_checkpoints_every_other_node() {
    let registry = Arc::new(FunctionRegistry::new());
    registry
        .register_node(Arc::new(CountingTask {
            metadata: FunctionMetadata::new("count", "count", FunctionKind::Node),
        }))
        .unwrap();

    let def = GraphDefinition::new("wf-ckpt")
        .add_node(Node::new("start", NodeKind::Start))
        .add_node(Node::new("a", NodeKind::Task).with_config(json!({ "function": "count" })))
        .add_node(Node::new("b", NodeKind::Task).with_config(json!({ "function": "count" })))
        .add_node(Node::new("c", NodeKind::Task).with_config(json!({ "function": "count" })))
        .add_edge(Edge::new("e1", "start", "a"))
        .add_edge(Edge::new("e2", "a", "b"))
        .add_edge(Edge::new("e3", "b", "c"));

    let rules = flowgraph::default_rules(registry.known_ids());
    let graph = Arc::new(WorkflowGraph::compile(def, CompileMode::Strict, &rules).unwrap());

    let checkpoints = Arc::new(manager(10, 100));
    let executor = GraphExecutor::new(graph, registry)
        .with_checkpoints(Arc::clone(&checkpoints))
        .with_config(ExecutorConfig {
            checkpoint_interval: Some(2),
            ..ExecutorConfig::default()
        });

    let report = executor.run(json!({})).await.unwrap();

    // 4 nodes ran, so an interval of 2 snapshots twice, keyed by execution id.
    assert_eq!(checkpoints.checkpoint_count().await, 2);
    let latest = checkpoints
        .latest_checkpoint(&report.execution_id)
        .await
        .unwrap();
    assert_eq!(latest.workflow_id, "wf-ckpt");
    let executed = latest.state_data["executed"].as_array().unwrap();
    assert!(!executed.is_empty());
}
