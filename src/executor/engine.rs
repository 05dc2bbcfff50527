use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::checkpoint::CheckpointManager;
use crate::context::ExecutionContext;
use crate::error::{EngineError, ExecutionError, ExecutionPhase, FailurePoint};
use crate::functions::{FunctionRegistry, NodeOutcome};
use crate::graph::{Node, NodeKind, WorkflowGraph};
use crate::hooks::{HookInput, HookPoint, HookRegistry};

use super::events::{EventEmitter, EventEnvelope, ExecutionEvent};
use super::state::ExecutionState;

/// Knobs for one executor. All timeouts are optional except the merge join
/// bound, which always exists so a starved merge cannot hang a run forever.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub run_timeout: Option<Duration>,
    pub node_timeout: Option<Duration>,
    pub merge_timeout: Duration,
    /// Snapshot the context every N completed nodes when a checkpoint
    /// manager is attached.
    pub checkpoint_interval: Option<u64>,
    /// Sleep between scheduling passes while only merge joins are pending.
    pub poll_interval: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            run_timeout: None,
            node_timeout: None,
            merge_timeout: Duration::from_secs(30),
            checkpoint_interval: None,
            poll_interval: Duration::from_millis(25),
        }
    }
}

/// Control commands accepted by a running execution. Pause and cancel take
/// effect at the next step boundary, never mid-node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Cancel,
    Pause,
    Resume,
}

/// Cheap cloneable handle for steering and observing a run from outside.
#[derive(Clone)]
pub struct ExecutorHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: Arc<parking_lot::RwLock<ExecutionState>>,
}

impl ExecutorHandle {
    pub fn cancel(&self) {
        let _ = self.commands.send(Command::Cancel);
    }

    pub fn pause(&self) {
        let _ = self.commands.send(Command::Pause);
    }

    pub fn resume(&self) {
        let _ = self.commands.send(Command::Resume);
    }

    pub fn state(&self) -> ExecutionState {
        *self.state.read()
    }
}

/// What a successful run hands back.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub execution_id: String,
    pub state: ExecutionState,
    pub output: Value,
    pub executed_nodes: Vec<String>,
    pub edge_results: HashMap<String, bool>,
    /// Node executions, counting re-entries separately.
    pub steps: u64,
    pub duration_ms: u64,
}

/// Drives a compiled graph: frontier-batch scheduling with concurrent
/// branches, guarded edges, merge join barriers, and optional hooks,
/// events, and checkpoints.
pub struct GraphExecutor {
    graph: Arc<WorkflowGraph>,
    registry: Arc<FunctionRegistry>,
    config: ExecutorConfig,
    hooks: Option<Arc<HookRegistry>>,
    checkpoints: Option<Arc<CheckpointManager>>,
    events_tx: parking_lot::Mutex<Option<mpsc::UnboundedSender<EventEnvelope>>>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    commands: tokio::sync::Mutex<mpsc::UnboundedReceiver<Command>>,
    state: Arc<parking_lot::RwLock<ExecutionState>>,
}

impl GraphExecutor {
    pub fn new(graph: Arc<WorkflowGraph>, registry: Arc<FunctionRegistry>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        Self {
            graph,
            registry,
            config: ExecutorConfig::default(),
            hooks: None,
            checkpoints: None,
            events_tx: parking_lot::Mutex::new(None),
            cmd_tx,
            commands: tokio::sync::Mutex::new(cmd_rx),
            state: Arc::new(parking_lot::RwLock::new(ExecutionState::Pending)),
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<HookRegistry>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn with_checkpoints(mut self, checkpoints: Arc<CheckpointManager>) -> Self {
        self.checkpoints = Some(checkpoints);
        self
    }

    pub fn handle(&self) -> ExecutorHandle {
        ExecutorHandle {
            commands: self.cmd_tx.clone(),
            state: Arc::clone(&self.state),
        }
    }

    pub fn state(&self) -> ExecutionState {
        *self.state.read()
    }

    /// Open the event stream. Events from subsequent runs land on the
    /// returned receiver; a dropped receiver is silently ignored.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<EventEnvelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.events_tx.lock() = Some(tx);
        rx
    }

    /// Execute the graph against `input`. Returns `Ok` only for a run that
    /// reaches `Completed`; cancellation, timeouts, and node failures all
    /// surface as errors after the matching terminal event is emitted.
    ///
    /// An executor drives exactly one run. Terminal states have no exits,
    /// so a second call is rejected with `StateError::InvalidTransition`;
    /// build a fresh executor per run.
    pub async fn run(&self, input: Value) -> Result<RunReport, EngineError> {
        let execution_id = Uuid::new_v4().to_string();
        let emitter = match self.events_tx.lock().clone() {
            Some(tx) => EventEmitter::from_sender(&execution_id, self.graph.id(), tx),
            None => EventEmitter::disabled(&execution_id, self.graph.id()),
        };

        self.set_state(ExecutionState::Running)?;

        let ctx = Arc::new(RwLock::new(ExecutionContext::new(
            &execution_id,
            Arc::clone(&self.graph),
            input.clone(),
        )));

        self.fire_hook(HookPoint::RunStart, &execution_id, json!({ "input": input }))
            .await;
        emitter.emit(ExecutionEvent::Started { input });
        tracing::info!(execution_id = %execution_id, graph_id = self.graph.id(), "run started");

        let started = Instant::now();
        let result = self.drive(&execution_id, &ctx, &emitter).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok((output, steps)) => {
                self.set_state(ExecutionState::Completed)?;
                let (executed_nodes, edge_results) = {
                    let ctx_r = ctx.read().await;
                    (ctx_r.executed_nodes(), ctx_r.edge_results().clone())
                };
                emitter.emit(ExecutionEvent::Completed {
                    output: output.clone(),
                    executed_nodes: executed_nodes.clone(),
                    duration_ms,
                });
                self.fire_hook(
                    HookPoint::RunEnd,
                    &execution_id,
                    json!({ "output": output, "duration_ms": duration_ms }),
                )
                .await;
                tracing::info!(execution_id = %execution_id, duration_ms, "run completed");
                Ok(RunReport {
                    execution_id,
                    state: ExecutionState::Completed,
                    output,
                    executed_nodes,
                    edge_results,
                    steps,
                    duration_ms,
                })
            }
            Err(err) => {
                let (terminal, event) = Self::terminal_for(&err);
                self.set_state(terminal)?;
                emitter.emit(event);
                self.fire_hook(
                    HookPoint::OnError,
                    &execution_id,
                    json!({ "error": err.to_string() }),
                )
                .await;
                self.fire_hook(
                    HookPoint::RunEnd,
                    &execution_id,
                    json!({ "error": err.to_string(), "duration_ms": duration_ms }),
                )
                .await;
                tracing::warn!(execution_id = %execution_id, error = %err, "run aborted");
                Err(err)
            }
        }
    }

    fn terminal_for(err: &EngineError) -> (ExecutionState, ExecutionEvent) {
        match err {
            EngineError::Execution(ExecutionError::Cancelled { last_node }) => (
                ExecutionState::Cancelled,
                ExecutionEvent::Cancelled {
                    last_node: last_node.clone(),
                },
            ),
            EngineError::Execution(ExecutionError::Timeout { node_id }) => (
                ExecutionState::TimedOut,
                ExecutionEvent::TimedOut {
                    node_in_progress: node_id.clone(),
                },
            ),
            // A starved merge join is a timeout, not a failure. The missing
            // predecessors stay on the returned error.
            EngineError::Execution(ExecutionError::MergeTimeout { node_id, .. }) => (
                ExecutionState::TimedOut,
                ExecutionEvent::TimedOut {
                    node_in_progress: Some(node_id.clone()),
                },
            ),
            other => (
                ExecutionState::Failed,
                ExecutionEvent::Failed {
                    error: other.to_string(),
                    failure_point: failure_point_for(other),
                },
            ),
        }
    }

    async fn drive(
        &self,
        execution_id: &str,
        ctx: &Arc<RwLock<ExecutionContext>>,
        emitter: &EventEmitter,
    ) -> Result<(Value, u64), EngineError> {
        let mut commands = self.commands.lock().await;

        let entries: Vec<String> = self
            .graph
            .entry_nodes()
            .into_iter()
            .map(|n| n.id.clone())
            .collect();
        if entries.is_empty() {
            return Err(ExecutionError::NoEntryNodes.into());
        }

        let total_reachable = self.graph.reachable_from_entries().len().max(1);
        let mut frontier: VecDeque<String> = entries.into();
        let mut pending_merges: HashMap<String, Instant> = HashMap::new();
        let mut last_node: Option<String> = None;
        let mut completed_nodes: u64 = 0;
        let started = Instant::now();

        loop {
            self.drain_commands(&mut commands, emitter, &last_node)
                .await?;
            if let Some(limit) = self.config.run_timeout {
                if started.elapsed() > limit {
                    return Err(ExecutionError::Timeout { node_id: None }.into());
                }
            }

            let mut batch: Vec<Node> = Vec::new();
            {
                let ctx_r = ctx.read().await;
                let mut seen: HashSet<String> = HashSet::new();
                while let Some(id) = frontier.pop_front() {
                    if !seen.insert(id.clone()) {
                        continue;
                    }
                    let node = self.graph.node(&id).ok_or_else(|| {
                        ExecutionError::NodeCannotExecute {
                            node_id: id.clone(),
                        }
                    })?;
                    if node.kind == NodeKind::Merge {
                        pending_merges.entry(id).or_insert_with(Instant::now);
                    } else {
                        batch.push(node.clone());
                    }
                }

                // A merge joins once every incoming edge's source has run.
                let mut ready = Vec::new();
                for (id, since) in &pending_merges {
                    let missing: Vec<String> = self
                        .graph
                        .incoming(id)
                        .into_iter()
                        .filter(|e| !ctx_r.is_executed(&e.source))
                        .map(|e| e.source.clone())
                        .collect();
                    if missing.is_empty() {
                        ready.push(id.clone());
                    } else if since.elapsed() > self.config.merge_timeout {
                        return Err(ExecutionError::MergeTimeout {
                            node_id: id.clone(),
                            missing,
                        }
                        .into());
                    }
                }
                for id in ready {
                    pending_merges.remove(&id);
                    if let Some(node) = self.graph.node(&id) {
                        batch.push(node.clone());
                    }
                }
            }

            if batch.is_empty() {
                if pending_merges.is_empty() {
                    break;
                }
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            }

            for node in &batch {
                self.fire_hook(
                    HookPoint::BeforeNode,
                    execution_id,
                    json!({ "node_id": node.id }),
                )
                .await;
                emitter.emit(ExecutionEvent::NodeStarted {
                    node_id: node.id.clone(),
                });
            }

            let mut set = JoinSet::new();
            for node in batch {
                let ctx = Arc::clone(ctx);
                let registry = Arc::clone(&self.registry);
                let node_timeout = self.config.node_timeout;
                set.spawn(async move {
                    let t0 = Instant::now();
                    let result = execute_node(&node, &ctx, &registry, node_timeout).await;
                    (node, result, t0.elapsed().as_millis() as u64)
                });
            }

            while let Some(joined) = set.join_next().await {
                let (node, result, duration_ms) =
                    joined.map_err(|e| ExecutionError::NodeFailed {
                        node_id: "unknown".to_string(),
                        message: format!("node task panicked: {e}"),
                    })?;
                let run = result?;

                {
                    let mut ctx_w = ctx.write().await;
                    ctx_w.set_node_result(&node.id, run.outcome.output.clone());
                    for (name, value) in run.outcome.variables {
                        ctx_w.set_variable(name, value);
                    }
                    ctx_w.mark_executed(&node.id);
                }
                emitter.emit(ExecutionEvent::NodeCompleted {
                    node_id: node.id.clone(),
                    output: run.outcome.output.clone(),
                    duration_ms,
                });
                self.fire_hook(
                    HookPoint::AfterNode,
                    execution_id,
                    json!({ "node_id": node.id, "output": run.outcome.output }),
                )
                .await;

                completed_nodes += 1;
                last_node = Some(node.id.clone());
                if let (Some(manager), Some(every)) =
                    (&self.checkpoints, self.config.checkpoint_interval)
                {
                    if every > 0 && completed_nodes % every == 0 {
                        let snapshot = ctx.read().await.snapshot();
                        manager
                            .create(execution_id, self.graph.id(), &node.id, snapshot)
                            .await?;
                    }
                }

                for target in self.successors(&node, run.routed, ctx).await? {
                    frontier.push_back(target);
                }
            }

            let executed = ctx.read().await.executed_count();
            emitter.emit(ExecutionEvent::Progress {
                executed,
                total_reachable,
                ratio: executed as f64 / total_reachable as f64,
            });
        }

        let ctx_r = ctx.read().await;
        let mut output = serde_json::Map::new();
        for node in self.graph.exit_nodes() {
            if let Some(result) = ctx_r.get_node_result(&node.id) {
                output.insert(node.id.clone(), result.clone());
            }
        }
        Ok((Value::Object(output), completed_nodes))
    }

    /// Targets activated by a finished node, recording each edge decision.
    /// `routed` is the decision function's pick and bypasses edge conditions.
    async fn successors(
        &self,
        node: &Node,
        routed: Option<Vec<String>>,
        ctx: &Arc<RwLock<ExecutionContext>>,
    ) -> Result<Vec<String>, ExecutionError> {
        let outgoing: Vec<crate::graph::Edge> = self
            .graph
            .outgoing(&node.id)
            .into_iter()
            .cloned()
            .collect();

        if let Some(selected) = routed {
            let known: HashSet<&str> = outgoing.iter().map(|e| e.target.as_str()).collect();
            for target in &selected {
                if !known.contains(target.as_str()) {
                    return Err(ExecutionError::NodeFailed {
                        node_id: node.id.clone(),
                        message: format!("routing selected unknown target '{target}'"),
                    });
                }
            }
            let mut ctx_w = ctx.write().await;
            for edge in &outgoing {
                ctx_w.set_edge_result(&edge.id, selected.contains(&edge.target));
            }
            return Ok(selected);
        }

        let mut targets = Vec::new();
        for edge in outgoing {
            let followed = match &edge.condition {
                Some(condition_id) => {
                    let condition = self.registry.condition(condition_id).ok_or_else(|| {
                        ExecutionError::FunctionNotFound {
                            node_id: node.id.clone(),
                            function_id: condition_id.clone(),
                        }
                    })?;
                    let ctx_r = ctx.read().await;
                    condition
                        .evaluate(&edge, &ctx_r)
                        .await
                        .map_err(|e| ExecutionError::EdgeFailed {
                            edge_id: edge.id.clone(),
                            message: e.to_string(),
                        })?
                }
                None => true,
            };
            ctx.write().await.set_edge_result(&edge.id, followed);
            if followed {
                targets.push(edge.target.clone());
            }
        }
        Ok(targets)
    }

    async fn drain_commands(
        &self,
        commands: &mut mpsc::UnboundedReceiver<Command>,
        emitter: &EventEmitter,
        last_node: &Option<String>,
    ) -> Result<(), EngineError> {
        loop {
            match commands.try_recv() {
                Ok(Command::Cancel) => {
                    return Err(ExecutionError::Cancelled {
                        last_node: last_node.clone(),
                    }
                    .into());
                }
                Ok(Command::Pause) => {
                    self.set_state(ExecutionState::Paused)?;
                    emitter.emit(ExecutionEvent::Paused);
                    loop {
                        match commands.recv().await {
                            Some(Command::Resume) => {
                                self.set_state(ExecutionState::Running)?;
                                emitter.emit(ExecutionEvent::Resumed);
                                break;
                            }
                            Some(Command::Cancel) => {
                                return Err(ExecutionError::Cancelled {
                                    last_node: last_node.clone(),
                                }
                                .into());
                            }
                            Some(Command::Pause) => {}
                            None => {
                                self.set_state(ExecutionState::Running)?;
                                break;
                            }
                        }
                    }
                }
                Ok(Command::Resume) => {}
                Err(_) => return Ok(()),
            }
        }
    }

    async fn fire_hook(&self, point: HookPoint, execution_id: &str, payload: Value) {
        let Some(hooks) = &self.hooks else {
            return;
        };
        let input = HookInput::new(point.clone(), execution_id, self.graph.id(), payload);
        if let Some(outcome) = hooks.fire(&point, input).await {
            if !outcome.success {
                tracing::warn!(
                    hook_point = %point,
                    error = outcome.error.as_deref().unwrap_or(""),
                    "hook chain reported failure"
                );
            }
        }
    }

    fn set_state(&self, to: ExecutionState) -> Result<(), EngineError> {
        let mut state = self.state.write();
        *state = state.transition(to)?;
        Ok(())
    }
}

fn failure_point_for(err: &EngineError) -> Option<FailurePoint> {
    match err {
        EngineError::Execution(ExecutionError::NodeFailed { node_id, .. })
        | EngineError::Execution(ExecutionError::NodeCannotExecute { node_id })
        | EngineError::Execution(ExecutionError::FunctionNotFound { node_id, .. }) => {
            Some(FailurePoint::node(node_id, ExecutionPhase::NodeExecution))
        }
        EngineError::Execution(ExecutionError::EdgeFailed { edge_id, .. }) => {
            Some(FailurePoint::edge(edge_id, ExecutionPhase::EdgeEvaluation))
        }
        EngineError::Checkpoint(_) => Some(FailurePoint {
            node_id: None,
            edge_id: None,
            phase: ExecutionPhase::Checkpoint,
        }),
        _ => None,
    }
}

struct NodeRun {
    outcome: NodeOutcome,
    /// `Some` only for decision nodes; an empty pick ends the branch.
    routed: Option<Vec<String>>,
}

async fn execute_node(
    node: &Node,
    ctx: &RwLock<ExecutionContext>,
    registry: &FunctionRegistry,
    node_timeout: Option<Duration>,
) -> Result<NodeRun, ExecutionError> {
    let fut = run_function(node, ctx, registry);
    match node_timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ExecutionError::Timeout {
                node_id: Some(node.id.clone()),
            })?,
        None => fut.await,
    }
}

async fn run_function(
    node: &Node,
    ctx: &RwLock<ExecutionContext>,
    registry: &FunctionRegistry,
) -> Result<NodeRun, ExecutionError> {
    match node.kind {
        NodeKind::Decision => {
            let function_id =
                node.function_ref()
                    .ok_or_else(|| ExecutionError::NodeCannotExecute {
                        node_id: node.id.clone(),
                    })?;
            let routing =
                registry
                    .routing(function_id)
                    .ok_or_else(|| ExecutionError::FunctionNotFound {
                        node_id: node.id.clone(),
                        function_id: function_id.to_string(),
                    })?;
            let ctx_r = ctx.read().await;
            let picked =
                routing
                    .route(node, &ctx_r)
                    .await
                    .map_err(|e| ExecutionError::NodeFailed {
                        node_id: node.id.clone(),
                        message: e.to_string(),
                    })?;
            Ok(NodeRun {
                outcome: NodeOutcome::output(Value::Null),
                routed: Some(picked.unwrap_or_default()),
            })
        }
        NodeKind::Task | NodeKind::Subworkflow => {
            let function_id =
                node.function_ref()
                    .ok_or_else(|| ExecutionError::NodeCannotExecute {
                        node_id: node.id.clone(),
                    })?;
            let function =
                registry
                    .node(function_id)
                    .ok_or_else(|| ExecutionError::FunctionNotFound {
                        node_id: node.id.clone(),
                        function_id: function_id.to_string(),
                    })?;
            let ctx_r = ctx.read().await;
            let allowed = function.can_execute(node, &ctx_r).await.map_err(|e| {
                ExecutionError::NodeFailed {
                    node_id: node.id.clone(),
                    message: e.to_string(),
                }
            })?;
            if !allowed {
                return Err(ExecutionError::NodeCannotExecute {
                    node_id: node.id.clone(),
                });
            }
            let outcome =
                function
                    .execute(node, &ctx_r)
                    .await
                    .map_err(|e| ExecutionError::NodeFailed {
                        node_id: node.id.clone(),
                        message: e.to_string(),
                    })?;
            Ok(NodeRun {
                outcome,
                routed: None,
            })
        }
        // Start, End, Parallel, and Merge pass through by default but honor
        // an explicit function binding.
        _ => {
            if let Some(function_id) = node.function_ref() {
                if let Some(function) = registry.node(function_id) {
                    let ctx_r = ctx.read().await;
                    let outcome = function.execute(node, &ctx_r).await.map_err(|e| {
                        ExecutionError::NodeFailed {
                            node_id: node.id.clone(),
                            message: e.to_string(),
                        }
                    })?;
                    return Ok(NodeRun {
                        outcome,
                        routed: None,
                    });
                }
            }
            let output = node.config.get("output").cloned().unwrap_or(Value::Null);
            Ok(NodeRun {
                outcome: NodeOutcome::output(output),
                routed: None,
            })
        }
    }
}
