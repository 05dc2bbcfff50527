use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::FailurePoint;

/// Bumped whenever the envelope or event payloads change shape.
pub const SCHEMA_VERSION: u32 = 1;

/// Event stream payloads. Terminal events carry enough detail for a consumer
/// that never inspects the run result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    Started {
        input: Value,
    },
    NodeStarted {
        node_id: String,
    },
    NodeCompleted {
        node_id: String,
        output: Value,
        duration_ms: u64,
    },
    Progress {
        executed: usize,
        total_reachable: usize,
        ratio: f64,
    },
    Paused,
    Resumed,
    Completed {
        output: Value,
        executed_nodes: Vec<String>,
        duration_ms: u64,
    },
    Failed {
        error: String,
        failure_point: Option<FailurePoint>,
    },
    Cancelled {
        last_node: Option<String>,
    },
    TimedOut {
        node_in_progress: Option<String>,
    },
}

impl ExecutionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. }
                | Self::Failed { .. }
                | Self::Cancelled { .. }
                | Self::TimedOut { .. }
        )
    }
}

/// Every event leaves the engine wrapped in the same envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: String,
    pub execution_id: String,
    pub graph_id: String,
    pub timestamp: DateTime<Utc>,
    pub schema_version: u32,
    pub event: ExecutionEvent,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

/// Fire-and-forget emitter. A dropped receiver never stalls or fails the run.
#[derive(Clone)]
pub struct EventEmitter {
    execution_id: String,
    graph_id: String,
    tx: Option<mpsc::UnboundedSender<EventEnvelope>>,
}

impl EventEmitter {
    pub fn channel(
        execution_id: impl Into<String>,
        graph_id: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<EventEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                execution_id: execution_id.into(),
                graph_id: graph_id.into(),
                tx: Some(tx),
            },
            rx,
        )
    }

    pub fn from_sender(
        execution_id: impl Into<String>,
        graph_id: impl Into<String>,
        tx: mpsc::UnboundedSender<EventEnvelope>,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            graph_id: graph_id.into(),
            tx: Some(tx),
        }
    }

    pub fn disabled(execution_id: impl Into<String>, graph_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            graph_id: graph_id.into(),
            tx: None,
        }
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        let envelope = EventEnvelope {
            event_id: Uuid::new_v4().to_string(),
            execution_id: self.execution_id.clone(),
            graph_id: self.graph_id.clone(),
            timestamp: Utc::now(),
            schema_version: SCHEMA_VERSION,
            event,
            metadata: HashMap::new(),
        };
        let _ = tx.send(envelope);
    }
}
