use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A point-in-time snapshot of one execution thread.
///
/// The snapshot payload is an opaque [`Value`], typically produced by
/// `ExecutionContext::snapshot`, so the manager never needs to understand
/// what it is retaining.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub thread_id: String,
    pub workflow_id: String,
    /// Last node completed before the snapshot was taken.
    pub node_id: String,
    pub state_data: Value,
    pub created_at: DateTime<Utc>,
    pub restore_count: u64,
    pub last_restored_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn new(
        thread_id: impl Into<String>,
        workflow_id: impl Into<String>,
        node_id: impl Into<String>,
        state_data: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            workflow_id: workflow_id.into(),
            node_id: node_id.into(),
            state_data,
            created_at: Utc::now(),
            restore_count: 0,
            last_restored_at: None,
        }
    }

    pub(crate) fn mark_restored(&mut self) {
        self.restore_count += 1;
        self.last_restored_at = Some(Utc::now());
    }
}
