use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use super::store::{CheckpointError, CheckpointStore};
use super::types::Checkpoint;

/// Retention bounds for the in-memory checkpoint pool.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointManagerConfig {
    /// Most checkpoints kept per execution thread.
    pub thread_limit: usize,
    /// Most checkpoints kept across all threads.
    pub global_limit: usize,
}

impl Default for CheckpointManagerConfig {
    fn default() -> Self {
        Self {
            thread_limit: 10,
            global_limit: 100,
        }
    }
}

/// All indexes live behind one lock so that create-and-evict is a single
/// atomic step. Order vectors are oldest first.
#[derive(Default)]
struct Pool {
    checkpoints: HashMap<String, Checkpoint>,
    thread_order: HashMap<String, Vec<String>>,
    global_order: Vec<String>,
}

impl Pool {
    fn remove(&mut self, checkpoint_id: &str) -> Option<Checkpoint> {
        let removed = self.checkpoints.remove(checkpoint_id)?;
        if let Some(order) = self.thread_order.get_mut(&removed.thread_id) {
            order.retain(|id| id != checkpoint_id);
            if order.is_empty() {
                self.thread_order.remove(&removed.thread_id);
            }
        }
        self.global_order.retain(|id| id != checkpoint_id);
        Some(removed)
    }

    /// Insert, then drop the oldest entries that exceed either bound.
    /// Returns the evicted checkpoints.
    fn insert_bounded(
        &mut self,
        checkpoint: Checkpoint,
        config: &CheckpointManagerConfig,
    ) -> Vec<Checkpoint> {
        let id = checkpoint.id.clone();
        let thread_id = checkpoint.thread_id.clone();
        self.checkpoints.insert(id.clone(), checkpoint);
        self.thread_order
            .entry(thread_id.clone())
            .or_default()
            .push(id.clone());
        self.global_order.push(id);

        let mut evicted = Vec::new();
        while self
            .thread_order
            .get(&thread_id)
            .map(|o| o.len())
            .unwrap_or(0)
            > config.thread_limit
        {
            let oldest = self.thread_order[&thread_id][0].clone();
            if let Some(removed) = self.remove(&oldest) {
                evicted.push(removed);
            }
        }
        while self.global_order.len() > config.global_limit {
            let oldest = self.global_order[0].clone();
            if let Some(removed) = self.remove(&oldest) {
                evicted.push(removed);
            }
        }
        evicted
    }
}

/// Bounded checkpoint pool with an optional durable store mirrored behind it.
///
/// Eviction runs inside `create` under the pool lock: thread bound first,
/// then the global bound, oldest entries first. Insertion order is the
/// tie-break when timestamps collide.
#[derive(Default)]
pub struct CheckpointManager {
    config: CheckpointManagerConfig,
    pool: Mutex<Pool>,
    store: Option<Arc<dyn CheckpointStore>>,
}

impl CheckpointManager {
    pub fn new(config: CheckpointManagerConfig) -> Self {
        Self {
            config,
            pool: Mutex::new(Pool::default()),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> CheckpointManagerConfig {
        self.config
    }

    /// Repopulate the pool from the store, oldest first, re-applying the
    /// retention bounds. Evicted entries stay in the store untouched.
    pub async fn hydrate(&self) -> Result<usize, CheckpointError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let all = store.load_all().await?;
        let mut pool = self.pool.lock().await;
        *pool = Pool::default();
        let mut kept = 0;
        for checkpoint in all {
            let evicted = pool.insert_bounded(checkpoint, &self.config);
            kept += 1;
            kept -= evicted.len();
        }
        Ok(kept)
    }

    /// Snapshot `state_data` as a new checkpoint, evicting over-bound entries
    /// in the same atomic step.
    pub async fn create(
        &self,
        thread_id: &str,
        workflow_id: &str,
        node_id: &str,
        state_data: Value,
    ) -> Result<Checkpoint, CheckpointError> {
        let checkpoint = Checkpoint::new(thread_id, workflow_id, node_id, state_data);

        let evicted = {
            let mut pool = self.pool.lock().await;
            pool.insert_bounded(checkpoint.clone(), &self.config)
        };

        if let Some(store) = &self.store {
            store.save(&checkpoint).await?;
            for old in &evicted {
                store.delete(&old.id).await?;
            }
        }
        tracing::debug!(
            checkpoint_id = %checkpoint.id,
            thread_id,
            node_id,
            evicted = evicted.len(),
            "checkpoint created"
        );
        Ok(checkpoint)
    }

    pub async fn get(&self, checkpoint_id: &str) -> Option<Checkpoint> {
        self.pool.lock().await.checkpoints.get(checkpoint_id).cloned()
    }

    /// Fetch a checkpoint for resumption, bumping its restore bookkeeping.
    /// Restoring the same checkpoint repeatedly is allowed.
    pub async fn restore(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let restored = {
            let mut pool = self.pool.lock().await;
            match pool.checkpoints.get_mut(checkpoint_id) {
                Some(checkpoint) => {
                    checkpoint.mark_restored();
                    Some(checkpoint.clone())
                }
                None => None,
            }
        };
        if let (Some(store), Some(checkpoint)) = (&self.store, &restored) {
            store.save(checkpoint).await?;
        }
        Ok(restored)
    }

    pub async fn delete(&self, checkpoint_id: &str) -> Result<bool, CheckpointError> {
        let removed = self.pool.lock().await.remove(checkpoint_id).is_some();
        if removed {
            if let Some(store) = &self.store {
                store.delete(checkpoint_id).await?;
            }
        }
        Ok(removed)
    }

    /// Checkpoints for one thread, newest first.
    pub async fn thread_checkpoints(&self, thread_id: &str) -> Vec<Checkpoint> {
        let pool = self.pool.lock().await;
        let Some(order) = pool.thread_order.get(thread_id) else {
            return Vec::new();
        };
        order
            .iter()
            .rev()
            .filter_map(|id| pool.checkpoints.get(id).cloned())
            .collect()
    }

    pub async fn latest_checkpoint(&self, thread_id: &str) -> Option<Checkpoint> {
        let pool = self.pool.lock().await;
        let order = pool.thread_order.get(thread_id)?;
        order.last().and_then(|id| pool.checkpoints.get(id).cloned())
    }

    pub async fn clear_thread(&self, thread_id: &str) -> Result<usize, CheckpointError> {
        let removed: Vec<String> = {
            let mut pool = self.pool.lock().await;
            let ids = pool.thread_order.remove(thread_id).unwrap_or_default();
            for id in &ids {
                pool.checkpoints.remove(id);
            }
            pool.global_order.retain(|id| !ids.contains(id));
            ids
        };
        if let Some(store) = &self.store {
            for id in &removed {
                store.delete(id).await?;
            }
        }
        Ok(removed.len())
    }

    pub async fn clear_all(&self) -> Result<usize, CheckpointError> {
        let removed: Vec<String> = {
            let mut pool = self.pool.lock().await;
            let ids = std::mem::take(&mut pool.global_order);
            pool.checkpoints.clear();
            pool.thread_order.clear();
            ids
        };
        if let Some(store) = &self.store {
            for id in &removed {
                store.delete(id).await?;
            }
        }
        Ok(removed.len())
    }

    pub async fn has_checkpoint(&self, checkpoint_id: &str) -> bool {
        self.pool.lock().await.checkpoints.contains_key(checkpoint_id)
    }

    pub async fn checkpoint_count(&self) -> usize {
        self.pool.lock().await.checkpoints.len()
    }

    pub async fn thread_checkpoint_count(&self, thread_id: &str) -> usize {
        self.pool
            .lock()
            .await
            .thread_order
            .get(thread_id)
            .map(|o| o.len())
            .unwrap_or(0)
    }

    pub async fn thread_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pool.lock().await.thread_order.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::store::MemoryCheckpointStore;
    use serde_json::json;

    fn manager(thread_limit: usize, global_limit: usize) -> CheckpointManager {
        CheckpointManager::new(CheckpointManagerConfig {
            thread_limit,
            global_limit,
        })
    }

    #[tokio::test]
    async fn test_thread_limit_keeps_newest() {
        let mgr = manager(5, 100);
        for step in 0..10 {
            mgr.create("thread-1", "wf-1", &format!("node-{step}"), json!({ "step": step }))
                .await
                .unwrap();
        }

        assert_eq!(mgr.thread_checkpoint_count("thread-1").await, 5);
        let latest = mgr.latest_checkpoint("thread-1").await.unwrap();
        assert_eq!(latest.state_data["step"], json!(9));

        let kept: Vec<Value> = mgr
            .thread_checkpoints("thread-1")
            .await
            .into_iter()
            .map(|c| c.state_data["step"].clone())
            .collect();
        assert_eq!(kept, vec![json!(9), json!(8), json!(7), json!(6), json!(5)]);
    }

    #[tokio::test]
    async fn test_global_limit_across_threads() {
        let mgr = manager(10, 5);
        for t in 0..10 {
            mgr.create(&format!("thread-{t}"), "wf-1", "node-1", json!({ "thread": t }))
                .await
                .unwrap();
        }

        assert_eq!(mgr.checkpoint_count().await, 5);
        // Oldest five threads lost their only checkpoint.
        for t in 0..5 {
            assert_eq!(mgr.thread_checkpoint_count(&format!("thread-{t}")).await, 0);
        }
        for t in 5..10 {
            assert_eq!(mgr.thread_checkpoint_count(&format!("thread-{t}")).await, 1);
        }
    }

    #[tokio::test]
    async fn test_restore_updates_bookkeeping() {
        let mgr = manager(10, 100);
        let cp = mgr
            .create("thread-1", "wf-1", "node-1", json!({"v": 1}))
            .await
            .unwrap();

        let first = mgr.restore(&cp.id).await.unwrap().unwrap();
        assert_eq!(first.restore_count, 1);
        let second = mgr.restore(&cp.id).await.unwrap().unwrap();
        assert_eq!(second.restore_count, 2);
        assert!(second.last_restored_at.is_some());
    }

    #[tokio::test]
    async fn test_restore_missing_is_none() {
        let mgr = manager(10, 100);
        assert!(mgr.restore("no-such").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_and_missing_delete() {
        let mgr = manager(10, 100);
        let cp = mgr
            .create("thread-1", "wf-1", "node-1", Value::Null)
            .await
            .unwrap();

        assert!(mgr.delete(&cp.id).await.unwrap());
        assert!(!mgr.delete(&cp.id).await.unwrap());
        assert_eq!(mgr.checkpoint_count().await, 0);
    }

    #[tokio::test]
    async fn test_clear_thread_leaves_others() {
        let mgr = manager(10, 100);
        mgr.create("a", "wf", "n1", Value::Null).await.unwrap();
        mgr.create("a", "wf", "n2", Value::Null).await.unwrap();
        mgr.create("b", "wf", "n1", Value::Null).await.unwrap();

        assert_eq!(mgr.clear_thread("a").await.unwrap(), 2);
        assert_eq!(mgr.checkpoint_count().await, 1);
        assert_eq!(mgr.thread_ids().await, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_store_mirrors_create_and_eviction() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let mgr = manager(2, 100).with_store(store.clone());

        let first = mgr.create("t", "wf", "n0", json!(0)).await.unwrap();
        mgr.create("t", "wf", "n1", json!(1)).await.unwrap();
        mgr.create("t", "wf", "n2", json!(2)).await.unwrap();

        // The evicted oldest checkpoint is gone from the store too.
        assert!(store.load(&first.id).await.unwrap().is_none());
        assert_eq!(store.load_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_hydrate_rebuilds_pool() {
        let store = Arc::new(MemoryCheckpointStore::new());
        {
            let mgr = manager(10, 100).with_store(store.clone());
            mgr.create("t", "wf", "n0", json!(0)).await.unwrap();
            mgr.create("t", "wf", "n1", json!(1)).await.unwrap();
        }

        let fresh = manager(10, 100).with_store(store);
        assert_eq!(fresh.checkpoint_count().await, 0);
        assert_eq!(fresh.hydrate().await.unwrap(), 2);
        assert_eq!(fresh.thread_checkpoint_count("t").await, 2);
        let latest = fresh.latest_checkpoint("t").await.unwrap();
        assert_eq!(latest.node_id, "n1");
    }
}
