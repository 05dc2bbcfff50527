use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::types::Checkpoint;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Checkpoint serialization error: {0}")]
    Serialization(String),
    #[error("Checkpoint storage error: {0}")]
    Storage(String),
    #[error("Checkpoint corrupted: {0}")]
    Corrupted(String),
}

/// Durable backing for checkpoints. The manager treats a missing checkpoint
/// as `None`, never as an error.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;
    async fn load(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;
    async fn delete(&self, checkpoint_id: &str) -> Result<(), CheckpointError>;
    /// All stored checkpoints in creation order, oldest first.
    async fn load_all(&self) -> Result<Vec<Checkpoint>, CheckpointError>;
}

#[derive(Default)]
pub struct MemoryCheckpointStore {
    data: tokio::sync::RwLock<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.data
            .write()
            .await
            .insert(checkpoint.id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.data.read().await.get(checkpoint_id).cloned())
    }

    async fn delete(&self, checkpoint_id: &str) -> Result<(), CheckpointError> {
        self.data.write().await.remove(checkpoint_id);
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Checkpoint>, CheckpointError> {
        let mut all: Vec<Checkpoint> = self.data.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }
}

/// One JSON file per checkpoint under a fixed directory.
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| CheckpointError::Storage(e.to_string()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, checkpoint_id: &str) -> PathBuf {
        self.dir.join(format!("{}.checkpoint.json", checkpoint_id))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let path = self.path_for(&checkpoint.id);
        let bytes = serde_json::to_vec(checkpoint)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))
    }

    async fn load(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.path_for(checkpoint_id);
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CheckpointError::Storage(e.to_string())),
        };

        let checkpoint = serde_json::from_slice::<Checkpoint>(&bytes)
            .map_err(|e| CheckpointError::Corrupted(e.to_string()))?;
        Ok(Some(checkpoint))
    }

    async fn delete(&self, checkpoint_id: &str) -> Result<(), CheckpointError> {
        let path = self.path_for(checkpoint_id);
        let _ = tokio::fs::remove_file(path).await;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Checkpoint>, CheckpointError> {
        let mut dir = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;

        let mut all = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            let checkpoint = serde_json::from_slice::<Checkpoint>(&bytes)
                .map_err(|e| CheckpointError::Corrupted(e.to_string()))?;
            all.push(checkpoint);
        }
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }
}
