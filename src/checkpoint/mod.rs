//! Checkpointing: bounded in-memory retention of execution snapshots with an
//! optional durable store behind it.

mod manager;
mod store;
mod types;

pub use manager::{CheckpointManager, CheckpointManagerConfig};
pub use store::{CheckpointError, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use types::Checkpoint;
