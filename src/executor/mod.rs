//! The run loop: frontier-batch scheduling, lifecycle state, and the event
//! stream.

mod engine;
mod events;
mod state;

pub use engine::{Command, ExecutorConfig, ExecutorHandle, GraphExecutor, RunReport};
pub use events::{EventEmitter, EventEnvelope, ExecutionEvent, SCHEMA_VERSION};
pub use state::{ExecutionState, StateError};
