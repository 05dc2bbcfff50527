//! Engine error types.
//!
//! Each subsystem carries its own `thiserror` enum; [`EngineError`] is the
//! top-level aggregate returned from public entry points. Absence (an unknown
//! registry id, a missing checkpoint) is expressed as `Option`/`bool` at the
//! call site, never as an error.

mod engine_error;
mod execution_error;

pub use engine_error::{EngineError, EngineResult};
pub use execution_error::{ExecutionError, ExecutionPhase, FailurePoint};
