use thiserror::Error;

use super::ExecutionError;
use crate::checkpoint::CheckpointError;
use crate::executor::StateError;
use crate::functions::{FunctionError, RegistryError};
use crate::graph::ValidationReport;
use crate::hooks::HookError;

pub type EngineResult<T> = Result<T, EngineError>;

/// Top-level engine error aggregating the per-subsystem kinds.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Graph validation failed")]
    ValidationFailed(Box<ValidationReport>),
    #[error("Graph build error: {0}")]
    GraphBuild(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Function(#[from] FunctionError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Hook(#[from] HookError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl EngineError {
    /// The validation report, when this error is a validation failure.
    pub fn validation_report(&self) -> Option<&ValidationReport> {
        match self {
            EngineError::ValidationFailed(report) => Some(report),
            _ => None,
        }
    }
}
