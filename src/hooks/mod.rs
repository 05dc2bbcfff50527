//! Hook chains: ordered/parallel/pipelined cross-cutting logic at named
//! lifecycle extension points.

mod chain;
mod runner;

pub use chain::{
    ErrorStrategy, ExecutionMode, Hook, HookChain, HookChainConfig, HookError, HookInput,
    HookPoint, HookRegistry,
};
pub use runner::{ChainOutcome, HookResult};
