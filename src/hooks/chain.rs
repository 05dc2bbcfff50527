use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HookError {
    #[error("Hook failed: {0}")]
    Failed(String),
    #[error("Hook chain timed out after {0:?}")]
    ChainTimeout(Duration),
    #[error("Invalid hook chain: {0}")]
    InvalidChain(String),
}

/// A named place in the execution lifecycle where external logic may run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    RunStart,
    BeforeNode,
    AfterNode,
    OnError,
    RunEnd,
    Custom(String),
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPoint::RunStart => write!(f, "run_start"),
            HookPoint::BeforeNode => write!(f, "before_node"),
            HookPoint::AfterNode => write!(f, "after_node"),
            HookPoint::OnError => write!(f, "on_error"),
            HookPoint::RunEnd => write!(f, "run_end"),
            HookPoint::Custom(id) => write!(f, "{}", id),
        }
    }
}

/// Payload handed to each hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookInput {
    pub hook_point: HookPoint,
    pub execution_id: String,
    pub graph_id: String,
    pub payload: Value,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl HookInput {
    pub fn new(
        hook_point: HookPoint,
        execution_id: impl Into<String>,
        graph_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            hook_point,
            execution_id: execution_id.into(),
            graph_id: graph_id.into(),
            payload,
            metadata: HashMap::new(),
        }
    }
}

/// A cross-cutting interceptor.
#[async_trait]
pub trait Hook: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str {
        self.id()
    }

    async fn run(&self, input: &HookInput) -> Result<Value, HookError>;
}

/// How the hooks within a chain are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
    Pipeline,
}

/// What happens to the rest of the chain when a hook fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    #[default]
    StopOnError,
    ContinueOnError,
    LogAndContinue,
}

/// Construction input for [`HookChain::build`]; defaults fill every field
/// except the hook point and the hooks themselves.
pub struct HookChainConfig {
    pub hook_point: HookPoint,
    pub hooks: Vec<Arc<dyn Hook>>,
    pub enabled: bool,
    pub mode: ExecutionMode,
    pub error_strategy: ErrorStrategy,
    pub timeout: Option<Duration>,
    pub max_retries: u32,
}

impl HookChainConfig {
    pub fn new(hook_point: HookPoint) -> Self {
        Self {
            hook_point,
            hooks: Vec::new(),
            enabled: true,
            mode: ExecutionMode::default(),
            error_strategy: ErrorStrategy::default(),
            timeout: None,
            max_retries: 0,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_error_strategy(mut self, strategy: ErrorStrategy) -> Self {
        self.error_strategy = strategy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A validated chain of hooks bound to one extension point. Built once,
/// reused across runs; replacing the hook list means building a new chain.
pub struct HookChain {
    pub(crate) hook_point: HookPoint,
    pub(crate) hooks: Vec<Arc<dyn Hook>>,
    pub(crate) enabled: bool,
    pub(crate) mode: ExecutionMode,
    pub(crate) error_strategy: ErrorStrategy,
    pub(crate) timeout: Option<Duration>,
    pub(crate) max_retries: u32,
}

impl std::fmt::Debug for HookChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookChain")
            .field("hook_point", &self.hook_point)
            .field("hooks", &self.hooks.len())
            .field("enabled", &self.enabled)
            .field("mode", &self.mode)
            .field("error_strategy", &self.error_strategy)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl HookChain {
    /// Validate the configuration atomically; an invalid config never yields
    /// a half-built chain.
    pub fn build(config: HookChainConfig) -> Result<Self, HookError> {
        if let HookPoint::Custom(id) = &config.hook_point {
            if id.trim().is_empty() {
                return Err(HookError::InvalidChain(
                    "extension point id must not be empty".to_string(),
                ));
            }
        }
        if config.hooks.is_empty() {
            return Err(HookError::InvalidChain(format!(
                "chain for {} has no hooks",
                config.hook_point
            )));
        }
        Ok(Self {
            hook_point: config.hook_point,
            hooks: config.hooks,
            enabled: config.enabled,
            mode: config.mode,
            error_strategy: config.error_strategy,
            timeout: config.timeout,
            max_retries: config.max_retries,
        })
    }

    pub fn hook_point(&self) -> &HookPoint {
        &self.hook_point
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }
}

/// Chains keyed by extension point, consumed by the executor.
#[derive(Default)]
pub struct HookRegistry {
    chains: HashMap<HookPoint, HookChain>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a chain to its extension point, replacing any previous chain.
    pub fn register(&mut self, chain: HookChain) {
        self.chains.insert(chain.hook_point.clone(), chain);
    }

    pub fn chain(&self, point: &HookPoint) -> Option<&HookChain> {
        self.chains.get(point)
    }

    /// Run the chain bound to `point`, if any.
    pub async fn fire(
        &self,
        point: &HookPoint,
        input: HookInput,
    ) -> Option<super::runner::ChainOutcome> {
        match self.chains.get(point) {
            Some(chain) => Some(chain.run(input).await),
            None => None,
        }
    }
}
