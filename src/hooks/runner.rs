//! Chain execution: sequential, parallel, and pipelined scheduling with
//! per-hook retry and a chain-level timeout.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinSet;

use super::chain::{ErrorStrategy, ExecutionMode, Hook, HookChain, HookInput};

/// Outcome of one hook within a chain run.
#[derive(Debug, Clone, Serialize)]
pub struct HookResult {
    pub hook_id: String,
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Aggregate outcome of a chain run. Hooks never silently disappear: every
/// hook that ran is present in `hook_results`, and pipeline hooks starved of
/// input are counted in `skipped_count`.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ChainOutcome {
    pub success: bool,
    pub hook_results: Vec<HookResult>,
    pub executed_count: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub final_output: Option<Value>,
    pub error: Option<String>,
}

impl ChainOutcome {
    fn noop() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    fn chain_failure(message: String) -> Self {
        Self {
            success: false,
            error: Some(message),
            ..Default::default()
        }
    }

    fn finish(mut self) -> Self {
        self.executed_count = self.hook_results.len();
        self.success_count = self.hook_results.iter().filter(|r| r.success).count();
        self.failed_count = self.executed_count - self.success_count;
        self.success = self.failed_count == 0;
        if self.error.is_none() {
            self.error = self
                .hook_results
                .iter()
                .find_map(|r| r.error.clone());
        }
        self
    }
}

impl HookChain {
    /// Run the chain against `input`.
    ///
    /// The chain timeout, when set, bounds the entire run and manifests as a
    /// failure of the chain, not of an individual hook.
    pub async fn run(&self, input: HookInput) -> ChainOutcome {
        if !self.enabled {
            return ChainOutcome::noop();
        }
        match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.run_inner(input)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(hook_point = %self.hook_point, ?timeout, "hook chain timed out");
                    ChainOutcome::chain_failure(format!(
                        "hook chain for {} timed out after {:?}",
                        self.hook_point, timeout
                    ))
                }
            },
            None => self.run_inner(input).await,
        }
    }

    async fn run_inner(&self, input: HookInput) -> ChainOutcome {
        match self.mode {
            ExecutionMode::Sequential => self.run_sequential(input).await,
            ExecutionMode::Parallel => self.run_parallel(input).await,
            ExecutionMode::Pipeline => self.run_pipeline(input).await,
        }
    }

    async fn run_sequential(&self, input: HookInput) -> ChainOutcome {
        let mut outcome = ChainOutcome::default();
        for hook in &self.hooks {
            let result = run_with_retry(hook.as_ref(), &input, self.max_retries).await;
            let failed = !result.success;
            if result.success {
                outcome.final_output = result.output.clone();
            }
            outcome.hook_results.push(result);
            if failed {
                match self.error_strategy {
                    // Remaining hooks are not run and not counted — they are
                    // simply absent from the results.
                    ErrorStrategy::StopOnError => break,
                    ErrorStrategy::ContinueOnError => {}
                    ErrorStrategy::LogAndContinue => {
                        let last = outcome.hook_results.last();
                        tracing::warn!(
                            hook_point = %self.hook_point,
                            hook_id = last.map(|r| r.hook_id.as_str()).unwrap_or(""),
                            error = last.and_then(|r| r.error.as_deref()).unwrap_or(""),
                            "hook failed, continuing"
                        );
                    }
                }
            }
        }
        outcome.finish()
    }

    async fn run_parallel(&self, input: HookInput) -> ChainOutcome {
        let mut set = JoinSet::new();
        for hook in &self.hooks {
            let hook = Arc::clone(hook);
            let input = input.clone();
            let max_retries = self.max_retries;
            set.spawn(async move { run_with_retry(hook.as_ref(), &input, max_retries).await });
        }

        let mut outcome = ChainOutcome::default();
        // Completion order; parallel mode guarantees no ordering among hooks.
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => outcome.hook_results.push(result),
                Err(join_error) => {
                    outcome.hook_results.push(HookResult {
                        hook_id: String::new(),
                        success: false,
                        output: None,
                        error: Some(format!("hook task panicked: {}", join_error)),
                        attempts: 1,
                        duration_ms: 0,
                    });
                }
            }
        }
        outcome.finish()
    }

    async fn run_pipeline(&self, input: HookInput) -> ChainOutcome {
        let mut outcome = ChainOutcome::default();
        let mut payload = input.payload.clone();
        for (position, hook) in self.hooks.iter().enumerate() {
            let mut stage_input = input.clone();
            stage_input.payload = payload.clone();
            let result = run_with_retry(hook.as_ref(), &stage_input, self.max_retries).await;
            let failed = !result.success;
            if let Some(output) = &result.output {
                payload = output.clone();
                outcome.final_output = Some(output.clone());
            }
            outcome.hook_results.push(result);
            if failed {
                // No valid input to pass forward, regardless of strategy.
                outcome.skipped_count = self.hooks.len() - position - 1;
                break;
            }
        }
        outcome.finish()
    }
}

async fn run_with_retry(hook: &dyn Hook, input: &HookInput, max_retries: u32) -> HookResult {
    let started = Instant::now();
    let mut attempts = 0;
    let mut last_error = String::new();
    while attempts <= max_retries {
        attempts += 1;
        match hook.run(input).await {
            Ok(output) => {
                return HookResult {
                    hook_id: hook.id().to_string(),
                    success: true,
                    output: Some(output),
                    error: None,
                    attempts,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
            }
            Err(err) => {
                last_error = err.to_string();
                if attempts <= max_retries {
                    tracing::debug!(hook_id = hook.id(), attempt = attempts, "retrying hook");
                }
            }
        }
    }
    HookResult {
        hook_id: hook.id().to_string(),
        success: false,
        output: None,
        error: Some(last_error),
        attempts,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::chain::{HookChainConfig, HookError, HookPoint};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Ok1(&'static str);

    #[async_trait]
    impl Hook for Ok1 {
        fn id(&self) -> &str {
            self.0
        }

        async fn run(&self, input: &HookInput) -> Result<Value, HookError> {
            Ok(json!({ "seen_by": self.0, "payload": input.payload }))
        }
    }

    struct Fail(&'static str);

    #[async_trait]
    impl Hook for Fail {
        fn id(&self) -> &str {
            self.0
        }

        async fn run(&self, _input: &HookInput) -> Result<Value, HookError> {
            Err(HookError::Failed("boom".to_string()))
        }
    }

    /// Adds one to a numeric payload.
    struct Increment(&'static str);

    #[async_trait]
    impl Hook for Increment {
        fn id(&self) -> &str {
            self.0
        }

        async fn run(&self, input: &HookInput) -> Result<Value, HookError> {
            let n = input.payload.as_i64().unwrap_or(0);
            Ok(json!(n + 1))
        }
    }

    struct Sleep(&'static str, Duration);

    #[async_trait]
    impl Hook for Sleep {
        fn id(&self) -> &str {
            self.0
        }

        async fn run(&self, _input: &HookInput) -> Result<Value, HookError> {
            tokio::time::sleep(self.1).await;
            Ok(json!(self.0))
        }
    }

    fn input() -> HookInput {
        HookInput::new(HookPoint::RunStart, "exec-1", "wf-1", json!(0))
    }

    #[tokio::test]
    async fn test_sequential_all_succeed() {
        let chain = HookChain::build(
            HookChainConfig::new(HookPoint::RunStart)
                .with_hook(Arc::new(Ok1("a")))
                .with_hook(Arc::new(Ok1("b"))),
        )
        .unwrap();
        let outcome = chain.run(input()).await;
        assert!(outcome.success);
        assert_eq!(outcome.executed_count, 2);
        assert_eq!(outcome.success_count, 2);
        assert_eq!(outcome.failed_count, 0);
        let ids: Vec<&str> = outcome.hook_results.iter().map(|r| r.hook_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_sequential_stop_on_error() {
        // 3 hooks, hook 2 fails: hook 3 never runs and is absent from the
        // results, not counted as failed or skipped.
        let chain = HookChain::build(
            HookChainConfig::new(HookPoint::RunStart)
                .with_hook(Arc::new(Ok1("a")))
                .with_hook(Arc::new(Fail("b")))
                .with_hook(Arc::new(Ok1("c")))
                .with_error_strategy(ErrorStrategy::StopOnError),
        )
        .unwrap();
        let outcome = chain.run(input()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.executed_count, 2);
        assert_eq!(outcome.success_count, 1);
        assert_eq!(outcome.failed_count, 1);
        assert_eq!(outcome.skipped_count, 0);
        assert!(!outcome.hook_results.iter().any(|r| r.hook_id == "c"));
        assert!(outcome.error.as_deref().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_sequential_continue_on_error() {
        let chain = HookChain::build(
            HookChainConfig::new(HookPoint::RunStart)
                .with_hook(Arc::new(Fail("a")))
                .with_hook(Arc::new(Ok1("b")))
                .with_error_strategy(ErrorStrategy::ContinueOnError),
        )
        .unwrap();
        let outcome = chain.run(input()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.executed_count, 2);
        assert_eq!(outcome.failed_count, 1);
        assert!(outcome.hook_results.iter().any(|r| r.hook_id == "b" && r.success));
    }

    #[tokio::test]
    async fn test_sequential_log_and_continue_records_error() {
        let chain = HookChain::build(
            HookChainConfig::new(HookPoint::RunStart)
                .with_hook(Arc::new(Fail("a")))
                .with_hook(Arc::new(Ok1("b")))
                .with_error_strategy(ErrorStrategy::LogAndContinue),
        )
        .unwrap();
        let outcome = chain.run(input()).await;
        assert_eq!(outcome.executed_count, 2);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_parallel_partial_failure() {
        let chain = HookChain::build(
            HookChainConfig::new(HookPoint::RunStart)
                .with_hook(Arc::new(Ok1("a")))
                .with_hook(Arc::new(Fail("b")))
                .with_hook(Arc::new(Ok1("c")))
                .with_mode(ExecutionMode::Parallel),
        )
        .unwrap();
        let outcome = chain.run(input()).await;
        // Siblings are not cancelled by a failure.
        assert_eq!(outcome.executed_count, 3);
        assert_eq!(outcome.success_count, 2);
        assert_eq!(outcome.failed_count, 1);
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_parallel_wall_clock_is_slowest_not_sum() {
        let delay = Duration::from_millis(80);
        let chain = HookChain::build(
            HookChainConfig::new(HookPoint::RunStart)
                .with_hook(Arc::new(Sleep("a", delay)))
                .with_hook(Arc::new(Sleep("b", delay)))
                .with_hook(Arc::new(Sleep("c", delay)))
                .with_mode(ExecutionMode::Parallel),
        )
        .unwrap();
        let started = Instant::now();
        let outcome = chain.run(input()).await;
        let elapsed = started.elapsed();
        assert!(outcome.success);
        assert!(elapsed < delay * 3, "took {:?}, expected close to {:?}", elapsed, delay);
    }

    #[tokio::test]
    async fn test_pipeline_threads_output_to_input() {
        let chain = HookChain::build(
            HookChainConfig::new(HookPoint::RunStart)
                .with_hook(Arc::new(Increment("a")))
                .with_hook(Arc::new(Increment("b")))
                .with_hook(Arc::new(Increment("c")))
                .with_mode(ExecutionMode::Pipeline),
        )
        .unwrap();
        let outcome = chain.run(input()).await;
        assert!(outcome.success);
        assert_eq!(outcome.final_output, Some(json!(3)));
    }

    #[tokio::test]
    async fn test_pipeline_failure_skips_rest_regardless_of_strategy() {
        let chain = HookChain::build(
            HookChainConfig::new(HookPoint::RunStart)
                .with_hook(Arc::new(Increment("a")))
                .with_hook(Arc::new(Fail("b")))
                .with_hook(Arc::new(Increment("c")))
                .with_mode(ExecutionMode::Pipeline)
                .with_error_strategy(ErrorStrategy::ContinueOnError),
        )
        .unwrap();
        let outcome = chain.run(input()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.executed_count, 2);
        assert_eq!(outcome.skipped_count, 1);
        assert_eq!(outcome.final_output, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_chain_timeout_fails_chain_not_hook() {
        let chain = HookChain::build(
            HookChainConfig::new(HookPoint::RunStart)
                .with_hook(Arc::new(Sleep("slow", Duration::from_secs(5))))
                .with_timeout(Duration::from_millis(50)),
        )
        .unwrap();
        let outcome = chain.run(input()).await;
        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("timed out"));
        assert_eq!(outcome.failed_count, 0);
        assert!(outcome.hook_results.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_chain_is_noop() {
        let chain = HookChain::build(
            HookChainConfig::new(HookPoint::RunStart)
                .with_hook(Arc::new(Ok1("a")))
                .disabled(),
        )
        .unwrap();
        let outcome = chain.run(input()).await;
        assert!(outcome.success);
        assert_eq!(outcome.executed_count, 0);
    }

    #[tokio::test]
    async fn test_retry_counts_attempts() {
        struct FlakyOnce {
            remaining: AtomicU32,
        }

        #[async_trait]
        impl Hook for FlakyOnce {
            fn id(&self) -> &str {
                "flaky"
            }

            async fn run(&self, _input: &HookInput) -> Result<Value, HookError> {
                if self
                    .remaining
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    Err(HookError::Failed("transient".to_string()))
                } else {
                    Ok(json!("recovered"))
                }
            }
        }

        let chain = HookChain::build(
            HookChainConfig::new(HookPoint::RunStart)
                .with_hook(Arc::new(FlakyOnce {
                    remaining: AtomicU32::new(2),
                }))
                .with_max_retries(3),
        )
        .unwrap();
        let outcome = chain.run(input()).await;
        assert!(outcome.success);
        assert_eq!(outcome.hook_results[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_counts_failed() {
        let chain = HookChain::build(
            HookChainConfig::new(HookPoint::RunStart)
                .with_hook(Arc::new(Fail("always")))
                .with_max_retries(2),
        )
        .unwrap();
        let outcome = chain.run(input()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.hook_results[0].attempts, 3);
        assert_eq!(outcome.failed_count, 1);
    }
}
