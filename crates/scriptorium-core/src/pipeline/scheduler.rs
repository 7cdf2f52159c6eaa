//! Pipeline scheduler: the outer control loop of a run.
//!
//! ```text
//!            ┌─────────────────────────────── cancelled? ──► Aborted
//!            ▼
//!   cursor ─► condition ── false ──► cursor + 1
//!            │ true
//!            ▼
//!   retry loop with budget left? ── yes ──► cursor = from_step
//!            │ no
//!            ▼
//!   build messages ─► execute ── error ──► Failed
//!            │ ok
//!            ▼
//!   append result, cursor + 1 ── cursor == len ──► Completed
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{ModelError, PipelineError};
use crate::model_client::ModelClient;
use crate::models::{PipelineInput, PipelineRunResult, RunStatus, StepMetadata, StepResult};
use crate::pipeline::context::build_messages;
use crate::pipeline::executor::StepExecutor;
use crate::pipeline::step::{validate_steps, PipelineStep};
use crate::presets::{resolve_pipeline, PresetStore};

pub type StepStartFn = Box<dyn Fn(&PipelineStep, usize) + Send + Sync>;
pub type StepCompleteFn = Box<dyn Fn(&StepResult, usize) + Send + Sync>;
pub type TokenFn = Box<dyn Fn(&str) + Send + Sync>;
pub type StepErrorFn = Box<dyn Fn(&ModelError, usize) + Send + Sync>;

/// Observers of a run. All optional, all called synchronously from the run.
#[derive(Default)]
pub struct PipelineCallbacks {
    pub on_step_start: Option<StepStartFn>,
    pub on_step_complete: Option<StepCompleteFn>,
    pub on_token: Option<TokenFn>,
    pub on_error: Option<StepErrorFn>,
}

impl PipelineCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_step_start(mut self, f: impl Fn(&PipelineStep, usize) + Send + Sync + 'static) -> Self {
        self.on_step_start = Some(Box::new(f));
        self
    }

    pub fn on_step_complete(mut self, f: impl Fn(&StepResult, usize) + Send + Sync + 'static) -> Self {
        self.on_step_complete = Some(Box::new(f));
        self
    }

    pub fn on_token(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_token = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&ModelError, usize) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Reject unrecognized or unusable conditions before the run starts.
    pub strict_conditions: bool,
    /// Character budget for limited previous text when the agent sets none.
    pub default_previous_text_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            strict_conditions: false,
            default_previous_text_limit: 3000,
        }
    }
}

/// Drives pipeline runs against a model client and a preset store.
pub struct PipelineOrchestrator {
    executor: StepExecutor,
    presets: Arc<dyn PresetStore>,
    config: OrchestratorConfig,
    cancel: Mutex<CancellationToken>,
}

impl PipelineOrchestrator {
    pub fn new(
        client: Arc<dyn ModelClient>,
        presets: Arc<dyn PresetStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            executor: StepExecutor::new(client),
            presets,
            config,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Cancel the run in flight, or the next run if none is. Idempotent.
    pub fn cancel(&self) {
        let token = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        if !token.is_cancelled() {
            tracing::info!("[Pipeline] Cancellation requested");
        }
        token.cancel();
    }

    fn current_token(&self) -> CancellationToken {
        self.cancel.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn reset_if_cancelled(&self) {
        let mut token = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
    }

    /// Resolve a pipeline preset by id and run it.
    pub async fn run_pipeline_preset(
        &self,
        preset_id: &str,
        input: &PipelineInput,
        callbacks: &PipelineCallbacks,
    ) -> Result<PipelineRunResult, PipelineError> {
        let steps = resolve_pipeline(self.presets.as_ref(), preset_id).await?;
        Ok(self.run_pipeline(&steps, input, callbacks).await)
    }

    /// Run `steps` to completion, failure or cancellation.
    pub async fn run_pipeline(
        &self,
        steps: &[PipelineStep],
        input: &PipelineInput,
        callbacks: &PipelineCallbacks,
    ) -> PipelineRunResult {
        let run_id = Uuid::new_v4();
        let token = self.current_token();
        let span = tracing::info_span!("pipeline_run", %run_id);

        let result = self
            .drive(run_id, steps, input, callbacks, &token)
            .instrument(span)
            .await;

        self.reset_if_cancelled();
        result
    }

    async fn drive(
        &self,
        run_id: Uuid,
        steps: &[PipelineStep],
        input: &PipelineInput,
        callbacks: &PipelineCallbacks,
        token: &CancellationToken,
    ) -> PipelineRunResult {
        let clock = Instant::now();

        match validate_steps(steps, &self.config) {
            Ok(warnings) => {
                for warning in warnings {
                    tracing::warn!("[Pipeline] {}", warning);
                }
            }
            Err(e) => {
                tracing::error!("[Pipeline] Refusing to run: {}", e);
                return PipelineRunResult::new(
                    run_id,
                    Vec::new(),
                    clock.elapsed(),
                    RunStatus::Failed,
                    Some(e.to_string()),
                );
            }
        }

        tracing::info!("[Pipeline] Starting run with {} steps", steps.len());

        let mut results: Vec<StepResult> = Vec::new();
        // backward jumps taken per step index
        let mut jumps: HashMap<usize, u32> = HashMap::new();
        // executions per step index
        let mut executions: HashMap<usize, u32> = HashMap::new();
        let mut cursor = 0;

        while cursor < steps.len() {
            if token.is_cancelled() {
                tracing::info!("[Pipeline] Aborted before step {}", cursor);
                return PipelineRunResult::new(run_id, results, clock.elapsed(), RunStatus::Aborted, None);
            }

            let step = &steps[cursor];

            if let Some(condition) = &step.condition {
                if !condition.evaluate(input, &results, step) {
                    tracing::debug!(
                        "[Pipeline] Skipping step {} ({}): condition '{}' not met",
                        cursor,
                        step.agent.name,
                        condition
                    );
                    cursor += 1;
                    continue;
                }
            }

            if let Some(retry) = step.retry {
                let taken = jumps.entry(cursor).or_insert(0);
                if *taken < retry.max_iterations {
                    *taken += 1;
                    tracing::info!(
                        "[Pipeline] Step {} ({}) loops back to step {} ({}/{})",
                        cursor,
                        step.agent.name,
                        retry.from_step,
                        taken,
                        retry.max_iterations
                    );
                    cursor = retry.from_step;
                    continue;
                }
                tracing::warn!(
                    "[Pipeline] Step {} ({}) exhausted its {} retries while its condition still holds; continuing",
                    cursor,
                    step.agent.name,
                    retry.max_iterations
                );
            }

            if let Some(on_step_start) = &callbacks.on_step_start {
                on_step_start(step, cursor);
            }

            let iteration = {
                let count = executions.entry(cursor).or_insert(0);
                *count += 1;
                *count
            };
            let messages = build_messages(
                &step.agent,
                input,
                &results,
                step.is_revision,
                step,
                &self.config,
            );
            let on_token = if step.stream_output {
                callbacks.on_token.as_deref()
            } else {
                None
            };

            tracing::info!(
                "[Pipeline] Running step {} ({}, {})",
                cursor,
                step.agent.name,
                step.agent.role
            );
            let started_at = Utc::now();
            let step_clock = Instant::now();

            match self
                .executor
                .execute(step, messages.clone(), iteration, on_token, token)
                .await
            {
                Ok(result) => {
                    if let Some(on_step_complete) = &callbacks.on_step_complete {
                        on_step_complete(&result, cursor);
                    }
                    results.push(result);
                    cursor += 1;
                }
                Err(e) if e.is_cancelled() => {
                    tracing::info!("[Pipeline] Aborted during step {} ({})", cursor, step.agent.name);
                    return PipelineRunResult::new(run_id, results, clock.elapsed(), RunStatus::Aborted, None);
                }
                Err(e) => {
                    tracing::error!("[Pipeline] Step {} ({}) failed: {}", cursor, step.agent.name, e);
                    if let Some(on_error) = &callbacks.on_error {
                        on_error(&e, cursor);
                    }
                    let message = e.to_string();
                    results.push(StepResult::new(
                        step.agent.role,
                        step.agent.name.clone(),
                        "",
                        messages,
                        started_at,
                        step_clock.elapsed(),
                        StepMetadata {
                            is_revision: step.is_revision,
                            iteration: Some(iteration),
                            error: Some(message.clone()),
                        },
                    ));
                    return PipelineRunResult::new(
                        run_id,
                        results,
                        clock.elapsed(),
                        RunStatus::Failed,
                        Some(message),
                    );
                }
            }
        }

        tracing::info!(
            "[Pipeline] Completed {} step executions in {}ms",
            results.len(),
            clock.elapsed().as_millis()
        );
        PipelineRunResult::new(run_id, results, clock.elapsed(), RunStatus::Completed, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_client::ScriptedModelClient;
    use crate::models::{AgentDefinition, AgentRole, ModelRef};
    use crate::presets::PresetCatalog;

    fn step(role: AgentRole) -> PipelineStep {
        PipelineStep::new(AgentDefinition::new(
            role.as_str(),
            role.as_str(),
            role,
            "sys",
            ModelRef::new("m", "local"),
        ))
    }

    fn orchestrator(client: ScriptedModelClient, config: OrchestratorConfig) -> PipelineOrchestrator {
        PipelineOrchestrator::new(Arc::new(client), Arc::new(PresetCatalog::new()), config)
    }

    #[tokio::test]
    async fn test_false_condition_skips_without_result() {
        let orch = orchestrator(ScriptedModelClient::with_texts(["draft"]), OrchestratorConfig::default());
        let steps = vec![
            step(AgentRole::Summarizer).with_condition("wordCount > 3000"),
            step(AgentRole::ProseWriter),
        ];
        let result = orch
            .run_pipeline(&steps, &PipelineInput::new("beat"), &PipelineCallbacks::new())
            .await;
        assert!(result.is_completed());
        assert_eq!(result.steps.len(), 1);
        assert_eq!(result.steps[0].role, AgentRole::ProseWriter);
    }

    #[tokio::test]
    async fn test_invalid_steps_fail_before_any_call() {
        let client = Arc::new(ScriptedModelClient::with_texts(["unused"]));
        let orch = PipelineOrchestrator::new(
            client.clone(),
            Arc::new(PresetCatalog::new()),
            OrchestratorConfig::default(),
        );
        let steps = vec![step(AgentRole::ProseWriter).retry_from(0, 1)];
        let result = orch
            .run_pipeline(&steps, &PipelineInput::default(), &PipelineCallbacks::new())
            .await;
        assert_eq!(result.status, RunStatus::Failed);
        assert!(result.steps.is_empty());
        assert!(result.error.unwrap().contains("retry_from_step"));
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_strict_conditions_reject_typos() {
        let strict = OrchestratorConfig {
            strict_conditions: true,
            ..Default::default()
        };
        let orch = orchestrator(ScriptedModelClient::with_texts(["x"]), strict);
        let steps = vec![step(AgentRole::ProseWriter).with_condition("hasPrevousOutput")];
        let result = orch
            .run_pipeline(&steps, &PipelineInput::default(), &PipelineCallbacks::new())
            .await;
        assert_eq!(result.status, RunStatus::Failed);

        let lenient = orchestrator(ScriptedModelClient::with_texts(["x"]), OrchestratorConfig::default());
        let result = lenient
            .run_pipeline(&steps, &PipelineInput::default(), &PipelineCallbacks::new())
            .await;
        assert!(result.is_completed());
        assert_eq!(result.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_and_resets_after_run() {
        let orch = orchestrator(ScriptedModelClient::with_texts(["second run"]), OrchestratorConfig::default());
        orch.cancel();
        orch.cancel();
        let steps = vec![step(AgentRole::ProseWriter)];

        let aborted = orch
            .run_pipeline(&steps, &PipelineInput::default(), &PipelineCallbacks::new())
            .await;
        assert_eq!(aborted.status, RunStatus::Aborted);
        assert!(aborted.steps.is_empty());

        let completed = orch
            .run_pipeline(&steps, &PipelineInput::default(), &PipelineCallbacks::new())
            .await;
        assert!(completed.is_completed());
        assert_eq!(completed.primary_output, "second run");
    }

    #[tokio::test]
    async fn test_iteration_metadata_counts_executions() {
        let orch = orchestrator(
            ScriptedModelClient::with_texts(["d1", "j1", "d2", "j2"]),
            OrchestratorConfig::default(),
        );
        let steps = vec![
            step(AgentRole::ProseWriter),
            step(AgentRole::LoreJudge),
            step(AgentRole::Custom).retry_from(0, 1),
        ];
        let result = orch
            .run_pipeline(&steps, &PipelineInput::default(), &PipelineCallbacks::new())
            .await;
        // the custom step ran once after the single jump, but had no reply left
        assert_eq!(result.status, RunStatus::Failed);
        let iterations: Vec<_> = result
            .steps
            .iter()
            .map(|s| s.metadata.as_ref().and_then(|m| m.iteration))
            .collect();
        assert_eq!(iterations, vec![Some(1), Some(1), Some(2), Some(2), Some(1)]);
        assert_eq!(result.primary_output, "d2");
    }
}
