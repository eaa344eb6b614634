//! Test utility functions for shipline scenarios

use async_trait::async_trait;
use shipline::action::{
    Action, ActionConfig, ActionError, ActionOutput, ActionRegistry, ActionRequest, CommandOutput,
    CommandRunner, CommandSpec,
};
use shipline::core::{
    config::PipelineConfig, secret::StaticSecretStore, ExecutionStatus, Pipeline, PipelineRun,
    StageResult, StepState,
};
use shipline::execution::{ExecutionEngine, ExecutionError, ExecutionEvent};
use std::sync::{Arc, Mutex};

/// Release pipeline used by the end-to-end scenarios
pub const RELEASE_YAML: &str = include_str!("../../demos/docker-release.yml");

/// Command runner that records every command and fails on request
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<CommandSpec>>,
    fail_on: Option<String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any command whose command line contains `needle`
    pub fn failing_on(needle: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on: Some(needle.to_string()),
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded commands whose first argument is `subcommand` (e.g. "login", "buildx")
    pub fn commands(&self, subcommand: &str) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|spec| spec.args.first().map(String::as_str) == Some(subcommand))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ActionError> {
        self.calls.lock().unwrap().push(spec.clone());

        if let Some(needle) = &self.fail_on {
            if spec.command_line().contains(needle.as_str()) {
                return Err(ActionError::Command {
                    program: spec.program.clone(),
                    code: 1,
                    stderr: format!("simulated failure in {}", needle),
                });
            }
        }

        Ok(CommandOutput {
            stdout: format!("ran {}", spec.command_line()),
            stderr: String::new(),
        })
    }
}

/// Capability that records requests and returns a canned result
#[derive(Clone)]
pub struct RecordingAction {
    requests: Arc<Mutex<Vec<ActionRequest>>>,
    fail_with: Option<String>,
}

impl RecordingAction {
    pub fn succeeding() -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            fail_with: None,
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            fail_with: Some(error.to_string()),
        }
    }

    pub fn requests(&self) -> Vec<ActionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Action for RecordingAction {
    async fn invoke(&self, request: &ActionRequest) -> Result<ActionOutput, ActionError> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.fail_with {
            Some(error) => Err(ActionError::Internal(error.clone())),
            None => Ok(ActionOutput::new(format!(
                "{} done with {}",
                request.step_name,
                request.text("message").unwrap_or("no message")
            ))),
        }
    }
}

/// Built-in capabilities with commands going to `runner`
pub fn builtin_registry(runner: Arc<RecordingRunner>) -> ActionRegistry {
    ActionRegistry::with_runner(&ActionConfig::new().with_http_timeout(5), runner)
        .unwrap_or_else(|e| panic!("Failed to build registry: {}", e))
}

/// Secrets for the release pipeline, with the webhook pointed at `webhook_url`
pub fn release_secrets(webhook_url: &str) -> StaticSecretStore {
    StaticSecretStore::new()
        .with("REGISTRY_USERNAME", "release-bot")
        .with("REGISTRY_PASSWORD", "hunter2-registry")
        .with("DEPLOY_WEBHOOK_URL", webhook_url)
        .with("DEPLOY_WEBHOOK_SECRET", "shared-s3cr3t")
}

/// Parse a pipeline from YAML string
pub fn pipeline_from_yaml(yaml: &str) -> Pipeline {
    PipelineConfig::from_yaml(yaml)
        .and_then(|config| config.to_pipeline())
        .unwrap_or_else(|e| panic!("Failed to parse pipeline YAML: {:#}", e))
}

/// Result of running a pipeline in a test
#[derive(Debug, Clone)]
pub struct RunResult {
    pub pipeline: Pipeline,
    pub status: ExecutionStatus,
    pub events: Vec<ExecutionEvent>,
}

impl RunResult {
    pub fn stage_result(&self, stage_id: &str) -> StageResult {
        self.pipeline
            .stage(stage_id)
            .unwrap_or_else(|| panic!("Stage '{}' not found", stage_id))
            .state
            .result()
    }

    pub fn step_state(&self, stage_id: &str, step: &str) -> &StepState {
        let stage = self
            .pipeline
            .stage(stage_id)
            .unwrap_or_else(|| panic!("Stage '{}' not found", stage_id));
        &stage
            .steps
            .iter()
            .find(|s| s.name == step)
            .unwrap_or_else(|| panic!("Step '{}' not found in stage '{}'", step, stage_id))
            .state
    }

    /// Stage ids in the order they started
    pub fn started_stages(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::StageStarted { stage_id } => Some(stage_id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every event rendered with Debug, for leak checks
    pub fn event_log(&self) -> String {
        self.events
            .iter()
            .map(|e| format!("{:?}", e))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Run a pipeline with the given capabilities and secrets
pub async fn run_pipeline(
    pipeline: &mut Pipeline,
    run: &PipelineRun,
    registry: ActionRegistry,
    secrets: StaticSecretStore,
) -> Result<RunResult, ExecutionError> {
    let engine = ExecutionEngine::new(registry, Arc::new(secrets));

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    engine
        .add_event_handler(move |event| sink.lock().unwrap().push(event))
        .await;

    let status = engine.execute(pipeline, run).await?;
    let events = events.lock().unwrap().clone();

    Ok(RunResult {
        pipeline: pipeline.clone(),
        status,
        events,
    })
}

/// Assert a step succeeded and its output contains `expected`
pub fn assert_step_succeeded(result: &RunResult, stage_id: &str, step: &str, expected: &str) {
    match result.step_state(stage_id, step) {
        StepState::Succeeded { output, .. } => assert!(
            output.contains(expected),
            "Step '{}/{}' output:\n{}\n\ndoes not contain:\n{}",
            stage_id,
            step,
            output,
            expected
        ),
        other => panic!("Step '{}/{}' should have succeeded, but was: {:?}", stage_id, step, other),
    }
}

/// Assert a step failed and its error contains `expected`
pub fn assert_step_failed(result: &RunResult, stage_id: &str, step: &str, expected: &str) {
    match result.step_state(stage_id, step) {
        StepState::Failed { error, .. } => assert!(
            error.contains(expected),
            "Step '{}/{}' error:\n{}\n\ndoes not contain:\n{}",
            stage_id,
            step,
            error,
            expected
        ),
        other => panic!("Step '{}/{}' should have failed, but was: {:?}", stage_id, step, other),
    }
}

/// Assert a step was skipped
pub fn assert_step_skipped(result: &RunResult, stage_id: &str, step: &str) {
    let state = result.step_state(stage_id, step);
    assert!(
        matches!(state, StepState::Skipped { .. }),
        "Step '{}/{}' should have been skipped, but was: {:?}",
        stage_id,
        step,
        state
    );
}
