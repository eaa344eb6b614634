//! Stage executor - runs individual steps through their capability

use crate::{
    action::{ActionError, ActionRegistry, ActionRequest},
    core::{
        secret::{ResolvedSecrets, SecretStore},
        template, RunContext, Stage, Step, StepState,
    },
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info};

/// Runs steps: gate, secrets, rendering, invocation
pub struct StageExecutor {
    registry: ActionRegistry,
    secrets: Arc<dyn SecretStore>,
    dry_run: bool,
}

impl StageExecutor {
    pub fn new(registry: ActionRegistry, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            registry,
            secrets,
            dry_run: false,
        }
    }

    /// Prepare every request but never invoke a capability
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Execute a step and return its terminal state
    pub async fn execute_step(&self, stage: &Stage, step: &Step, context: &RunContext) -> StepState {
        if let Some(reason) = step.skip_reason(context) {
            info!("Skipping step {}/{}: {}", stage.id, step.name, reason);
            return StepState::Skipped { reason };
        }

        let started_at = Utc::now();
        info!("Executing step: {}/{} ({})", stage.id, step.name, step.uses);

        let mut refs = step.secret_refs();
        refs.extend(
            stage
                .env
                .values()
                .flat_map(|value| template::secret_refs(value)),
        );

        let secrets = match ResolvedSecrets::resolve(self.secrets.as_ref(), refs.iter().map(String::as_str)) {
            Ok(secrets) => secrets,
            Err(e) => return failed(e.to_string(), started_at),
        };

        let request = match self.prepare(stage, step, context, secrets.clone()) {
            Ok(request) => request,
            Err(e) => return failed(secrets.mask(&e), started_at),
        };

        if self.dry_run {
            info!("Dry run: would invoke {} for {}/{}", step.uses, stage.id, step.name);
            return StepState::Succeeded {
                output: format!("dry run: {} not invoked", step.uses),
                started_at,
                completed_at: Utc::now(),
            };
        }

        match self.invoke(&request, step.timeout_secs).await {
            Ok(output) => {
                let summary = secrets.mask(&output.summary);
                debug!("Step {}/{} output: {}", stage.id, step.name, secrets.mask(&output.detail));
                info!("Step {}/{} succeeded: {}", stage.id, step.name, summary);
                StepState::Succeeded {
                    output: summary,
                    started_at,
                    completed_at: Utc::now(),
                }
            }
            Err(e) => {
                let message = secrets.mask(&e.to_string());
                error!("Step {}/{} failed: {}", stage.id, step.name, message);
                failed(message, started_at)
            }
        }
    }

    /// Bind secrets, render env and params, and build the request
    fn prepare(
        &self,
        stage: &Stage,
        step: &Step,
        context: &RunContext,
        secrets: ResolvedSecrets,
    ) -> Result<ActionRequest, String> {
        let context = context.with_secrets(secrets.clone());

        let env = stage
            .step_env(step)
            .into_iter()
            .map(|(key, value)| {
                template::render(&value, &context)
                    .map(|rendered| (key.clone(), rendered))
                    .map_err(|e| format!("env '{}': {}", key, e))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let context = context.with_env(env.clone());

        let params = step
            .with
            .iter()
            .map(|(key, param)| {
                param
                    .render(&context)
                    .map(|rendered| (key.clone(), rendered))
                    .map_err(|e| format!("parameter '{}': {}", key, e))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(ActionRequest {
            capability: step.uses.clone(),
            stage_id: stage.id.clone(),
            step_name: step.name.clone(),
            params,
            env,
            secrets,
            timeout: Duration::from_secs(step.timeout_secs),
        })
    }

    async fn invoke(
        &self,
        request: &ActionRequest,
        timeout_secs: u64,
    ) -> Result<crate::action::ActionOutput, ActionError> {
        let action = self
            .registry
            .get(&request.capability)
            .ok_or_else(|| ActionError::UnknownCapability(request.capability.clone()))?;

        match timeout(request.timeout, action.invoke(request)).await {
            Ok(result) => result,
            Err(_) => Err(ActionError::Timeout(timeout_secs)),
        }
    }
}

fn failed(error: String, started_at: chrono::DateTime<Utc>) -> StepState {
    StepState::Failed {
        error,
        started_at,
        failed_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ActionOutput};
    use crate::core::{
        config::PipelineConfig,
        run::{EventKind, PipelineRun},
        secret::StaticSecretStore,
    };
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct Capture {
        requests: Arc<Mutex<Vec<ActionRequest>>>,
    }

    #[async_trait]
    impl Action for Capture {
        async fn invoke(&self, request: &ActionRequest) -> Result<ActionOutput, ActionError> {
            self.requests.lock().await.push(request.clone());
            let token = request.text("token").unwrap_or_default().to_string();
            Ok(ActionOutput::new(format!("sent {}", token)))
        }
    }

    struct Slow;

    #[async_trait]
    impl Action for Slow {
        async fn invoke(&self, _request: &ActionRequest) -> Result<ActionOutput, ActionError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ActionOutput::new("late"))
        }
    }

    const YAML: &str = r#"
name: "Test Pipeline"
variables:
  image: "acme/app"
stages:
  - id: "build"
    env:
      REGION: "eu"
    steps:
      - name: "notify"
        uses: "capture"
        with:
          tag: "{{ vars.image }}:{{ run.sha }}"
          token: "{{ secrets.TOKEN }}"
          region: "{{ env.REGION }}"
          push: "{{ run.event != 'pull_request' }}"
      - name: "gated"
        uses: "capture"
        if: "run.event == 'push'"
      - name: "slow"
        uses: "slow"
        timeout_secs: 1
"#;

    fn setup(store: StaticSecretStore) -> (StageExecutor, Capture, crate::core::Pipeline) {
        let capture = Capture::default();
        let registry = ActionRegistry::new()
            .register("capture", capture.clone())
            .register("slow", Slow);
        let executor = StageExecutor::new(registry, Arc::new(store));
        let pipeline = PipelineConfig::from_yaml(YAML).unwrap().to_pipeline().unwrap();
        (executor, capture, pipeline)
    }

    #[tokio::test]
    async fn test_renders_request_and_masks_output() {
        let (executor, capture, pipeline) = setup(StaticSecretStore::new().with("TOKEN", "t0k3n"));
        let run = PipelineRun::new(EventKind::PullRequest, "feature", "abc123");
        let ctx = pipeline.create_context(&run);
        let stage = pipeline.stage("build").unwrap();

        let state = executor.execute_step(stage, &stage.steps[0], &ctx).await;
        match state {
            StepState::Succeeded { output, .. } => assert_eq!(output, "sent ***"),
            other => panic!("unexpected state: {:?}", other),
        }

        let requests = capture.requests.lock().await;
        let request = &requests[0];
        assert_eq!(request.text("tag"), Some("acme/app:abc123"));
        assert_eq!(request.text("token"), Some("t0k3n"));
        assert_eq!(request.text("region"), Some("eu"));
        assert_eq!(request.text("push"), Some("false"));
        assert_eq!(request.env.get("REGION").map(String::as_str), Some("eu"));
    }

    #[tokio::test]
    async fn test_missing_secret_fails_step() {
        let (executor, capture, pipeline) = setup(StaticSecretStore::new());
        let run = PipelineRun::new(EventKind::Push, "main", "abc123");
        let ctx = pipeline.create_context(&run);
        let stage = pipeline.stage("build").unwrap();

        let state = executor.execute_step(stage, &stage.steps[0], &ctx).await;
        match state {
            StepState::Failed { error, .. } => assert_eq!(error, "Secret 'TOKEN' is not defined"),
            other => panic!("unexpected state: {:?}", other),
        }
        assert!(capture.requests.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_secret_inside_expression_is_resolved() {
        let yaml = r#"
name: "Test Pipeline"
stages:
  - id: "lint"
    steps:
      - name: "check"
        uses: "capture"
        with:
          strict: "{{ secrets.LINT_MODE == 'strict' }}"
"#;
        let capture = Capture::default();
        let registry = ActionRegistry::new().register("capture", capture.clone());
        let store = StaticSecretStore::new().with("LINT_MODE", "strict");
        let executor = StageExecutor::new(registry, Arc::new(store));
        let pipeline = PipelineConfig::from_yaml(yaml).unwrap().to_pipeline().unwrap();

        let run = PipelineRun::new(EventKind::Push, "main", "abc123");
        let ctx = pipeline.create_context(&run);
        let stage = pipeline.stage("lint").unwrap();

        let state = executor.execute_step(stage, &stage.steps[0], &ctx).await;
        assert!(matches!(state, StepState::Succeeded { .. }), "{:?}", state);
        assert_eq!(capture.requests.lock().await[0].text("strict"), Some("true"));
    }

    #[tokio::test]
    async fn test_gate_skips_step() {
        let (executor, capture, pipeline) = setup(StaticSecretStore::new());
        let run = PipelineRun::new(EventKind::PullRequest, "feature", "abc123");
        let ctx = pipeline.create_context(&run);
        let stage = pipeline.stage("build").unwrap();

        let state = executor.execute_step(stage, &stage.steps[1], &ctx).await;
        assert!(matches!(state, StepState::Skipped { .. }));
        assert!(capture.requests.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_fails_step() {
        let (executor, _capture, pipeline) = setup(StaticSecretStore::new());
        let run = PipelineRun::new(EventKind::Push, "main", "abc123");
        let ctx = pipeline.create_context(&run);
        let stage = pipeline.stage("build").unwrap();

        let state = executor.execute_step(stage, &stage.steps[2], &ctx).await;
        match state {
            StepState::Failed { error, .. } => assert_eq!(error, "Timeout after 1 seconds"),
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dry_run_never_invokes() {
        let (executor, capture, pipeline) = setup(StaticSecretStore::new().with("TOKEN", "t"));
        let executor = executor.with_dry_run(true);
        let run = PipelineRun::new(EventKind::Push, "main", "abc123");
        let ctx = pipeline.create_context(&run);
        let stage = pipeline.stage("build").unwrap();

        let state = executor.execute_step(stage, &stage.steps[0], &ctx).await;
        assert!(matches!(state, StepState::Succeeded { .. }));
        assert!(capture.requests.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_capability_fails_step() {
        let (_, _, pipeline) = setup(StaticSecretStore::new());
        let executor = StageExecutor::new(ActionRegistry::new(), Arc::new(StaticSecretStore::new()));
        let run = PipelineRun::new(EventKind::Push, "main", "abc123");
        let ctx = pipeline.create_context(&run);
        let stage = pipeline.stage("build").unwrap();

        let state = executor.execute_step(stage, &stage.steps[1], &ctx).await;
        match state {
            StepState::Failed { error, .. } => {
                assert_eq!(error, "No capability registered for 'capture'")
            }
            other => panic!("unexpected state: {:?}", other),
        }
    }
}
