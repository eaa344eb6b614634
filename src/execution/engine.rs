//! Main execution engine - orchestrates the entire pipeline run

use crate::{
    action::ActionRegistry,
    core::{
        secret::SecretStore, EventKind, ExecutionStatus, Pipeline, PipelineRun, StageState,
        StepState,
    },
    execution::{Schedule, StageExecutor, StageScheduler},
};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunTriggered {
        run_id: Uuid,
        pipeline_name: String,
        event: EventKind,
        branch: String,
        total_stages: usize,
    },
    RunNotTriggered {
        run_id: Uuid,
        pipeline_name: String,
        event: EventKind,
        branch: String,
    },
    StageStarted {
        stage_id: String,
    },
    StageSkipped {
        stage_id: String,
        reason: String,
    },
    StageSucceeded {
        stage_id: String,
    },
    StageFailed {
        stage_id: String,
        step: String,
        error: String,
    },
    StepStarted {
        stage_id: String,
        step: String,
        uses: String,
    },
    StepSucceeded {
        stage_id: String,
        step: String,
        output: String,
    },
    StepFailed {
        stage_id: String,
        step: String,
        error: String,
    },
    StepSkipped {
        stage_id: String,
        step: String,
        reason: String,
    },
    RunCompleted {
        run_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Errors that stop a run before or outside step execution
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Stage '{stage}' step '{step}' uses unknown capability '{capability}'")]
    UnknownCapability {
        stage: String,
        step: String,
        capability: String,
    },

    #[error("Stage '{0}' not found")]
    StageNotFound(String),
}

/// Main pipeline execution engine
pub struct ExecutionEngine {
    scheduler: StageScheduler,
    executor: StageExecutor,
    event_handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl ExecutionEngine {
    pub fn new(registry: ActionRegistry, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            scheduler: StageScheduler::new(),
            executor: StageExecutor::new(registry, secrets),
            event_handlers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Evaluate triggers and gates and prepare requests, but invoke nothing
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.executor = self.executor.with_dry_run(dry_run);
        self
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.lock().await.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    async fn emit_event(&self, event: ExecutionEvent) {
        let handlers = self.event_handlers.lock().await;
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    /// Check that every step names a registered capability
    pub fn preflight(&self, pipeline: &Pipeline) -> Result<(), ExecutionError> {
        let registry = self.executor.registry();
        for stage in pipeline.ordered_stages() {
            for step in &stage.steps {
                if !registry.contains(&step.uses) {
                    return Err(ExecutionError::UnknownCapability {
                        stage: stage.id.clone(),
                        step: step.name.clone(),
                        capability: step.uses.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Execute the entire pipeline for one run
    pub async fn execute(
        &self,
        pipeline: &mut Pipeline,
        run: &PipelineRun,
    ) -> Result<ExecutionStatus, ExecutionError> {
        self.preflight(pipeline)?;

        let run_id = run.id();
        let pipeline_name = pipeline.name.clone();

        if !pipeline.trigger.evaluate(run) {
            info!(
                "Pipeline {} not triggered by {} on {}",
                pipeline_name,
                run.event(),
                run.branch()
            );
            let reason = format!("trigger does not match {} on `{}`", run.event(), run.branch());
            for stage in pipeline.stages.values_mut() {
                stage.state = StageState::Skipped {
                    reason: reason.clone(),
                };
                for step in &mut stage.steps {
                    step.state = StepState::Skipped {
                        reason: "stage skipped".to_string(),
                    };
                }
            }
            pipeline.update_state_counts();
            pipeline.state.skip();

            self.emit_event(ExecutionEvent::RunNotTriggered {
                run_id,
                pipeline_name,
                event: run.event(),
                branch: run.branch().to_string(),
            })
            .await;
            self.emit_event(ExecutionEvent::RunCompleted {
                run_id,
                status: ExecutionStatus::Skipped,
            })
            .await;
            return Ok(ExecutionStatus::Skipped);
        }

        info!("Starting pipeline execution: {} ({})", pipeline_name, run_id);
        pipeline.state.start(pipeline.stages.len());
        self.emit_event(ExecutionEvent::RunTriggered {
            run_id,
            pipeline_name: pipeline_name.clone(),
            event: run.event(),
            branch: run.branch().to_string(),
            total_stages: pipeline.stages.len(),
        })
        .await;

        // Main execution loop
        loop {
            match self.scheduler.next(pipeline) {
                Schedule::Done => break,
                Schedule::Skip { stage_id, reason } => {
                    warn!("Skipping stage {}: {}", stage_id, reason);
                    self.mark_stage_skipped(pipeline, &stage_id, reason).await?;
                }
                Schedule::Run(stage_id) => {
                    self.execute_stage(pipeline, run, &stage_id).await?;
                }
            }
            pipeline.update_state_counts();
        }

        let status = if pipeline.has_failed() {
            pipeline.state.fail();
            ExecutionStatus::Failed
        } else {
            pipeline.state.complete();
            ExecutionStatus::Completed
        };

        info!("Pipeline execution finished: {} - {:?}", pipeline_name, status);
        self.emit_event(ExecutionEvent::RunCompleted { run_id, status }).await;

        Ok(status)
    }

    /// Execute a single stage: gate, then steps in order, fail-fast
    async fn execute_stage(
        &self,
        pipeline: &mut Pipeline,
        run: &PipelineRun,
        stage_id: &str,
    ) -> Result<(), ExecutionError> {
        let stage = pipeline
            .stage(stage_id)
            .cloned()
            .ok_or_else(|| ExecutionError::StageNotFound(stage_id.to_string()))?;

        let context = pipeline.create_context(run);

        if let Some(reason) = stage.skip_reason(&context) {
            info!("Skipping stage {}: {}", stage_id, reason);
            return self.mark_stage_skipped(pipeline, stage_id, reason).await;
        }

        let started_at = Utc::now();
        self.set_stage_state(pipeline, stage_id, StageState::Running { started_at })?;
        self.emit_event(ExecutionEvent::StageStarted {
            stage_id: stage_id.to_string(),
        })
        .await;

        let mut failure: Option<(String, String)> = None;

        for (index, step) in stage.steps.iter().enumerate() {
            let state = match &failure {
                Some((failed_step, _)) => StepState::Skipped {
                    reason: format!("step `{}` failed", failed_step),
                },
                None => {
                    if step.skip_reason(&context).is_none() {
                        self.emit_event(ExecutionEvent::StepStarted {
                            stage_id: stage_id.to_string(),
                            step: step.name.clone(),
                            uses: step.uses.clone(),
                        })
                        .await;
                    }
                    self.executor.execute_step(&stage, step, &context).await
                }
            };

            let event = match &state {
                StepState::Succeeded { output, .. } => ExecutionEvent::StepSucceeded {
                    stage_id: stage_id.to_string(),
                    step: step.name.clone(),
                    output: output.clone(),
                },
                StepState::Failed { error, .. } => {
                    failure = Some((step.name.clone(), error.clone()));
                    ExecutionEvent::StepFailed {
                        stage_id: stage_id.to_string(),
                        step: step.name.clone(),
                        error: error.clone(),
                    }
                }
                StepState::Skipped { reason } => ExecutionEvent::StepSkipped {
                    stage_id: stage_id.to_string(),
                    step: step.name.clone(),
                    reason: reason.clone(),
                },
                StepState::Pending => continue,
            };

            if let Some(target) = pipeline
                .stage_mut(stage_id)
                .and_then(|s| s.steps.get_mut(index))
            {
                target.state = state;
            }
            self.emit_event(event).await;
        }

        let (state, event) = match failure {
            Some((failed_step, error)) => {
                error!("Stage {} failed at step {}: {}", stage_id, failed_step, error);
                (
                    StageState::Failed {
                        error: error.clone(),
                        failed_step: failed_step.clone(),
                        started_at,
                        failed_at: Utc::now(),
                    },
                    ExecutionEvent::StageFailed {
                        stage_id: stage_id.to_string(),
                        step: failed_step,
                        error,
                    },
                )
            }
            None => {
                info!("Stage {} succeeded", stage_id);
                (
                    StageState::Succeeded {
                        started_at,
                        completed_at: Utc::now(),
                    },
                    ExecutionEvent::StageSucceeded {
                        stage_id: stage_id.to_string(),
                    },
                )
            }
        };

        self.set_stage_state(pipeline, stage_id, state)?;
        self.emit_event(event).await;
        Ok(())
    }

    /// Mark a stage and all of its steps as skipped
    async fn mark_stage_skipped(
        &self,
        pipeline: &mut Pipeline,
        stage_id: &str,
        reason: String,
    ) -> Result<(), ExecutionError> {
        let stage = pipeline
            .stage_mut(stage_id)
            .ok_or_else(|| ExecutionError::StageNotFound(stage_id.to_string()))?;

        for step in stage.steps.iter_mut() {
            step.state = StepState::Skipped {
                reason: "stage skipped".to_string(),
            };
        }
        stage.state = StageState::Skipped {
            reason: reason.clone(),
        };

        self.emit_event(ExecutionEvent::StageSkipped {
            stage_id: stage_id.to_string(),
            reason,
        })
        .await;
        Ok(())
    }

    fn set_stage_state(
        &self,
        pipeline: &mut Pipeline,
        stage_id: &str,
        state: StageState,
    ) -> Result<(), ExecutionError> {
        let stage = pipeline
            .stage_mut(stage_id)
            .ok_or_else(|| ExecutionError::StageNotFound(stage_id.to_string()))?;
        stage.state = state;
        Ok(())
    }
}
