//! Dry planning - which stages and steps a run would execute

use crate::core::{Pipeline, PipelineRun, StageResult};
use serde::Serialize;

/// Decision for one step
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StepPlan {
    pub name: String,
    pub uses: String,
    pub runs: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Decision for one stage
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StagePlan {
    pub id: String,
    pub name: String,
    pub runs: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub steps: Vec<StepPlan>,
}

/// What a run would do, computed without invoking any capability
#[derive(Debug, Clone, Serialize)]
pub struct RunPlan {
    pub pipeline: String,
    pub event: String,
    pub git_ref: String,
    pub branch: String,
    pub triggered: bool,
    pub stages: Vec<StagePlan>,
}

impl RunPlan {
    pub fn stage(&self, id: &str) -> Option<&StagePlan> {
        self.stages.iter().find(|s| s.id == id)
    }

    /// Whether the named step of the named stage would run
    pub fn step_runs(&self, stage_id: &str, step: &str) -> bool {
        self.stage(stage_id)
            .filter(|s| s.runs)
            .and_then(|s| s.steps.iter().find(|p| p.name == step))
            .is_some_and(|p| p.runs)
    }
}

/// Plan a run. Stages that would run are assumed to succeed.
pub fn plan(pipeline: &Pipeline, run: &PipelineRun) -> RunPlan {
    let triggered = pipeline.trigger.evaluate(run);
    let mut context = pipeline.create_context(run);
    let mut stages = Vec::new();

    for stage in pipeline.ordered_stages() {
        let reason = if !triggered {
            Some(format!("trigger does not match {} on `{}`", run.event(), run.branch()))
        } else if let Some((dep, result)) = stage.unmet_dependency(&context.stage_results) {
            Some(format!("needs `{}` which {}", dep, result))
        } else {
            stage.skip_reason(&context)
        };

        let runs = reason.is_none();
        let steps = stage
            .steps
            .iter()
            .map(|step| {
                let reason = if runs {
                    step.skip_reason(&context)
                } else {
                    Some("stage skipped".to_string())
                };
                StepPlan {
                    name: step.name.clone(),
                    uses: step.uses.clone(),
                    runs: reason.is_none(),
                    reason,
                }
            })
            .collect();

        let result = if runs {
            StageResult::Succeeded
        } else {
            StageResult::Skipped
        };
        context.set_stage_result(&stage.id, result);

        stages.push(StagePlan {
            id: stage.id.clone(),
            name: stage.name.clone(),
            runs,
            reason,
            steps,
        });
    }

    RunPlan {
        pipeline: pipeline.name.clone(),
        event: run.event().to_string(),
        git_ref: run.git_ref().to_string(),
        branch: run.branch().to_string(),
        triggered,
        stages,
    }
}
