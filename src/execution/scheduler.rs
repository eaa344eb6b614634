//! Stage scheduler - determines which stage to run next

use crate::core::{Pipeline, StageState};

/// What the engine should do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Run this stage
    Run(String),
    /// Skip this stage; a dependency did not succeed
    Skip { stage_id: String, reason: String },
    /// Every stage is terminal
    Done,
}

/// Walks stages in topological order, one at a time
#[derive(Debug, Clone, Copy, Default)]
pub struct StageScheduler;

impl StageScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Next pending stage in execution order
    pub fn next(&self, pipeline: &Pipeline) -> Schedule {
        let results = pipeline.stage_results();

        for stage in pipeline.ordered_stages() {
            if !matches!(stage.state, StageState::Pending) {
                continue;
            }

            return match stage.unmet_dependency(&results) {
                Some((dep, result)) => Schedule::Skip {
                    stage_id: stage.id.clone(),
                    reason: format!("needs `{}` which {}", dep, result),
                },
                None => Schedule::Run(stage.id.clone()),
            };
        }

        Schedule::Done
    }
}
