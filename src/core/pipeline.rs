//! Pipeline domain model

use crate::core::{
    config::PipelineConfig,
    context::RunContext,
    run::PipelineRun,
    stage::Stage,
    state::{ExecutionStatus, PipelineState, StageResult, StageState},
    trigger::Trigger,
};
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};

/// A pipeline definition plus its execution state
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Global variables available to all stages
    pub variables: HashMap<String, String>,

    /// Compiled trigger
    pub trigger: Trigger,

    /// Pipeline stages
    pub stages: HashMap<String, Stage>,

    /// Execution state
    pub state: PipelineState,

    /// Stage execution order (topological sort)
    execution_order: Vec<String>,
}

impl Pipeline {
    /// Create a pipeline from configuration
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let defaults = config.step_defaults();
        let trigger = Trigger::from_config(config.trigger.as_ref()).context("Invalid trigger")?;

        let declared: Vec<String> = config.stages.iter().map(|s| s.id.clone()).collect();
        let stages: HashMap<String, Stage> = config
            .stages
            .iter()
            .map(|stage_config| {
                let stage = Stage::from_config(stage_config, &defaults)?;
                Ok((stage.id.clone(), stage))
            })
            .collect::<Result<_>>()?;

        let execution_order = Self::topological_sort(&declared, &stages);

        Ok(Pipeline {
            name: config.name.clone(),
            variables: config.variables_as_string_map(),
            trigger,
            stages,
            state: PipelineState::new(),
            execution_order,
        })
    }

    /// Get a stage by ID
    pub fn stage(&self, id: &str) -> Option<&Stage> {
        self.stages.get(id)
    }

    /// Get a mutable stage by ID
    pub fn stage_mut(&mut self, id: &str) -> Option<&mut Stage> {
        self.stages.get_mut(id)
    }

    /// Stages in execution order
    pub fn ordered_stages(&self) -> impl Iterator<Item = &Stage> {
        self.execution_order.iter().filter_map(|id| self.stages.get(id))
    }

    /// Result of every stage
    pub fn stage_results(&self) -> HashMap<String, StageResult> {
        self.stages
            .values()
            .map(|s| (s.id.clone(), s.state.result()))
            .collect()
    }

    /// Check if every stage reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.stages.values().all(|s| s.state.is_terminal())
    }

    /// Check if any stage failed
    pub fn has_failed(&self) -> bool {
        self.state.status == ExecutionStatus::Failed
            || self
                .stages
                .values()
                .any(|s| matches!(s.state, StageState::Failed { .. }))
    }

    /// Get execution order (topological sort)
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Topological sort visiting stages in declaration order
    fn topological_sort(declared: &[String], stages: &HashMap<String, Stage>) -> Vec<String> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut temp_visited = HashSet::new();

        for stage_id in declared {
            if !visited.contains(stage_id) {
                Self::visit(stage_id, stages, &mut visited, &mut temp_visited, &mut result);
            }
        }

        result
    }

    fn visit(
        stage_id: &str,
        stages: &HashMap<String, Stage>,
        visited: &mut HashSet<String>,
        temp_visited: &mut HashSet<String>,
        result: &mut Vec<String>,
    ) {
        if visited.contains(stage_id) || temp_visited.contains(stage_id) {
            return;
        }

        temp_visited.insert(stage_id.to_string());

        if let Some(stage) = stages.get(stage_id) {
            for dep in &stage.needs {
                Self::visit(dep, stages, visited, temp_visited, result);
            }
        }

        temp_visited.remove(stage_id);
        visited.insert(stage_id.to_string());
        result.push(stage_id.to_string());
    }

    /// Create the evaluation context for a run at the current point of execution
    pub fn create_context(&self, run: &PipelineRun) -> RunContext {
        let mut context = RunContext::new(run.clone(), self.variables.clone());
        context.stage_results = self.stage_results();
        context
    }

    /// Recount terminal stages into the pipeline state
    pub fn update_state_counts(&mut self) {
        let mut succeeded = 0;
        let mut failed = 0;
        let mut skipped = 0;

        for stage in self.stages.values() {
            match stage.state.result() {
                StageResult::Succeeded => succeeded += 1,
                StageResult::Failed => failed += 1,
                StageResult::Skipped => skipped += 1,
                StageResult::Pending | StageResult::Running => {}
            }
        }

        let total = self.stages.len();
        self.state.update_counts(total, succeeded, failed, skipped);
    }
}
