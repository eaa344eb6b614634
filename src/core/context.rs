//! Run context - the values gates and templates can see

use crate::core::{
    condition::ConditionContext,
    run::PipelineRun,
    secret::ResolvedSecrets,
    state::StageResult,
};
use std::collections::{BTreeMap, HashMap};

/// Context for evaluating gates and rendering templates during a run.
///
/// Paths:
/// - `run.event`, `run.ref`, `run.branch`, `run.sha`, `run.id`, `run.created`
/// - `vars.<name>`
/// - `stages.<id>.result`
/// - `env.<name>` (step environment, when bound)
/// - `secrets.<name>` (only after secrets are bound for a step)
#[derive(Debug, Clone)]
pub struct RunContext {
    /// The run being executed
    pub run: PipelineRun,

    /// Pipeline variables (with CLI overrides applied)
    pub variables: HashMap<String, String>,

    /// Results of every stage so far
    pub stage_results: HashMap<String, StageResult>,

    env: BTreeMap<String, String>,
    secrets: ResolvedSecrets,
}

impl RunContext {
    pub fn new(run: PipelineRun, variables: HashMap<String, String>) -> Self {
        Self {
            run,
            variables,
            stage_results: HashMap::new(),
            env: BTreeMap::new(),
            secrets: ResolvedSecrets::default(),
        }
    }

    /// Record a stage result
    pub fn set_stage_result(&mut self, stage_id: &str, result: StageResult) {
        self.stage_results.insert(stage_id.to_string(), result);
    }

    /// Copy of this context with a step's secrets bound
    pub fn with_secrets(&self, secrets: ResolvedSecrets) -> Self {
        let mut ctx = self.clone();
        ctx.secrets = secrets;
        ctx
    }

    /// Copy of this context with a step's rendered environment bound
    pub fn with_env(&self, env: BTreeMap<String, String>) -> Self {
        let mut ctx = self.clone();
        ctx.env = env;
        ctx
    }
}

impl ConditionContext for RunContext {
    fn lookup(&self, path: &str) -> Option<String> {
        let (scope, rest) = path.split_once('.')?;
        match scope {
            "run" => match rest {
                "event" => Some(self.run.event().as_str().to_string()),
                "ref" => Some(self.run.git_ref().to_string()),
                "branch" => Some(self.run.branch().to_string()),
                "sha" => Some(self.run.sha().to_string()),
                "id" => Some(self.run.id().to_string()),
                "created" => Some(self.run.created_at().to_rfc3339()),
                _ => None,
            },
            "vars" => self.variables.get(rest).cloned(),
            "env" => self.env.get(rest).cloned(),
            "secrets" => self.secrets.get(rest).map(|s| s.expose().to_string()),
            "stages" => {
                let stage_id = rest.strip_suffix(".result")?;
                Some(
                    self.stage_results
                        .get(stage_id)
                        .copied()
                        .unwrap_or(StageResult::Pending)
                        .as_str()
                        .to_string(),
                )
            }
            _ => None,
        }
    }
}
