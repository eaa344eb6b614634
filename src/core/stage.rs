//! Stage and step domain models

use crate::core::{
    condition::{Condition, ConditionContext},
    config::{StageConfig, StepConfig},
    state::{StageResult, StageState, StepState},
    template::{self, TemplateError},
};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A step parameter (`with:` entry)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Param {
    /// Scalar value, stored as text
    Text(String),
    /// Sequence of scalars, or a mapping flattened to `key=value` entries
    List(Vec<String>),
}

/// Convert a YAML scalar to text
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

impl Param {
    /// Build a parameter from its YAML value
    pub fn from_yaml(value: &Value) -> Result<Self> {
        if let Some(text) = scalar_to_string(value) {
            return Ok(Param::Text(text));
        }

        match value {
            Value::Sequence(items) => items
                .iter()
                .map(|item| {
                    scalar_to_string(item)
                        .ok_or_else(|| anyhow::anyhow!("list items must be scalars"))
                })
                .collect::<Result<Vec<_>>>()
                .map(Param::List),
            Value::Mapping(map) => map
                .iter()
                .map(|(k, v)| match (scalar_to_string(k), scalar_to_string(v)) {
                    (Some(k), Some(v)) => Ok(format!("{}={}", k, v)),
                    _ => anyhow::bail!("mapping entries must be scalars"),
                })
                .collect::<Result<Vec<_>>>()
                .map(Param::List),
            _ => anyhow::bail!("unsupported parameter value"),
        }
    }

    /// Template strings held by this parameter
    pub fn templates(&self) -> Vec<&str> {
        match self {
            Param::Text(text) => vec![text.as_str()],
            Param::List(items) => items.iter().map(String::as_str).collect(),
        }
    }

    /// Render every template in this parameter
    pub fn render(&self, ctx: &dyn ConditionContext) -> Result<Param, TemplateError> {
        Ok(match self {
            Param::Text(text) => Param::Text(template::render(text, ctx)?),
            Param::List(items) => Param::List(
                items
                    .iter()
                    .map(|item| template::render(item, ctx))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        })
    }
}

/// Defaults applied to steps that do not set their own values
#[derive(Debug, Clone)]
pub struct StepDefaults {
    pub timeout_secs: u64,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            timeout_secs: 600, // 10 minutes
        }
    }
}

/// A single step in a stage
#[derive(Debug, Clone)]
pub struct Step {
    /// Step name (unique within its stage)
    pub name: String,

    /// Capability the step delegates to
    pub uses: String,

    /// Parameters handed to the capability
    pub with: BTreeMap<String, Param>,

    /// Environment bindings
    pub env: BTreeMap<String, String>,

    /// Gate evaluated before the step runs
    pub condition: Option<Condition>,

    /// Timeout in seconds
    pub timeout_secs: u64,

    /// Runtime state
    pub state: StepState,
}

impl Step {
    pub fn from_config(config: &StepConfig, defaults: &StepDefaults) -> Result<Self> {
        let condition = config
            .condition
            .as_deref()
            .map(Condition::parse)
            .transpose()
            .with_context(|| format!("Invalid condition on step '{}'", config.name))?;

        let with = config
            .with
            .iter()
            .map(|(key, value)| {
                Param::from_yaml(value)
                    .map(|param| (key.clone(), param))
                    .with_context(|| format!("Step '{}' parameter '{}'", config.name, key))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(Step {
            name: config.name.clone(),
            uses: config.uses.clone(),
            with,
            env: config.env.clone(),
            condition,
            timeout_secs: config.timeout_secs.unwrap_or(defaults.timeout_secs),
            state: StepState::Pending,
        })
    }

    /// Every template string in parameters and env
    pub fn templates(&self) -> Vec<&str> {
        self.with
            .values()
            .flat_map(Param::templates)
            .chain(self.env.values().map(String::as_str))
            .collect()
    }

    /// Names of secrets this step references
    pub fn secret_refs(&self) -> BTreeSet<String> {
        self.templates()
            .into_iter()
            .flat_map(template::secret_refs)
            .collect()
    }

    /// Reason to skip this step, if its gate is false
    pub fn skip_reason(&self, ctx: &dyn ConditionContext) -> Option<String> {
        gate_skip_reason(self.condition.as_ref(), ctx)
    }
}

/// A named phase of the pipeline containing ordered steps
#[derive(Debug, Clone)]
pub struct Stage {
    /// Unique stage identifier
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Stages that must succeed first
    pub needs: Vec<String>,

    /// Gate evaluated before the stage runs
    pub condition: Option<Condition>,

    /// Environment shared by every step
    pub env: BTreeMap<String, String>,

    /// Ordered steps
    pub steps: Vec<Step>,

    /// Runtime state
    pub state: StageState,
}

impl Stage {
    pub fn from_config(config: &StageConfig, defaults: &StepDefaults) -> Result<Self> {
        let condition = config
            .condition
            .as_deref()
            .map(Condition::parse)
            .transpose()
            .with_context(|| format!("Invalid condition on stage '{}'", config.id))?;

        let steps = config
            .steps
            .iter()
            .map(|step| Step::from_config(step, defaults))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Invalid step in stage '{}'", config.id))?;

        Ok(Stage {
            id: config.id.clone(),
            name: config.name.clone().unwrap_or_else(|| config.id.clone()),
            needs: config.needs.clone(),
            condition,
            env: config.env.clone(),
            steps,
            state: StageState::Pending,
        })
    }

    /// First dependency that did not succeed, with its result
    pub fn unmet_dependency(&self, results: &HashMap<String, StageResult>) -> Option<(&str, StageResult)> {
        self.needs.iter().find_map(|dep| {
            let result = results.get(dep).copied().unwrap_or(StageResult::Pending);
            (result != StageResult::Succeeded).then_some((dep.as_str(), result))
        })
    }

    /// Reason to skip this stage, if its gate is false
    pub fn skip_reason(&self, ctx: &dyn ConditionContext) -> Option<String> {
        gate_skip_reason(self.condition.as_ref(), ctx)
    }

    /// Environment for a step: stage env overlaid with step env
    pub fn step_env(&self, step: &Step) -> BTreeMap<String, String> {
        let mut env = self.env.clone();
        env.extend(step.env.clone());
        env
    }
}

fn gate_skip_reason(condition: Option<&Condition>, ctx: &dyn ConditionContext) -> Option<String> {
    condition
        .filter(|c| !c.is_satisfied(ctx))
        .map(|c| format!("condition `{}` is false", c))
}
