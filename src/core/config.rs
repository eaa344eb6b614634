//! Pipeline configuration from YAML

use crate::core::{
    condition::parse_expression,
    stage::{scalar_to_string, StepDefaults},
    template,
    trigger::{Trigger, TriggerConfig},
    Pipeline,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Events that start a run (omitted = every event)
    #[serde(default, rename = "on", skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerConfig>,

    /// Global variables, available as `vars.<name>`
    #[serde(default)]
    variables: BTreeMap<String, Value>,

    /// Declared secret names; when non-empty, templates may only reference these
    #[serde(default)]
    pub secrets: Vec<String>,

    /// Default timeout for steps (in seconds)
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,

    /// Pipeline stages
    pub stages: Vec<StageConfig>,
}

/// Stage configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Unique stage identifier
    pub id: String,

    /// Human-readable stage name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Stages that must succeed before this one
    #[serde(default)]
    pub needs: Vec<String>,

    /// Gate expression
    #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Environment shared by the stage's steps
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Ordered steps
    pub steps: Vec<StepConfig>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step name
    pub name: String,

    /// Capability to invoke
    pub uses: String,

    /// Parameters for the capability
    #[serde(default)]
    pub with: BTreeMap<String, Value>,

    /// Environment bindings
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Gate expression
    #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Timeout for this step (overrides global)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Pipeline name must not be empty");
        }

        Trigger::from_config(self.trigger.as_ref()).context("Invalid trigger")?;

        // Check that all stage IDs are unique
        let mut seen_ids = HashSet::new();
        for stage in &self.stages {
            if !seen_ids.insert(&stage.id) {
                anyhow::bail!("Duplicate stage ID: {}", stage.id);
            }
        }

        let declared_secrets: HashSet<&str> = self.secrets.iter().map(String::as_str).collect();

        for stage in &self.stages {
            for dep in &stage.needs {
                if dep == &stage.id {
                    anyhow::bail!("Stage '{}' depends on itself", stage.id);
                }
                if !seen_ids.contains(dep) {
                    anyhow::bail!("Stage '{}' depends on non-existent stage '{}'", stage.id, dep);
                }
            }

            if stage.steps.is_empty() {
                anyhow::bail!("Stage '{}' has no steps", stage.id);
            }

            if let Some(condition) = &stage.condition {
                parse_expression(condition)
                    .with_context(|| format!("Invalid condition on stage '{}'", stage.id))?;
            }

            let mut step_names = HashSet::new();
            for step in &stage.steps {
                if !step_names.insert(&step.name) {
                    anyhow::bail!("Duplicate step name '{}' in stage '{}'", step.name, stage.id);
                }
                if step.uses.trim().is_empty() {
                    anyhow::bail!("Step '{}' in stage '{}' has no 'uses'", step.name, stage.id);
                }
                if let Some(condition) = &step.condition {
                    parse_expression(condition).with_context(|| {
                        format!("Invalid condition on step '{}' in stage '{}'", step.name, stage.id)
                    })?;
                }

                for text in step_templates(stage, step) {
                    template::check(&text).with_context(|| {
                        format!("Invalid template in step '{}' of stage '{}'", step.name, stage.id)
                    })?;

                    if declared_secrets.is_empty() {
                        continue;
                    }
                    for name in template::secret_refs(&text) {
                        if !declared_secrets.contains(name.as_str()) {
                            anyhow::bail!(
                                "Step '{}' in stage '{}' references undeclared secret '{}'",
                                step.name,
                                stage.id,
                                name
                            );
                        }
                    }
                }
            }
        }

        // Check for cycles in the dependency graph
        self.check_cycles()?;

        Ok(())
    }

    /// Check for cycles in the stage dependency graph
    fn check_cycles(&self) -> Result<()> {
        let mut visited = HashSet::new();
        let mut recursion_stack = HashSet::new();

        for stage in &self.stages {
            if !visited.contains(&stage.id) {
                self.dfs_check(&stage.id, &mut visited, &mut recursion_stack)?;
            }
        }

        Ok(())
    }

    fn dfs_check(
        &self,
        stage_id: &str,
        visited: &mut HashSet<String>,
        recursion_stack: &mut HashSet<String>,
    ) -> Result<()> {
        visited.insert(stage_id.to_string());
        recursion_stack.insert(stage_id.to_string());

        if let Some(stage) = self.stages.iter().find(|s| s.id == stage_id) {
            for dep in &stage.needs {
                if recursion_stack.contains(dep) {
                    anyhow::bail!("Cycle detected in dependency graph involving stage '{}'", dep);
                }
                if !visited.contains(dep) {
                    self.dfs_check(dep, visited, recursion_stack)?;
                }
            }
        }

        recursion_stack.remove(stage_id);
        Ok(())
    }

    /// Variables as a string map; non-scalar values are rendered as YAML
    pub fn variables_as_string_map(&self) -> HashMap<String, String> {
        self.variables
            .iter()
            .map(|(key, value)| {
                let text = scalar_to_string(value).unwrap_or_else(|| {
                    serde_yaml::to_string(value)
                        .unwrap_or_default()
                        .trim_end()
                        .to_string()
                });
                (key.clone(), text)
            })
            .collect()
    }

    /// Defaults applied to every step
    pub fn step_defaults(&self) -> StepDefaults {
        let mut defaults = StepDefaults::default();
        if let Some(timeout) = self.default_timeout_secs {
            defaults.timeout_secs = timeout;
        }
        defaults
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Result<Pipeline> {
        Pipeline::from_config(self)
    }
}

/// All template strings of a step: stage env, step env and every parameter
fn step_templates(stage: &StageConfig, step: &StepConfig) -> Vec<String> {
    let mut out: Vec<String> = stage.env.values().chain(step.env.values()).cloned().collect();
    for value in step.with.values() {
        match value {
            Value::Sequence(items) => out.extend(items.iter().filter_map(scalar_to_string)),
            Value::Mapping(map) => out.extend(map.values().filter_map(scalar_to_string)),
            other => out.extend(scalar_to_string(other)),
        }
    }
    out
}
