//! Trigger evaluation - decides whether an event starts a run

use crate::core::run::{EventKind, PipelineRun};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors building a trigger from configuration
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Empty branch pattern for '{0}' trigger")]
    EmptyPattern(EventKind),

    #[error("Invalid branch pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// `on:` block as written in YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Push events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<EventFilterConfig>,

    /// Pull request events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<EventFilterConfig>,
}

/// Filter applied to one event kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilterConfig {
    /// Branch names or glob patterns; empty matches every branch
    #[serde(default)]
    pub branches: Vec<String>,
}

/// A compiled branch glob (`*` stays within one path segment, `**` crosses them)
#[derive(Debug, Clone)]
pub struct BranchPattern {
    source: String,
    regex: Regex,
}

impl BranchPattern {
    pub fn new(event: EventKind, pattern: &str) -> Result<Self, TriggerError> {
        if pattern.trim().is_empty() {
            return Err(TriggerError::EmptyPattern(event));
        }

        let mut translated = String::from("^");
        let mut chars = pattern.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '*' if chars.peek() == Some(&'*') => {
                    chars.next();
                    translated.push_str(".*");
                }
                '*' => translated.push_str("[^/]*"),
                '?' => translated.push_str("[^/]"),
                other => translated.push_str(&regex::escape(&other.to_string())),
            }
        }
        translated.push('$');

        let regex = Regex::new(&translated).map_err(|source| TriggerError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, branch: &str) -> bool {
        self.regex.is_match(branch)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// One event kind the pipeline reacts to
#[derive(Debug, Clone)]
pub struct TriggerRule {
    pub event: EventKind,
    pub branches: Vec<BranchPattern>,
}

impl TriggerRule {
    fn matches(&self, event: EventKind, branch: &str) -> bool {
        self.event == event
            && (self.branches.is_empty() || self.branches.iter().any(|p| p.matches(branch)))
    }
}

/// Compiled trigger for a pipeline.
///
/// A pipeline without an `on:` block reacts to every event.
#[derive(Debug, Clone)]
pub struct Trigger {
    rules: Option<Vec<TriggerRule>>,
}

impl Trigger {
    /// Trigger that accepts every event
    pub fn any() -> Self {
        Self { rules: None }
    }

    /// Compile an `on:` block (None = accept every event)
    pub fn from_config(config: Option<&TriggerConfig>) -> Result<Self, TriggerError> {
        let Some(config) = config else {
            return Ok(Self::any());
        };

        let mut rules = Vec::new();
        for (event, filter) in [
            (EventKind::Push, &config.push),
            (EventKind::PullRequest, &config.pull_request),
        ] {
            if let Some(filter) = filter {
                let branches = filter
                    .branches
                    .iter()
                    .map(|p| BranchPattern::new(event, p))
                    .collect::<Result<Vec<_>, _>>()?;
                rules.push(TriggerRule { event, branches });
            }
        }

        Ok(Self { rules: Some(rules) })
    }

    /// Whether an event of `event` kind targeting `branch` should start a run
    pub fn should_run(&self, event: EventKind, branch: &str) -> bool {
        match &self.rules {
            None => true,
            Some(rules) => rules.iter().any(|rule| rule.matches(event, branch)),
        }
    }

    /// Evaluate the trigger for a run
    pub fn evaluate(&self, run: &PipelineRun) -> bool {
        self.should_run(run.event(), run.branch())
    }

    /// Compiled rules, or None when every event is accepted
    pub fn rules(&self) -> Option<&[TriggerRule]> {
        self.rules.as_deref()
    }
}
