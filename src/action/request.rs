//! Action request/response types

use crate::core::{secret::ResolvedSecrets, Param};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Error types for action invocations
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("No capability registered for '{0}'")]
    UnknownCapability(String),

    #[error("'{capability}' requires parameter '{param}'")]
    MissingParam { capability: String, param: String },

    #[error("Invalid parameter '{param}': {reason}")]
    InvalidParam { param: String, reason: String },

    #[error("Failed to start '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("'{program}' exited with code {code}: {stderr}")]
    Command {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Everything a capability needs to perform one step
#[derive(Debug, Clone)]
pub struct ActionRequest {
    /// Capability name (`uses`)
    pub capability: String,

    /// Stage the step belongs to
    pub stage_id: String,

    /// Step name
    pub step_name: String,

    /// Rendered parameters
    pub params: BTreeMap<String, Param>,

    /// Rendered environment
    pub env: BTreeMap<String, String>,

    /// Secrets resolved for this step
    pub secrets: ResolvedSecrets,

    /// Time budget for the invocation
    pub timeout: Duration,
}

impl ActionRequest {
    pub fn new(capability: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            stage_id: String::new(),
            step_name: String::new(),
            params: BTreeMap::new(),
            env: BTreeMap::new(),
            secrets: ResolvedSecrets::default(),
            timeout: Duration::from_secs(600),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Param) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_text(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_param(key, Param::Text(value.into()))
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Scalar parameter, if present and non-empty
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.params.get(key) {
            Some(Param::Text(text)) if !text.is_empty() => Some(text.as_str()),
            _ => None,
        }
    }

    /// Scalar parameter that must be present
    pub fn require_text(&self, key: &str) -> Result<&str, ActionError> {
        self.text(key).ok_or_else(|| ActionError::MissingParam {
            capability: self.capability.clone(),
            param: key.to_string(),
        })
    }

    /// List parameter. A scalar is split on commas and newlines.
    pub fn list(&self, key: &str) -> Vec<String> {
        match self.params.get(key) {
            Some(Param::List(items)) => items
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Some(Param::Text(text)) => text
                .split([',', '\n'])
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Boolean parameter; absent means false
    pub fn flag(&self, key: &str) -> Result<bool, ActionError> {
        match self.text(key) {
            None => Ok(false),
            Some("true") | Some("yes") | Some("1") => Ok(true),
            Some("false") | Some("no") | Some("0") => Ok(false),
            Some(other) => Err(ActionError::InvalidParam {
                param: key.to_string(),
                reason: format!("expected a boolean, got '{}'", other),
            }),
        }
    }
}

/// Result of a successful invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutput {
    /// One-line summary of what happened
    pub summary: String,

    /// Captured output, if any
    pub detail: String,
}

impl ActionOutput {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            detail: String::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}
