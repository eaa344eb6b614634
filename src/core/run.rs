//! Pipeline run identity - the event that started a run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Repository event kinds that can trigger a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Commits pushed to a branch
    Push,
    /// Pull request opened or updated against a branch
    PullRequest,
}

impl EventKind {
    /// Name used in trigger configuration and condition expressions
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(EventKind::Push),
            "pull_request" | "pull-request" => Ok(EventKind::PullRequest),
            other => Err(format!("Unknown event kind: {}", other)),
        }
    }
}

/// A single pipeline run, created when an event is received.
///
/// Fields are private so a run cannot change once it exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    id: Uuid,
    event: EventKind,
    git_ref: String,
    branch: String,
    sha: String,
    created_at: DateTime<Utc>,
}

impl PipelineRun {
    /// Create a run for an event on `branch`. The ref is `refs/heads/<branch>`.
    pub fn new(event: EventKind, branch: impl Into<String>, sha: impl Into<String>) -> Self {
        let branch = branch.into();
        Self {
            id: Uuid::new_v4(),
            event,
            git_ref: format!("refs/heads/{}", branch),
            branch,
            sha: sha.into(),
            created_at: Utc::now(),
        }
    }

    /// Create a run from a full git ref; the branch is derived from `refs/heads/...`
    pub fn from_ref(event: EventKind, git_ref: impl Into<String>, sha: impl Into<String>) -> Self {
        let git_ref = git_ref.into();
        let branch = git_ref
            .strip_prefix("refs/heads/")
            .unwrap_or(&git_ref)
            .to_string();
        Self {
            id: Uuid::new_v4(),
            event,
            git_ref,
            branch,
            sha: sha.into(),
            created_at: Utc::now(),
        }
    }

    /// Override the git ref while keeping the target branch (e.g. `refs/pull/7/merge`)
    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = git_ref.into();
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn event(&self) -> EventKind {
        self.event
    }

    pub fn git_ref(&self) -> &str {
        &self.git_ref
    }

    /// Branch the event targets (the base branch for pull requests)
    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn sha(&self) -> &str {
        &self.sha
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
