//! CLI command definitions

use crate::core::{EventKind, PipelineRun};
use clap::Args;

/// The event a run is for
#[derive(Debug, Args, Clone)]
pub struct EventArgs {
    /// Triggering event (push, pull-request)
    #[arg(long, env = "SHIPLINE_EVENT", default_value = "push", value_parser = parse_event)]
    pub event: EventKind,

    /// Branch the event targets
    #[arg(long, env = "SHIPLINE_BRANCH", required_unless_present = "git_ref")]
    pub branch: Option<String>,

    /// Full git ref (e.g. refs/pull/7/merge); the branch comes from it when --branch is absent
    #[arg(long = "ref", env = "SHIPLINE_REF")]
    pub git_ref: Option<String>,

    /// Commit SHA
    #[arg(long, env = "SHIPLINE_SHA", default_value = "HEAD")]
    pub sha: String,
}

impl EventArgs {
    /// Build the run these arguments describe
    pub fn to_run(&self) -> PipelineRun {
        match (&self.git_ref, &self.branch) {
            (Some(git_ref), Some(branch)) => {
                PipelineRun::new(self.event, branch.clone(), self.sha.clone())
                    .with_ref(git_ref.clone())
            }
            (Some(git_ref), None) => PipelineRun::from_ref(self.event, git_ref.clone(), self.sha.clone()),
            (None, Some(branch)) => PipelineRun::new(self.event, branch.clone(), self.sha.clone()),
            (None, None) => PipelineRun::new(self.event, "main", self.sha.clone()),
        }
    }
}

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    #[command(flatten)]
    pub event: EventArgs,

    /// Variable overrides (key=value)
    #[arg(long = "var", value_parser = parse_key_value)]
    pub variable: Vec<(String, String)>,

    /// Evaluate triggers and gates and render requests without invoking anything
    #[arg(long)]
    pub dry_run: bool,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,
}

/// Show which stages and steps a run would execute
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    #[command(flatten)]
    pub event: EventArgs,

    /// Variable overrides (key=value)
    #[arg(long = "var", value_parser = parse_key_value)]
    pub variable: Vec<(String, String)>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List pipelines with recorded runs
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show run counts
    #[arg(long)]
    pub with_counts: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub details: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific run
    #[arg(long)]
    pub run_id: Option<String>,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}

/// Parse an event name
pub fn parse_event(s: &str) -> Result<EventKind, String> {
    s.parse()
}
