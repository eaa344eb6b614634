//! shipline - a build-and-deploy pipeline runner

pub mod action;
pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use action::{Action, ActionConfig, ActionError, ActionOutput, ActionRegistry, ActionRequest};
pub use action::{CommandRunner, CommandSpec};
pub use core::{EventKind, ExecutionStatus, Pipeline, PipelineRun, RunContext, StageResult};
pub use execution::{plan, ExecutionEngine, ExecutionError, ExecutionEvent, RunPlan};
