//! `run` - arbitrary shell command

use crate::action::{
    command::{CommandRunner, CommandSpec},
    Action, ActionError, ActionOutput, ActionRequest,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Runs the `command` param as `<shell> -c <command>` with the step environment
pub struct RunAction {
    shell: String,
    runner: Arc<dyn CommandRunner>,
}

impl RunAction {
    pub fn new(shell: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            shell: shell.into(),
            runner,
        }
    }

    pub fn build_command(&self, request: &ActionRequest) -> Result<CommandSpec, ActionError> {
        let command = request.require_text("command")?;
        Ok(CommandSpec::new(&self.shell)
            .args(["-c", command])
            .envs(&request.env))
    }
}

#[async_trait]
impl Action for RunAction {
    async fn invoke(&self, request: &ActionRequest) -> Result<ActionOutput, ActionError> {
        let spec = self.build_command(request)?;
        let output = self.runner.run(&spec).await?;
        let summary = output
            .stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("command succeeded")
            .trim()
            .to_string();
        Ok(ActionOutput::new(summary).with_detail(output.stdout))
    }
}
