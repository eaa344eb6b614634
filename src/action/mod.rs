//! Capabilities that steps delegate to

pub mod command;
pub mod config;
pub mod docker;
pub mod request;
pub mod shell;
pub mod webhook;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub use command::{CommandOutput, CommandRunner, CommandSpec, SubprocessRunner};
pub use config::ActionConfig;
pub use docker::{ImageBuildAction, ReadmeSyncAction, RegistryLoginAction};
pub use request::{ActionError, ActionOutput, ActionRequest};
pub use shell::RunAction;
pub use webhook::WebhookAction;

/// Capability names registered by [`ActionRegistry::with_builtins`]
pub const BUILTIN_CAPABILITIES: &[&str] = &[
    "registry/login",
    "image/build",
    "readme/sync",
    "webhook/post",
    "run",
];

/// Trait for capabilities - allows tests to substitute recording fakes
#[async_trait]
pub trait Action: Send + Sync {
    /// Perform one step
    async fn invoke(&self, request: &ActionRequest) -> Result<ActionOutput, ActionError>;
}

/// Capabilities keyed by the name steps reference in `uses`
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in capability backed by real subprocesses
    pub fn with_builtins(config: &ActionConfig) -> Result<Self, ActionError> {
        Self::with_runner(config, Arc::new(SubprocessRunner::new()))
    }

    /// Registry with every built-in capability, running commands through `runner`
    pub fn with_runner(
        config: &ActionConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, ActionError> {
        let docker = config.docker_path.as_str();
        Ok(Self::new()
            .register("registry/login", RegistryLoginAction::new(docker, runner.clone()))
            .register("image/build", ImageBuildAction::new(docker, runner.clone()))
            .register("readme/sync", ReadmeSyncAction::new(docker, runner.clone()))
            .register("webhook/post", WebhookAction::new(config)?)
            .register("run", RunAction::new(config.shell.as_str(), runner)))
    }

    /// Register (or replace) a capability
    pub fn register(mut self, name: impl Into<String>, action: impl Action + 'static) -> Self {
        self.actions.insert(name.into(), Arc::new(action));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.names())
            .finish()
    }
}
