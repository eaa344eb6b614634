//! Docker-backed capabilities: registry login, image build/push, README sync

use crate::action::{
    command::{CommandRunner, CommandSpec},
    Action, ActionError, ActionOutput, ActionRequest,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// `registry/login` - `docker login` with the password on stdin
///
/// Params: `username`, `password`, optional `registry` (defaults to Docker Hub).
pub struct RegistryLoginAction {
    docker: String,
    runner: Arc<dyn CommandRunner>,
}

impl RegistryLoginAction {
    pub fn new(docker: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            docker: docker.into(),
            runner,
        }
    }

    pub fn build_command(&self, request: &ActionRequest) -> Result<CommandSpec, ActionError> {
        let username = request.require_text("username")?;
        let password = request.require_text("password")?;

        let mut spec = CommandSpec::new(&self.docker).arg("login");
        if let Some(registry) = request.text("registry") {
            spec = spec.arg(registry);
        }
        Ok(spec
            .args(["--username", username, "--password-stdin"])
            .envs(&request.env)
            .stdin(password))
    }
}

#[async_trait]
impl Action for RegistryLoginAction {
    async fn invoke(&self, request: &ActionRequest) -> Result<ActionOutput, ActionError> {
        let spec = self.build_command(request)?;
        let output = self.runner.run(&spec).await?;
        let registry = request.text("registry").unwrap_or("default registry");
        Ok(ActionOutput::new(format!("Logged in to {}", registry)).with_detail(output.stdout))
    }
}

/// `image/build` - `docker buildx build`, pushing when `push` is true
///
/// Params: `context` (default `.`), `file`, `platforms`, `tags`, `labels`,
/// `build_args`, `cache_from`, `cache_to`, `export_cache` (default true), `push`.
pub struct ImageBuildAction {
    docker: String,
    runner: Arc<dyn CommandRunner>,
}

impl ImageBuildAction {
    pub fn new(docker: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            docker: docker.into(),
            runner,
        }
    }

    pub fn build_command(&self, request: &ActionRequest) -> Result<CommandSpec, ActionError> {
        let push = request.flag("push")?;
        let tags = request.list("tags");
        if push && tags.is_empty() {
            return Err(ActionError::InvalidParam {
                param: "tags".to_string(),
                reason: "at least one tag is required to push".to_string(),
            });
        }

        let mut spec = CommandSpec::new(&self.docker).args(["buildx", "build"]);

        if let Some(file) = request.text("file") {
            spec = spec.args(["--file", file]);
        }

        let platforms = request.list("platforms");
        if !platforms.is_empty() {
            spec = spec.args(["--platform".to_string(), platforms.join(",")]);
        }

        // Cache export writes to the registry; `export_cache: false` turns it off
        let export_cache =
            request.text("export_cache").is_none() || request.flag("export_cache")?;

        for (flag, key) in [
            ("--tag", "tags"),
            ("--label", "labels"),
            ("--build-arg", "build_args"),
            ("--cache-from", "cache_from"),
            ("--cache-to", "cache_to"),
        ] {
            if key == "cache_to" && !export_cache {
                continue;
            }
            for value in request.list(key) {
                spec = spec.args([flag.to_string(), value]);
            }
        }

        if push {
            spec = spec.arg("--push");
        }

        Ok(spec
            .arg(request.text("context").unwrap_or("."))
            .envs(&request.env))
    }
}

#[async_trait]
impl Action for ImageBuildAction {
    async fn invoke(&self, request: &ActionRequest) -> Result<ActionOutput, ActionError> {
        let spec = self.build_command(request)?;
        info!("Building image: {}", spec.command_line());
        let output = self.runner.run(&spec).await?;

        let tags = request.list("tags");
        let target = if tags.is_empty() {
            "untagged image".to_string()
        } else {
            tags.join(", ")
        };
        let platforms = request.list("platforms");
        let verb = if request.flag("push")? { "Built and pushed" } else { "Built" };

        let summary = if platforms.is_empty() {
            format!("{} {}", verb, target)
        } else {
            format!("{} {} for {}", verb, target, platforms.join(", "))
        };
        Ok(ActionOutput::new(summary).with_detail(output.stderr))
    }
}

/// `readme/sync` - push a README to the registry description with `docker pushrm`
///
/// Params: `repository`, `readme` (default `README.md`), optional `short_description`,
/// `username`, `password` (passed to the plugin as `DOCKER_USER` / `DOCKER_PASS`).
pub struct ReadmeSyncAction {
    docker: String,
    runner: Arc<dyn CommandRunner>,
}

impl ReadmeSyncAction {
    pub fn new(docker: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            docker: docker.into(),
            runner,
        }
    }

    pub fn build_command(&self, request: &ActionRequest) -> Result<CommandSpec, ActionError> {
        let repository = request.require_text("repository")?;
        let readme = request.text("readme").unwrap_or("README.md");

        let mut spec = CommandSpec::new(&self.docker).args(["pushrm", repository, "--file", readme]);
        if let Some(short) = request.text("short_description") {
            spec = spec.args(["--short", short]);
        }

        spec = spec.envs(&request.env);
        if let Some(user) = request.text("username") {
            spec = spec.env("DOCKER_USER", user);
        }
        if let Some(pass) = request.text("password") {
            spec = spec.env("DOCKER_PASS", pass);
        }
        Ok(spec)
    }
}

#[async_trait]
impl Action for ReadmeSyncAction {
    async fn invoke(&self, request: &ActionRequest) -> Result<ActionOutput, ActionError> {
        let spec = self.build_command(request)?;
        let readme = request.text("readme").unwrap_or("README.md");
        if tokio::fs::metadata(readme).await.is_err() {
            return Err(ActionError::InvalidParam {
                param: "readme".to_string(),
                reason: format!("file not found: {}", readme),
            });
        }

        let output = self.runner.run(&spec).await?;
        Ok(ActionOutput::new(format!(
            "Synced {} to {}",
            readme,
            request.require_text("repository")?
        ))
        .with_detail(output.stdout))
    }
}
