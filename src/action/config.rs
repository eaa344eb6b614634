//! Configuration for the built-in capabilities

/// Configuration for built-in capabilities
#[derive(Debug, Clone)]
pub struct ActionConfig {
    /// Path to the docker CLI (login, buildx, pushrm)
    pub docker_path: String,

    /// Shell used by the `run` capability
    pub shell: String,

    /// Timeout for webhook requests in seconds
    pub http_timeout_secs: u64,

    /// User-Agent header for webhook requests
    pub user_agent: String,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            docker_path: "docker".to_string(),
            shell: "sh".to_string(),
            http_timeout_secs: 30,
            user_agent: format!("shipline/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ActionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_docker_path(mut self, docker_path: impl Into<String>) -> Self {
        self.docker_path = docker_path.into();
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_http_timeout(mut self, timeout_secs: u64) -> Self {
        self.http_timeout_secs = timeout_secs;
        self
    }
}
