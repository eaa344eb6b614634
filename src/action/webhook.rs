//! `webhook/post` - form-urlencoded POST to a deployment endpoint

use crate::action::{config::ActionConfig, Action, ActionError, ActionOutput, ActionRequest};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

/// Posts a form to a webhook URL, optionally carrying a shared secret.
///
/// Params:
/// - `url` (required)
/// - `secret` - shared secret, sent as the `secret_field` form field
/// - `secret_field` - name of that field (default `secret`)
/// - `fields` - extra `key=value` form fields
///
/// Any non-2xx response fails the step. There is no retry.
pub struct WebhookAction {
    client: reqwest::Client,
}

impl WebhookAction {
    pub fn new(config: &ActionConfig) -> Result<Self, ActionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    /// Form fields for the request, in send order
    pub fn form_fields(request: &ActionRequest) -> Result<Vec<(String, String)>, ActionError> {
        let mut pairs = Vec::new();

        for entry in request.list("fields") {
            let (key, value) = entry.split_once('=').ok_or_else(|| ActionError::InvalidParam {
                param: "fields".to_string(),
                reason: format!("expected key=value, got '{}'", entry),
            })?;
            pairs.push((key.trim().to_string(), value.trim().to_string()));
        }

        if let Some(secret) = request.text("secret") {
            let field = request.text("secret_field").unwrap_or("secret");
            pairs.push((field.to_string(), secret.to_string()));
        }

        Ok(pairs)
    }
}

#[async_trait]
impl Action for WebhookAction {
    async fn invoke(&self, request: &ActionRequest) -> Result<ActionOutput, ActionError> {
        let url = request.require_text("url")?;
        let pairs = Self::form_fields(request)?;
        debug!("Posting {} form field(s) to webhook", pairs.len());

        let response = self.client.post(url).form(&pairs).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ActionError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        info!("Webhook accepted with status {}", status.as_u16());
        Ok(ActionOutput::new(format!("Webhook returned {}", status.as_u16())).with_detail(body))
    }
}
